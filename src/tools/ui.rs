use bevy::prelude::*;
use bevy_egui::{
    EguiContexts, EguiPreUpdateSet,
    egui::{self, Align2, Color32, RichText},
};

use crate::surface::MapSurface;

use super::{Measurement, ToolMode};

pub struct ToolbarUiPlugin;

impl Plugin for ToolbarUiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (tool_ui, measurement_ui).after(EguiPreUpdateSet::InitContexts),
        );
    }
}

fn panel_frame() -> egui::Frame {
    egui::Frame::new()
        .fill(egui::Color32::from_rgba_premultiplied(30, 30, 30, 220))
        .corner_radius(10.0)
        .shadow(egui::epaint::Shadow {
            color: egui::Color32::from_black_alpha(60),
            offset: [5, 5],
            blur: 10,
            spread: 5,
        })
}

fn tool_ui(mut surface: ResMut<MapSurface>, mut contexts: EguiContexts) {
    let Some(session) = surface.session_mut() else {
        return;
    };
    let ctx = contexts.ctx_mut();

    egui::Area::new("toolbar".into())
        .anchor(Align2::CENTER_BOTTOM, [0.0, -10.0])
        .show(ctx, |ui| {
            panel_frame().show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.spacing_mut().item_spacing = egui::vec2(8.0, 0.0);
                    let button_selected = |selected: bool, text: String| {
                        let fill = if selected {
                            Color32::from_rgb(70, 130, 180)
                        } else {
                            Color32::from_rgb(40, 40, 40)
                        };
                        egui::Button::new(RichText::new(text).color(Color32::WHITE))
                            .fill(fill)
                            .corner_radius(8.0)
                    };

                    let current = session.controller.mode();
                    for mode in ToolMode::ALL {
                        let button = button_selected(current == mode, mode.to_string());
                        if ui
                            .add_sized([64.0, 30.0], button)
                            .on_hover_text(hint(mode))
                            .clicked()
                        {
                            session.controller.set_mode(mode);
                        }
                    }
                });
            });
        });
}

fn hint(mode: ToolMode) -> &'static str {
    match mode {
        ToolMode::Idle => "Pan the map (Esc)",
        ToolMode::DrawLine => "Measure a length, double click or Enter to finish (L)",
        ToolMode::DrawPolygon => "Measure an area, double click, Enter or click the first point to finish (P)",
        ToolMode::Modify => "Drag vertices of drawn shapes (M)",
    }
}

/// The two lines of the measurement panel, `None` hides the panel.
pub fn measurement_lines(measurement: Option<&Measurement>) -> Option<[String; 2]> {
    let measurement = measurement?;
    Some([
        format!("Measurement Type: {}", measurement.kind),
        format!("Value: {}", measurement.value),
    ])
}

fn measurement_ui(mut surface: ResMut<MapSurface>, mut contexts: EguiContexts) {
    let Some(session) = surface.session_mut() else {
        return;
    };
    let Some(lines) = measurement_lines(session.display.latest()) else {
        return;
    };
    let ctx = contexts.ctx_mut();

    egui::Area::new("measurement".into())
        .anchor(Align2::LEFT_TOP, [10.0, 10.0])
        .show(ctx, |ui| {
            panel_frame().show(ui, |ui| {
                for line in lines {
                    ui.label(RichText::new(line).color(Color32::from_rgb(221, 221, 221)));
                }
            });
        });
}
