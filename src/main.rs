use bevy::{
    prelude::*,
    winit::{UpdateMode, WinitSettings},
};

use settings::MeasureSettings;
use surface::MapSurfacePlugin;
use tools::ToolsPlugin;

pub mod error;
pub mod settings;
pub mod surface;
pub mod tools;

fn main() {
    let (settings, mut settings_error) = match MeasureSettings::load() {
        Ok(settings) => (settings, None),
        Err(e) => (MeasureSettings::default(), Some(e)),
    };

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Map Measure".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }))
        .add_plugins(MapSurfacePlugin { settings })
        .add_plugins(ToolsPlugin)
        .insert_resource(WinitSettings {
            unfocused_mode: UpdateMode::reactive_low_power(std::time::Duration::from_secs(1)),
            ..Default::default()
        })
        .insert_resource(ClearColor(Color::from(Srgba {
            red: 0.9,
            green: 0.9,
            blue: 0.8,
            alpha: 1.0,
        })))
        // The log plugin is only up once the app runs, so report a bad settings file here.
        .add_systems(Startup, move || {
            if let Some(e) = settings_error.take() {
                warn!("{e}, using default settings");
            }
        })
        .run();
}
