//! # Measuring Tools
//!
//! Drawing lines and polygons on the map and measuring them.
//!
//! ## Sub-modules
//! - `annotation`: the store of drawn features and its vertex index
//! - `tool`: the tool mode state machine driving draw, modify and snap
//! - `draw`: pointer and keyboard systems plus gizmo rendering
//! - `measure`: length/area computation and the latest-measurement slot
//! - `ui`: toolbar and measurement panel

mod annotation;
mod draw;
mod measure;
mod tool;
mod ui;

pub use annotation::*;
pub use draw::*;
pub use measure::*;
pub use tool::*;
pub use ui::*;

use bevy::prelude::*;
use bevy_egui::EguiPlugin;

pub struct ToolsPlugin;

impl Plugin for ToolsPlugin {
    fn build(&self, app: &mut App) {
        // The map viewer may already have brought egui along.
        if !app.is_plugin_added::<EguiPlugin>() {
            app.add_plugins(EguiPlugin {
                enable_multipass_for_primary_context: false,
            });
        }
        app.add_event::<DrawCompleted>()
            .add_plugins(ToolbarUiPlugin)
            .add_systems(
                Update,
                (
                    handle_mode_keys,
                    handle_finish_key,
                    handle_draw,
                    handle_modify,
                    publish_measurements,
                )
                    .chain(),
            )
            .add_systems(Startup, setup_polygon_fill)
            .add_systems(PostUpdate, (render_polygon_fills, render_annotations));
    }
}
