use bevy::{
    app::AppExit,
    prelude::*,
    window::{PrimaryWindow, WindowClosed},
};
use bevy_map_viewer::{
    Coord, EguiBlockInputState, MapViewerMarker, MapViewerPlugin, TileMapResources,
    ZoomChangedEvent,
};
use bevy_pancam::PanCam;

use crate::{
    error::SurfaceError,
    settings::MeasureSettings,
    tools::{
        AnnotationStore, InteractionController, MeasurementDisplay, MeasurementReporter,
        measurement_feed,
    },
};

/// Sets up the base map and ties the measuring session to the primary window.
pub struct MapSurfacePlugin {
    pub settings: MeasureSettings,
}

impl Plugin for MapSurfacePlugin {
    fn build(&self, app: &mut App) {
        let settings = &self.settings;
        app.add_plugins(MapViewerPlugin {
            starting_location: Coord::new(
                settings.starting_location.lat,
                settings.starting_location.long,
            ),
            starting_zoom: settings.starting_zoom.into(),
            tile_quality: settings.tile_quality.into(),
            cache_dir: settings.cache_dir.clone(),
        })
        .insert_resource(settings.clone())
        .insert_resource(MapSurface::new(settings.double_click_secs))
        .add_systems(PostStartup, mount_surface)
        .add_systems(Update, (reset_view_on_mount, unmount_on_close, handle_pancam))
        .add_systems(Last, unmount_on_exit);
    }
}

/// Everything that lives exactly as long as one mount of the map.
pub struct SurfaceSession {
    pub target: Entity,
    pub store: AnnotationStore,
    pub controller: InteractionController,
    pub reporter: MeasurementReporter,
    pub display: MeasurementDisplay,
}

#[derive(Resource)]
pub struct MapSurface {
    session: Option<SurfaceSession>,
    double_click_secs: f64,
    /// Bumped by every successful mount.
    generation: u64,
}

impl Default for MapSurface {
    fn default() -> Self {
        Self::new(MeasureSettings::default().double_click_secs)
    }
}

impl MapSurface {
    pub fn new(double_click_secs: f64) -> Self {
        Self {
            session: None,
            double_click_secs,
            generation: 0,
        }
    }

    /// Starts a fresh session on `target`, releasing any previous one first.
    pub fn mount(&mut self, target: Option<Entity>) -> Result<(), SurfaceError> {
        self.unmount();
        let target = target.ok_or(SurfaceError::MissingRenderTarget)?;
        let (reporter, display) = measurement_feed();
        self.session = Some(SurfaceSession {
            target,
            store: AnnotationStore::new(),
            controller: InteractionController::new(self.double_click_secs),
            reporter,
            display,
        });
        self.generation += 1;
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Releases the session. Returns whether anything was released.
    pub fn unmount(&mut self) -> bool {
        self.session.take().is_some()
    }

    pub fn session(&self) -> Option<&SurfaceSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut SurfaceSession> {
        self.session.as_mut()
    }
}

fn mount_surface(mut surface: ResMut<MapSurface>, window: Query<Entity, With<PrimaryWindow>>) {
    match surface.mount(window.single().ok()) {
        Ok(()) => info!("Map surface mounted"),
        Err(e) => error!("{e}"),
    }
}

/// Every mount opens on the configured start location and zoom.
fn reset_view_on_mount(
    surface: Res<MapSurface>,
    settings: Res<MeasureSettings>,
    mut seen: Local<u64>,
    mut res_manager: ResMut<TileMapResources>,
    mut camera: Query<(&mut Transform, &mut Projection), With<MapViewerMarker>>,
    mut zoom_event: EventWriter<ZoomChangedEvent>,
) {
    if surface.generation() == *seen || surface.session().is_none() {
        return;
    }
    let Ok((mut transform, mut projection)) = camera.single_mut() else {
        return;
    };
    *seen = surface.generation();

    let start = Coord::new(
        settings.starting_location.lat,
        settings.starting_location.long,
    );
    let starting = start.to_game_coords(res_manager.clone());
    res_manager.location_manager.location = start;
    transform.translation.x = starting.x;
    transform.translation.y = starting.y;
    if let Projection::Orthographic(ortho) = projection.as_mut() {
        ortho.scale = 1.0;
    }
    zoom_event.write(ZoomChangedEvent);
    debug!("View reset for mount {}", *seen);
}

fn unmount_on_close(mut closed: EventReader<WindowClosed>, mut surface: ResMut<MapSurface>) {
    for event in closed.read() {
        let is_target = surface
            .session()
            .is_some_and(|session| session.target == event.window);
        if is_target && surface.unmount() {
            info!("Map surface released, window closed");
        }
    }
}

fn unmount_on_exit(mut exit: EventReader<AppExit>, mut surface: ResMut<MapSurface>) {
    if exit.is_empty() {
        return;
    }
    exit.clear();
    if surface.unmount() {
        info!("Map surface released on exit");
    }
}

/// Panning must not fight egui or a vertex drag for the pointer.
fn handle_pancam(
    mut query: Query<&mut PanCam>,
    state: Option<Res<EguiBlockInputState>>,
    surface: Res<MapSurface>,
) {
    let blocked = state.is_some_and(|state| state.block_input);
    let dragging = surface
        .session()
        .is_some_and(|session| session.controller.grabbed().is_some());
    let enabled = !blocked && !dragging;
    for mut pancam in &mut query {
        if pancam.enabled != enabled {
            pancam.enabled = enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{GeometryKind, Vertex};

    #[test]
    fn missing_target_fails_fast() {
        let mut surface = MapSurface::default();
        assert_eq!(surface.mount(None), Err(SurfaceError::MissingRenderTarget));
        assert!(surface.session().is_none());
    }

    #[test]
    fn unmount_releases_exactly_once() {
        let mut surface = MapSurface::default();
        surface.mount(Some(Entity::from_raw(1))).unwrap();

        assert!(surface.unmount());
        assert!(!surface.unmount());
        assert!(surface.session().is_none());
    }

    #[test]
    fn remount_starts_from_a_clean_session() {
        let mut surface = MapSurface::default();
        surface.mount(Some(Entity::from_raw(1))).unwrap();
        {
            let session = surface.session_mut().unwrap();
            session
                .store
                .insert(GeometryKind::Line, &[Vertex { x: 0., y: 0. }, Vertex { x: 3., y: 4. }]);
            assert_eq!(session.store.len(), 1);
        }
        surface.unmount();
        surface.mount(Some(Entity::from_raw(2))).unwrap();

        let session = surface.session_mut().unwrap();
        assert_eq!(session.target, Entity::from_raw(2));
        assert!(session.store.is_empty());
        assert!(session.display.latest().is_none());
        assert!(session.controller.sketch().is_none());
    }

    #[test]
    fn only_successful_mounts_count_as_new_views() {
        let mut surface = MapSurface::default();
        assert_eq!(surface.generation(), 0);
        surface.mount(Some(Entity::from_raw(1))).unwrap();
        assert_eq!(surface.generation(), 1);

        assert!(surface.mount(None).is_err());
        assert_eq!(surface.generation(), 1);

        surface.unmount();
        surface.mount(Some(Entity::from_raw(1))).unwrap();
        assert_eq!(surface.generation(), 2);
    }

    #[test]
    fn mounting_twice_replaces_the_session() {
        let mut surface = MapSurface::default();
        surface.mount(Some(Entity::from_raw(1))).unwrap();
        surface
            .session_mut()
            .unwrap()
            .store
            .insert(GeometryKind::Line, &[Vertex { x: 0., y: 0. }, Vertex { x: 1., y: 0. }]);

        surface.mount(Some(Entity::from_raw(1))).unwrap();
        assert!(surface.session().unwrap().store.is_empty());
    }

    #[test]
    fn closing_the_target_window_releases_the_session() {
        let mut app = App::new();
        let window = app.world_mut().spawn_empty().id();
        let mut surface = MapSurface::default();
        surface.mount(Some(window)).unwrap();
        app.add_event::<WindowClosed>()
            .insert_resource(surface)
            .add_systems(Update, unmount_on_close);

        let other = app.world_mut().spawn_empty().id();
        app.world_mut().send_event(WindowClosed { window: other });
        app.update();
        assert!(app.world().resource::<MapSurface>().session().is_some());

        app.world_mut().send_event(WindowClosed { window });
        app.update();
        assert!(app.world().resource::<MapSurface>().session().is_none());
    }
}
