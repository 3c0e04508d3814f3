use bevy::{
    asset::RenderAssetUsages,
    prelude::*,
    render::mesh::{Indices, PrimitiveTopology},
    window::PrimaryWindow,
};
use bevy_map_viewer::{Coord, EguiBlockInputState, MapViewerMarker, TileMapResources};
use geo::{LineString, Polygon, TriangulateEarcut};

use crate::{
    settings::MeasureSettings,
    surface::{MapSurface, SurfaceSession},
};

use super::{DrawCompleted, GeometryKind, ToolMode, Vertex};

const VERTEX_RADIUS_PX: f32 = 7.0;
/// Above the tiles, below the gizmo strokes.
const FILL_ELEVATION: f32 = 400.0;

/// Cursor position in map coordinates plus the snap tolerance at the current zoom.
struct Pointer {
    at: Vertex,
    tolerance: f64,
}

fn pointer(
    camera: &Camera,
    camera_transform: &GlobalTransform,
    window: &Window,
    res_manager: &TileMapResources,
    tolerance_px: f32,
) -> Option<Pointer> {
    let position = window.cursor_position()?;
    let here = camera.viewport_to_world_2d(camera_transform, position).ok()?;
    let edge = camera
        .viewport_to_world_2d(camera_transform, position + Vec2::new(tolerance_px, 0.0))
        .ok()?;
    let here = res_manager.point_to_coord(here);
    let edge = res_manager.point_to_coord(edge);
    Some(Pointer {
        at: to_vertex(&here),
        tolerance: longitude_span(here.long, edge.long),
    })
}

/// Degrees of longitude between two points, the short way round the antimeridian.
fn longitude_span(from: f32, to: f32) -> f64 {
    let span = (to as f64 - from as f64).abs() % 360.0;
    span.min(360.0 - span)
}

fn world_per_px(camera: &Camera, camera_transform: &GlobalTransform) -> Option<f32> {
    let origin = camera.viewport_to_world_2d(camera_transform, Vec2::ZERO).ok()?;
    let one = camera.viewport_to_world_2d(camera_transform, Vec2::X).ok()?;
    Some(origin.distance(one))
}

fn to_vertex(coord: &Coord) -> Vertex {
    Vertex {
        x: coord.long as f64,
        y: coord.lat as f64,
    }
}

fn to_world(vertex: Vertex, res_manager: &TileMapResources) -> Vec2 {
    Coord::new(vertex.y as f32, vertex.x as f32).to_game_coords(res_manager.clone())
}

/// Keyboard mode switching. Escape first drops a sketch, a second Escape goes back to panning.
pub fn handle_mode_keys(mut surface: ResMut<MapSurface>, keys: Res<ButtonInput<KeyCode>>) {
    let Some(session) = surface.session_mut() else {
        return;
    };
    let controller = &mut session.controller;
    if keys.just_pressed(KeyCode::Escape) {
        if !controller.abort() {
            controller.set_mode(ToolMode::Idle);
        }
        return;
    }
    let requested = if keys.just_pressed(KeyCode::KeyL) {
        Some(ToolMode::DrawLine)
    } else if keys.just_pressed(KeyCode::KeyP) {
        Some(ToolMode::DrawPolygon)
    } else if keys.just_pressed(KeyCode::KeyM) {
        Some(ToolMode::Modify)
    } else {
        None
    };
    if let Some(mode) = requested {
        controller.set_mode(mode);
    }
}

/// Enter ends the sketch in progress.
pub fn handle_finish_key(
    mut surface: ResMut<MapSurface>,
    mut completions: EventWriter<DrawCompleted>,
    keys: Res<ButtonInput<KeyCode>>,
) {
    if !keys.just_pressed(KeyCode::Enter) {
        return;
    }
    let Some(SurfaceSession {
        store, controller, ..
    }) = surface.session_mut()
    else {
        return;
    };
    if let Some(done) = controller.finish(store) {
        completions.write(done);
    }
}

#[allow(clippy::too_many_arguments)]
pub fn handle_draw(
    mut surface: ResMut<MapSurface>,
    mut completions: EventWriter<DrawCompleted>,
    camera: Query<(&Camera, &GlobalTransform), With<MapViewerMarker>>,
    q_windows: Query<&Window, With<PrimaryWindow>>,
    buttons: Res<ButtonInput<MouseButton>>,
    res_manager: Res<TileMapResources>,
    settings: Res<MeasureSettings>,
    state: Option<Res<EguiBlockInputState>>,
    time: Res<Time>,
) {
    let Some(SurfaceSession {
        store, controller, ..
    }) = surface.session_mut()
    else {
        return;
    };
    if controller.mode().draws().is_none() {
        return;
    }

    let blocked = state.is_some_and(|state| state.block_input);
    if blocked || !buttons.just_pressed(MouseButton::Left) {
        return;
    }
    let (Ok((camera, camera_transform)), Ok(window)) = (camera.single(), q_windows.single()) else {
        return;
    };
    let Some(pointer) = pointer(
        camera,
        camera_transform,
        window,
        &res_manager,
        settings.snap_tolerance_px,
    ) else {
        return;
    };

    if let Some(done) = controller.click(
        store,
        pointer.at,
        pointer.tolerance,
        time.elapsed_secs_f64(),
    ) {
        completions.write(done);
    }
}

pub fn handle_modify(
    mut surface: ResMut<MapSurface>,
    camera: Query<(&Camera, &GlobalTransform), With<MapViewerMarker>>,
    q_windows: Query<&Window, With<PrimaryWindow>>,
    buttons: Res<ButtonInput<MouseButton>>,
    res_manager: Res<TileMapResources>,
    settings: Res<MeasureSettings>,
    state: Option<Res<EguiBlockInputState>>,
) {
    let Some(SurfaceSession {
        store, controller, ..
    }) = surface.session_mut()
    else {
        return;
    };
    if controller.mode() != ToolMode::Modify {
        return;
    }
    if buttons.just_released(MouseButton::Left) {
        if let Some(at) = controller.release() {
            debug!("Released vertex {} of feature {}", at.vertex, at.feature);
        }
        return;
    }

    let (Ok((camera, camera_transform)), Ok(window)) = (camera.single(), q_windows.single()) else {
        return;
    };
    let Some(pointer) = pointer(
        camera,
        camera_transform,
        window,
        &res_manager,
        settings.snap_tolerance_px,
    ) else {
        return;
    };

    let blocked = state.is_some_and(|state| state.block_input);
    if buttons.just_pressed(MouseButton::Left) && !blocked {
        controller.grab(store, pointer.at, pointer.tolerance);
    } else if buttons.pressed(MouseButton::Left) {
        controller.drag_to(store, pointer.at, pointer.tolerance);
    }
}

fn draw_path(gizmos: &mut Gizmos, points: &[Vec2], closed: bool, color: Color) {
    for pair in points.windows(2) {
        gizmos.line_2d(pair[0], pair[1], color);
    }
    if closed && points.len() >= 3 {
        gizmos.line_2d(points[points.len() - 1], points[0], color);
    }
}

/// Stored features, the rubber band of the current sketch and the snap target.
pub fn render_annotations(
    mut gizmos: Gizmos,
    surface: Res<MapSurface>,
    camera: Query<(&Camera, &GlobalTransform), With<MapViewerMarker>>,
    q_windows: Query<&Window, With<PrimaryWindow>>,
    res_manager: Res<TileMapResources>,
    settings: Res<MeasureSettings>,
) {
    let Some(session) = surface.session() else {
        return;
    };
    let Ok((camera, camera_transform)) = camera.single() else {
        return;
    };
    let radius = world_per_px(camera, camera_transform).unwrap_or(1.0) * VERTEX_RADIUS_PX;

    let stroke_color = Color::srgb_u8(0xff, 0xcc, 0x33);
    let sketch_color = Color::srgba(1.0, 0.8, 0.2, 0.6);

    for feature in session.store.features() {
        let points: Vec<Vec2> = feature
            .vertices
            .iter()
            .map(|vertex| to_world(*vertex, &res_manager))
            .collect();
        draw_path(
            &mut gizmos,
            &points,
            feature.kind == GeometryKind::Polygon,
            stroke_color,
        );
        if session.controller.mode() == ToolMode::Modify {
            for point in &points {
                gizmos.circle_2d(*point, radius, stroke_color);
            }
        }
    }

    if session.controller.mode() == ToolMode::Idle {
        return;
    }
    let Some(pointer) = q_windows.single().ok().and_then(|window| {
        pointer(
            camera,
            camera_transform,
            window,
            &res_manager,
            settings.snap_tolerance_px,
        )
    }) else {
        return;
    };

    if let Some(sketch) = session.controller.sketch() {
        let points: Vec<Vec2> = session
            .controller
            .preview(&session.store, pointer.at, pointer.tolerance)
            .into_iter()
            .map(|vertex| to_world(vertex, &res_manager))
            .collect();
        draw_path(
            &mut gizmos,
            &points,
            sketch.kind == GeometryKind::Polygon,
            sketch_color,
        );
    }

    let exclude = session.controller.grabbed();
    if let Some((_, vertex)) = session
        .store
        .nearest_vertex(pointer.at, pointer.tolerance, exclude)
    {
        gizmos.circle_2d(to_world(vertex, &res_manager), radius, stroke_color);
    }
}

/// The single mesh holding the translucent fill of every stored polygon.
#[derive(Component)]
pub struct PolygonFill;

pub fn setup_polygon_fill(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
) {
    let fill_color = Srgba {
        red: 1.,
        green: 1.,
        blue: 1.,
        alpha: 0.2,
    };
    commands.spawn((
        Mesh2d(meshes.add(fill_mesh(Vec::new(), Vec::new()))),
        MeshMaterial2d(materials.add(Color::from(fill_color))),
        Transform::from_translation(Vec3::new(0.0, 0.0, FILL_ELEVATION)),
        Visibility::Hidden,
        PolygonFill,
    ));
}

/// Triangulates a ring given in world space. Concave rings are handled by earcut.
pub fn fill_triangles(ring: &[Vec2]) -> Option<(Vec<[f32; 3]>, Vec<u32>)> {
    if ring.len() < 3 {
        return None;
    }
    let exterior: LineString<f64> = ring
        .iter()
        .map(|point| (point.x as f64, point.y as f64))
        .collect();
    let triangulation = Polygon::new(exterior, vec![]).earcut_triangles_raw();
    if triangulation.triangle_indices.is_empty() {
        return None;
    }
    let positions = triangulation
        .vertices
        .chunks_exact(2)
        .map(|xy| [xy[0] as f32, xy[1] as f32, 0.0])
        .collect();
    let indices = triangulation
        .triangle_indices
        .iter()
        .map(|index| *index as u32)
        .collect();
    Some((positions, indices))
}

fn fill_mesh(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Mesh {
    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_indices(Indices::U32(indices))
}

/// Rebuilds the fill mesh from the stored polygons in the current world space.
pub fn render_polygon_fills(
    surface: Res<MapSurface>,
    res_manager: Res<TileMapResources>,
    mut fills: Query<(&Mesh2d, &mut Visibility), With<PolygonFill>>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let Ok((mesh, mut visibility)) = fills.single_mut() else {
        return;
    };
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    if let Some(session) = surface.session() {
        for feature in session.store.features() {
            if feature.kind != GeometryKind::Polygon {
                continue;
            }
            let ring: Vec<Vec2> = feature
                .vertices
                .iter()
                .map(|vertex| to_world(*vertex, &res_manager))
                .collect();
            let Some((ring_positions, ring_indices)) = fill_triangles(&ring) else {
                continue;
            };
            let offset = positions.len() as u32;
            positions.extend(ring_positions);
            indices.extend(ring_indices.into_iter().map(|index| index + offset));
        }
    }

    let wanted = if indices.is_empty() {
        Visibility::Hidden
    } else {
        Visibility::Inherited
    };
    if *visibility != wanted {
        *visibility = wanted;
    }
    if let Some(target) = meshes.get_mut(&mesh.0) {
        *target = fill_mesh(positions, indices);
    }
}
