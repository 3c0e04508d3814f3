use std::fmt::Display;

use bevy::prelude::*;

use super::{AnnotationStore, GeometryKind, Vertex, VertexRef, map_distance};

/// The single active interaction. Only the handlers of this mode receive input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolMode {
    #[default]
    Idle,
    DrawLine,
    DrawPolygon,
    Modify,
}

impl ToolMode {
    pub const ALL: [ToolMode; 4] = [
        ToolMode::Idle,
        ToolMode::DrawLine,
        ToolMode::DrawPolygon,
        ToolMode::Modify,
    ];

    pub fn draws(self) -> Option<GeometryKind> {
        match self {
            ToolMode::DrawLine => Some(GeometryKind::Line),
            ToolMode::DrawPolygon => Some(GeometryKind::Polygon),
            _ => None,
        }
    }
}

impl Display for ToolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolMode::Idle => write!(f, "Pan"),
            ToolMode::DrawLine => write!(f, "Line"),
            ToolMode::DrawPolygon => write!(f, "Polygon"),
            ToolMode::Modify => write!(f, "Modify"),
        }
    }
}

/// Sent once per finished sketch, whether or not it is measurable.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct DrawCompleted {
    pub kind: GeometryKind,
    pub geometry: Option<Vec<Vertex>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sketch {
    pub kind: GeometryKind,
    pub vertices: Vec<Vertex>,
}

#[derive(Debug, Clone, Copy)]
struct Click {
    at: Vertex,
    secs: f64,
    /// This click finished a sketch.
    finished: bool,
}

pub struct InteractionController {
    mode: ToolMode,
    sketch: Option<Sketch>,
    grabbed: Option<VertexRef>,
    last_click: Option<Click>,
    double_click_secs: f64,
}

impl InteractionController {
    pub fn new(double_click_secs: f64) -> Self {
        Self {
            mode: ToolMode::Idle,
            sketch: None,
            grabbed: None,
            last_click: None,
            double_click_secs,
        }
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    pub fn sketch(&self) -> Option<&Sketch> {
        self.sketch.as_ref()
    }

    pub fn grabbed(&self) -> Option<VertexRef> {
        self.grabbed
    }

    pub fn set_mode(&mut self, mode: ToolMode) {
        if mode != self.mode {
            debug!("Tool mode {} -> {}", self.mode, mode);
        }
        self.mode = mode;
        self.sketch = None;
        self.grabbed = None;
        self.last_click = None;
    }

    /// Handles a primary click in a draw mode.
    ///
    /// Returns a completion when the click finishes the sketch: a double click, or a click
    /// on the first vertex of a polygon ring that already has three vertices. The second
    /// half of a double click that landed right after a finish is swallowed.
    pub fn click(
        &mut self,
        store: &mut AnnotationStore,
        point: Vertex,
        tolerance: f64,
        secs: f64,
    ) -> Option<DrawCompleted> {
        let kind = self.mode.draws()?;
        let point = store.snap(point, tolerance, None);

        let previous = self.last_click.replace(Click {
            at: point,
            secs,
            finished: false,
        });
        let double_click = previous.filter(|last| {
            secs - last.secs <= self.double_click_secs && within(last.at, point, tolerance)
        });

        let Some(sketch) = self.sketch.as_mut() else {
            if double_click.is_some_and(|last| last.finished) {
                self.last_click = None;
                return None;
            }
            self.sketch = Some(Sketch {
                kind,
                vertices: vec![point],
            });
            return None;
        };
        let closes_ring = kind == GeometryKind::Polygon
            && sketch.vertices.len() >= kind.min_vertices()
            && within(sketch.vertices[0], point, tolerance);
        if double_click.is_none() && !closes_ring {
            sketch.vertices.push(point);
            return None;
        }
        let done = self.finish(store);
        self.last_click = Some(Click {
            at: point,
            secs,
            finished: true,
        });
        done
    }

    /// Ends the sketch. Measurable geometries are added to the store.
    pub fn finish(&mut self, store: &mut AnnotationStore) -> Option<DrawCompleted> {
        let sketch = self.sketch.take()?;
        self.last_click = None;
        if let Some(id) = store.insert(sketch.kind, &sketch.vertices) {
            debug!("Stored {} {}, {} features", sketch.kind, id, store.len());
        }
        Some(DrawCompleted {
            kind: sketch.kind,
            geometry: Some(sketch.vertices),
        })
    }

    /// Drops the sketch without a completion. Returns false if there was nothing to drop.
    pub fn abort(&mut self) -> bool {
        self.last_click = None;
        self.grabbed = None;
        self.sketch.take().is_some()
    }

    /// Picks up the vertex under the pointer in modify mode.
    pub fn grab(&mut self, store: &AnnotationStore, point: Vertex, tolerance: f64) -> bool {
        if self.mode != ToolMode::Modify {
            return false;
        }
        self.grabbed = store
            .nearest_vertex(point, tolerance, None)
            .map(|(at, _)| at);
        self.grabbed.is_some()
    }

    pub fn drag_to(&mut self, store: &mut AnnotationStore, point: Vertex, tolerance: f64) {
        let Some(at) = self.grabbed else {
            return;
        };
        let target = store.snap(point, tolerance, Some(at));
        if store.vertex(at) != Some(target) {
            store.move_vertex(at, target);
        }
    }

    pub fn release(&mut self) -> Option<VertexRef> {
        self.grabbed.take()
    }

    /// The sketch followed by the snapped cursor, for rubber band rendering.
    pub fn preview(&self, store: &AnnotationStore, cursor: Vertex, tolerance: f64) -> Vec<Vertex> {
        let Some(sketch) = self.sketch.as_ref() else {
            return Vec::new();
        };
        let mut points = sketch.vertices.clone();
        points.push(store.snap(cursor, tolerance, None));
        points
    }
}

fn within(a: Vertex, b: Vertex, tolerance: f64) -> bool {
    map_distance(a, b) <= tolerance
}
