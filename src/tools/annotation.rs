use std::{
    f64::consts::FRAC_PI_4,
    fmt::Display,
};

use rstar::{AABB, RTree, primitives::GeomWithData};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A vertex position, `x` is longitude and `y` latitude when measuring on the map.
pub type Vertex = geo::Coord<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Line,
    Polygon,
}

impl GeometryKind {
    /// Fewest distinct vertices that still enclose a length or an area.
    pub fn min_vertices(self) -> usize {
        match self {
            GeometryKind::Line => 2,
            GeometryKind::Polygon => 3,
        }
    }
}

impl Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryKind::Line => write!(f, "Line"),
            GeometryKind::Polygon => write!(f, "Polygon"),
        }
    }
}

/// Drops consecutive repeats (a double click lands twice on the same spot) and, for
/// polygons, a closing vertex equal to the first one.
pub fn distinct_vertices(kind: GeometryKind, vertices: &[Vertex]) -> Vec<Vertex> {
    let mut out: Vec<Vertex> = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        if out.last() != Some(vertex) {
            out.push(*vertex);
        }
    }
    if kind == GeometryKind::Polygon && out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Uuid,
    pub kind: GeometryKind,
    /// Polygons are kept as an open ring.
    pub vertices: Vec<Vertex>,
}

/// Addresses one vertex of one stored feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexRef {
    pub feature: usize,
    pub vertex: usize,
}

type VertexEntry = GeomWithData<[f64; 2], VertexRef>;

/// Web Mercator clips the poles here.
const MAX_LATITUDE: f64 = 85.051_128_78;

/// Projects a vertex onto the map plane, in degrees of longitude on both axes.
///
/// The base map is Web Mercator, so one screen pixel covers the same distance on both
/// axes of this plane. Snap tolerances are measured here.
pub fn map_plane(vertex: Vertex) -> [f64; 2] {
    let lat = vertex.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    [vertex.x, (FRAC_PI_4 + lat / 2.0).tan().ln().to_degrees()]
}

/// Distance between two vertices on the map plane.
pub fn map_distance(a: Vertex, b: Vertex) -> f64 {
    let ([ax, ay], [bx, by]) = (map_plane(a), map_plane(b));
    (ax - bx).hypot(ay - by)
}

/// Drawn features in draw order, with a vertex index for snapping and picking.
#[derive(Default)]
pub struct AnnotationStore {
    features: Vec<Feature>,
    index: RTree<VertexEntry>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a finished sketch. Returns `None` when it has too few distinct vertices.
    pub fn insert(&mut self, kind: GeometryKind, vertices: &[Vertex]) -> Option<Uuid> {
        let vertices = distinct_vertices(kind, vertices);
        if vertices.len() < kind.min_vertices() {
            return None;
        }
        let id = Uuid::new_v4();
        self.features.push(Feature {
            id,
            kind,
            vertices,
        });
        self.rebuild_index();
        Some(id)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn vertex(&self, at: VertexRef) -> Option<Vertex> {
        self.features
            .get(at.feature)
            .and_then(|feature| feature.vertices.get(at.vertex))
            .copied()
    }

    /// Whether `other` is `at` or one of its neighbours along the same feature.
    pub fn adjacent(&self, at: VertexRef, other: VertexRef) -> bool {
        if at.feature != other.feature {
            return false;
        }
        let Some(feature) = self.features.get(at.feature) else {
            return false;
        };
        let len = feature.vertices.len();
        let gap = at.vertex.abs_diff(other.vertex);
        match feature.kind {
            GeometryKind::Line => gap <= 1,
            GeometryKind::Polygon => gap <= 1 || gap + 1 == len,
        }
    }

    /// The closest stored vertex within `tolerance` of `point` on the map plane.
    ///
    /// With `dragged` set, that vertex and its neighbours are skipped, so a drag can never
    /// fold an edge onto itself.
    pub fn nearest_vertex(
        &self,
        point: Vertex,
        tolerance: f64,
        dragged: Option<VertexRef>,
    ) -> Option<(VertexRef, Vertex)> {
        if tolerance <= 0.0 || !tolerance.is_finite() {
            return None;
        }
        let [x, y] = map_plane(point);
        let envelope = AABB::from_corners([x - tolerance, y - tolerance], [x + tolerance, y + tolerance]);
        self.index
            .locate_in_envelope(&envelope)
            .filter(|entry| dragged.is_none_or(|at| !self.adjacent(at, entry.data)))
            .filter_map(|entry| {
                let [ex, ey] = *entry.geom();
                let distance = (ex - x).hypot(ey - y);
                (distance <= tolerance).then_some((entry.data, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .and_then(|(at, _)| Some((at, self.vertex(at)?)))
    }

    /// Snaps `point` onto the nearest stored vertex, or returns it unchanged.
    pub fn snap(&self, point: Vertex, tolerance: f64, dragged: Option<VertexRef>) -> Vertex {
        self.nearest_vertex(point, tolerance, dragged)
            .map(|(_, vertex)| vertex)
            .unwrap_or(point)
    }

    pub fn move_vertex(&mut self, at: VertexRef, to: Vertex) -> bool {
        let Some(vertex) = self
            .features
            .get_mut(at.feature)
            .and_then(|feature| feature.vertices.get_mut(at.vertex))
        else {
            return false;
        };
        *vertex = to;
        self.rebuild_index();
        true
    }

    fn rebuild_index(&mut self) {
        let entries = self
            .features
            .iter()
            .enumerate()
            .flat_map(|(feature, f)| {
                f.vertices.iter().enumerate().map(move |(vertex, v)| {
                    GeomWithData::new(map_plane(*v), VertexRef { feature, vertex })
                })
            })
            .collect();
        self.index = RTree::bulk_load(entries);
    }
}
