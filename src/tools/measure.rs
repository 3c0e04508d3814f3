use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender, unbounded};
use geo::{Area, ChamberlainDuquetteArea, Distance, Euclidean, Haversine, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::{error::MeasureError, settings::MeasureSettings, surface::MapSurface};

use super::{DrawCompleted, GeometryKind, Vertex, distinct_vertices};

/// How vertex coordinates are interpreted when measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureSpace {
    /// Plain cartesian units.
    Planar,
    /// Degrees of longitude/latitude on a sphere, results in metres and square metres.
    #[default]
    Spherical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub kind: GeometryKind,
    /// Always formatted with two decimals.
    pub value: String,
}

/// Length of a line or enclosed area of a polygon.
pub fn measure(
    kind: GeometryKind,
    vertices: &[Vertex],
    space: MeasureSpace,
) -> Result<Measurement, MeasureError> {
    let vertices = distinct_vertices(kind, vertices);
    let required = kind.min_vertices();
    if vertices.len() < required {
        return Err(MeasureError::DegenerateGeometry {
            kind,
            distinct: vertices.len(),
            required,
        });
    }

    let amount = match kind {
        GeometryKind::Line => length(&vertices, space),
        GeometryKind::Polygon => {
            let polygon = Polygon::new(LineString::from(vertices), vec![]);
            match space {
                MeasureSpace::Planar => polygon.unsigned_area(),
                MeasureSpace::Spherical => polygon.chamberlain_duquette_unsigned_area(),
            }
        }
    };
    if !amount.is_finite() {
        return Err(MeasureError::NonFinite { kind });
    }

    Ok(Measurement {
        kind,
        value: format!("{amount:.2}"),
    })
}

fn length(vertices: &[Vertex], space: MeasureSpace) -> f64 {
    vertices
        .windows(2)
        .map(|pair| {
            let (a, b) = (Point::from(pair[0]), Point::from(pair[1]));
            match space {
                MeasureSpace::Planar => Euclidean.distance(a, b),
                MeasureSpace::Spherical => Haversine.distance(a, b),
            }
        })
        .sum()
}

/// Creates the two ends of the measurement feed.
///
/// The reporter sends every outcome, the display keeps only the newest one. `None` on the
/// feed means "show nothing".
pub fn measurement_feed() -> (MeasurementReporter, MeasurementDisplay) {
    let (tx, rx) = unbounded();
    (
        MeasurementReporter { tx },
        MeasurementDisplay { rx, current: None },
    )
}

pub struct MeasurementReporter {
    tx: Sender<Option<Measurement>>,
}

impl MeasurementReporter {
    /// Measures a completed draw and publishes the outcome.
    ///
    /// A completion without geometry is dropped and leaves the display untouched. Any other
    /// failure clears it, the display must never show a stale result for a newer draw.
    pub fn report(
        &self,
        completion: &DrawCompleted,
        space: MeasureSpace,
    ) -> Result<Measurement, MeasureError> {
        let Some(geometry) = completion.geometry.as_deref() else {
            return Err(MeasureError::MissingGeometry);
        };
        let outcome = measure(completion.kind, geometry, space);
        if self.tx.send(outcome.clone().ok()).is_err() {
            warn!("Measurement display is gone, {} result dropped", completion.kind);
        }
        outcome
    }
}

/// The single displayed measurement, replaced by whatever arrived last.
pub struct MeasurementDisplay {
    rx: Receiver<Option<Measurement>>,
    current: Option<Measurement>,
}

impl MeasurementDisplay {
    /// The measurement to display, if any.
    pub fn latest(&mut self) -> Option<&Measurement> {
        if let Some(newest) = self.rx.try_iter().last() {
            self.current = newest;
        }
        self.current.as_ref()
    }
}

pub fn publish_measurements(
    mut completions: EventReader<DrawCompleted>,
    surface: Res<MapSurface>,
    settings: Res<MeasureSettings>,
) {
    let Some(session) = surface.session() else {
        completions.clear();
        return;
    };
    for completion in completions.read() {
        match session.reporter.report(completion, settings.space) {
            Ok(measurement) => info!("Measured {}: {}", measurement.kind, measurement.value),
            Err(MeasureError::MissingGeometry) => {
                debug!("Dropped a {} completion without geometry", completion.kind)
            }
            Err(e) => warn!("No measurement: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vertex {
        Vertex { x, y }
    }

    fn completed(kind: GeometryKind, vertices: &[Vertex]) -> DrawCompleted {
        DrawCompleted {
            kind,
            geometry: Some(vertices.to_vec()),
        }
    }

    #[test]
    fn planar_line_length() {
        let m = measure(GeometryKind::Line, &[v(0., 0.), v(3., 4.)], MeasureSpace::Planar).unwrap();
        assert_eq!(m.kind, GeometryKind::Line);
        assert_eq!(m.value, "5.00");
    }

    #[test]
    fn planar_square_area() {
        let square = [v(0., 0.), v(0., 2.), v(2., 2.), v(2., 0.)];
        let m = measure(GeometryKind::Polygon, &square, MeasureSpace::Planar).unwrap();
        assert_eq!(m.kind, GeometryKind::Polygon);
        assert_eq!(m.value, "4.00");
    }

    #[test]
    fn multi_segment_line_sums_segments() {
        let path = [v(0., 0.), v(3., 4.), v(3., 4.), v(3., 10.)];
        let m = measure(GeometryKind::Line, &path, MeasureSpace::Planar).unwrap();
        assert_eq!(m.value, "11.00");
    }

    #[test]
    fn values_always_have_two_decimals() {
        let m = measure(GeometryKind::Line, &[v(0., 0.), v(1., 1.)], MeasureSpace::Planar).unwrap();
        assert_eq!(m.value, "1.41");

        let triangle = [v(0., 0.), v(1., 0.), v(0., 1.)];
        let m = measure(GeometryKind::Polygon, &triangle, MeasureSpace::Planar).unwrap();
        assert_eq!(m.value, "0.50");
    }

    #[test]
    fn winding_order_does_not_change_area() {
        let clockwise = [v(0., 0.), v(0., 2.), v(2., 2.), v(2., 0.)];
        let counter: Vec<Vertex> = clockwise.iter().rev().copied().collect();
        let a = measure(GeometryKind::Polygon, &clockwise, MeasureSpace::Planar).unwrap();
        let b = measure(GeometryKind::Polygon, &counter, MeasureSpace::Planar).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let m = measure(GeometryKind::Line, &[v(0., 0.), v(0., 1.)], MeasureSpace::Spherical)
            .unwrap();
        let metres: f64 = m.value.parse().unwrap();
        assert!((metres - 111_195.08).abs() < 1.0, "got {metres}");
    }

    #[test]
    fn one_degree_square_at_the_equator() {
        let square = [v(0., 0.), v(1., 0.), v(1., 1.), v(0., 1.)];
        let m = measure(GeometryKind::Polygon, &square, MeasureSpace::Spherical).unwrap();
        let square_metres: f64 = m.value.parse().unwrap();
        assert!(
            (1.2e10..1.25e10).contains(&square_metres),
            "got {square_metres}"
        );
    }

    #[test]
    fn degenerate_geometries_are_rejected() {
        let err = measure(GeometryKind::Line, &[v(1., 1.)], MeasureSpace::Planar).unwrap_err();
        assert_eq!(
            err,
            MeasureError::DegenerateGeometry {
                kind: GeometryKind::Line,
                distinct: 1,
                required: 2
            }
        );

        let err = measure(
            GeometryKind::Polygon,
            &[v(0., 0.), v(1., 1.), v(1., 1.), v(0., 0.)],
            MeasureSpace::Planar,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MeasureError::DegenerateGeometry { required: 3, distinct: 2, .. }
        ));
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        let err = measure(
            GeometryKind::Line,
            &[v(0., 0.), v(f64::INFINITY, 0.)],
            MeasureSpace::Planar,
        )
        .unwrap_err();
        assert_eq!(err, MeasureError::NonFinite { kind: GeometryKind::Line });
    }

    #[test]
    fn nothing_is_shown_before_the_first_draw() {
        let (_reporter, mut display) = measurement_feed();
        assert!(display.latest().is_none());
    }

    #[test]
    fn latest_completion_replaces_earlier_ones() {
        let (reporter, mut display) = measurement_feed();
        for k in 1..=5 {
            let line = completed(GeometryKind::Line, &[v(0., 0.), v(k as f64, 0.)]);
            reporter.report(&line, MeasureSpace::Planar).unwrap();
        }
        assert_eq!(display.latest().unwrap().value, "5.00");

        let square = completed(GeometryKind::Polygon, &[v(0., 0.), v(0., 2.), v(2., 2.), v(2., 0.)]);
        reporter.report(&square, MeasureSpace::Planar).unwrap();

        let shown = display.latest().unwrap();
        assert_eq!(shown.kind, GeometryKind::Polygon);
        assert_eq!(shown.value, "4.00");
        // Reading does not consume the displayed value.
        assert_eq!(display.latest().unwrap().value, "4.00");
    }

    #[test]
    fn reporting_without_a_display_still_measures() {
        let (reporter, display) = measurement_feed();
        drop(display);
        let line = completed(GeometryKind::Line, &[v(0., 0.), v(3., 4.)]);
        assert_eq!(reporter.report(&line, MeasureSpace::Planar).unwrap().value, "5.00");
    }

    #[test]
    fn missing_geometry_leaves_the_slot_alone() {
        let (reporter, mut display) = measurement_feed();
        reporter
            .report(&completed(GeometryKind::Line, &[v(0., 0.), v(3., 4.)]), MeasureSpace::Planar)
            .unwrap();

        let empty = DrawCompleted {
            kind: GeometryKind::Polygon,
            geometry: None,
        };
        assert_eq!(
            reporter.report(&empty, MeasureSpace::Planar),
            Err(MeasureError::MissingGeometry)
        );
        assert_eq!(display.latest().unwrap().value, "5.00");
    }

    #[test]
    fn degenerate_completion_clears_the_slot() {
        let (reporter, mut display) = measurement_feed();
        reporter
            .report(&completed(GeometryKind::Line, &[v(0., 0.), v(3., 4.)]), MeasureSpace::Planar)
            .unwrap();
        assert!(display.latest().is_some());

        let dot = completed(GeometryKind::Line, &[v(2., 2.), v(2., 2.)]);
        assert!(reporter.report(&dot, MeasureSpace::Planar).is_err());
        assert!(display.latest().is_none());
    }

    #[test]
    fn publish_system_feeds_the_mounted_session() {
        let mut app = App::new();
        let mut surface = MapSurface::default();
        surface.mount(Some(Entity::from_raw(7))).unwrap();
        app.add_event::<DrawCompleted>()
            .insert_resource(surface)
            .insert_resource(MeasureSettings {
                space: MeasureSpace::Planar,
                ..Default::default()
            })
            .add_systems(Update, publish_measurements);

        app.world_mut()
            .send_event(completed(GeometryKind::Line, &[v(0., 0.), v(3., 4.)]));
        app.update();

        let mut surface = app.world_mut().resource_mut::<MapSurface>();
        let session = surface.session_mut().unwrap();
        assert_eq!(session.display.latest().unwrap().value, "5.00");
    }

    #[test]
    fn publish_system_ignores_completions_while_unmounted() {
        let mut app = App::new();
        app.add_event::<DrawCompleted>()
            .insert_resource(MapSurface::default())
            .insert_resource(MeasureSettings::default())
            .add_systems(Update, publish_measurements);

        app.world_mut()
            .send_event(completed(GeometryKind::Line, &[v(0., 0.), v(3., 4.)]));
        app.update();

        assert!(app.world().resource::<MapSurface>().session().is_none());
    }
}
