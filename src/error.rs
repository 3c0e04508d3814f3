use std::path::PathBuf;

use thiserror::Error;

use crate::tools::GeometryKind;

/// Failures of the map surface lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("no rendering target available, the map cannot be mounted")]
    MissingRenderTarget,
}

/// Reasons a completed draw produces no measurement.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeasureError {
    #[error("draw completion carried no geometry")]
    MissingGeometry,
    #[error("{kind} needs at least {required} distinct vertices, got {distinct}")]
    DegenerateGeometry {
        kind: GeometryKind,
        distinct: usize,
        required: usize,
    },
    #[error("{kind} measurement is not a finite number")]
    NonFinite { kind: GeometryKind },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine a configuration directory")]
    NoConfigDir,
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
