use std::{
    fs,
    path::{Path, PathBuf},
};

use bevy::prelude::*;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{error::SettingsError, tools::MeasureSpace};

pub const SETTINGS_FILE: &str = "settings.json";

/// Where the map opens, stored as plain lat/long so the file stays readable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartingLocation {
    pub lat: f32,
    pub long: f32,
}

/// User tunable settings, read once before the app is built.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureSettings {
    pub starting_location: StartingLocation,
    pub starting_zoom: u32,
    pub tile_quality: f32,
    pub cache_dir: String,
    /// Snap radius in screen pixels.
    pub snap_tolerance_px: f32,
    pub double_click_secs: f64,
    pub space: MeasureSpace,
}

impl Default for MeasureSettings {
    fn default() -> Self {
        Self {
            starting_location: StartingLocation { lat: 0.0, long: 0.0 },
            starting_zoom: 2,
            tile_quality: 256.0,
            cache_dir: "cache".to_string(),
            snap_tolerance_px: 10.0,
            double_click_secs: 0.3,
            space: MeasureSpace::Spherical,
        }
    }
}

impl MeasureSettings {
    /// Loads the user settings. A missing file is not an error, the defaults are used.
    pub fn load() -> Result<Self, SettingsError> {
        let path = settings_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let data = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

pub fn settings_path() -> Result<PathBuf, SettingsError> {
    let dirs = ProjectDirs::from("org", "map-measure", "map-measure")
        .ok_or(SettingsError::NoConfigDir)?;
    Ok(dirs.config_dir().join(SETTINGS_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let settings =
            MeasureSettings::from_json(r#"{ "starting_zoom": 14, "space": "planar" }"#).unwrap();

        assert_eq!(settings.starting_zoom, 14);
        assert_eq!(settings.space, MeasureSpace::Planar);
        assert_eq!(settings.snap_tolerance_px, 10.0);
        assert_eq!(settings.cache_dir, "cache");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = std::env::temp_dir().join(format!("map-measure-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();

        let err = MeasureSettings::from_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join("map-measure-does-not-exist").join(SETTINGS_FILE);
        let err = MeasureSettings::from_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[test]
    fn defaults_open_the_whole_world() {
        let settings = MeasureSettings::default();
        assert_eq!(settings.starting_location, StartingLocation { lat: 0.0, long: 0.0 });
        assert_eq!(settings.starting_zoom, 2);
        assert_eq!(settings.space, MeasureSpace::Spherical);
    }
}
