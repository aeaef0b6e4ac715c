//! Runtime configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial (or
//! missing) file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default vehicle link endpoint.
pub const DEFAULT_VEHICLE_URL: &str = "ws://localhost:5790/vehicle/1";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Invalid configuration: {0}")]
    Parse(String),
}

/// Breach-return altitude metadata, injected into every document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltitudeSettings {
    /// Altitude used when no breach return point is set (meters).
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for AltitudeSettings {
    fn default() -> Self {
        Self {
            default: 50.0,
            min: 0.0,
            max: 10_000.0,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FenceConfig {
    pub altitude: AltitudeSettings,
    /// Websocket URL of the vehicle link.
    pub vehicle_url: String,
    /// Directory for stored fence plans. `None` means the platform default.
    pub storage_dir: Option<PathBuf>,
    /// How long the CLI waits for a vehicle operation to complete.
    pub sync_timeout_secs: u64,
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            altitude: AltitudeSettings::default(),
            vehicle_url: DEFAULT_VEHICLE_URL.to_string(),
            storage_dir: None,
            sync_timeout_secs: 10,
        }
    }
}

impl FenceConfig {
    /// Parse configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    ///
    /// On Unix: `~/.config/fencesync/config.json`
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_location() {
            Some(path) if path.exists() => {
                log::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Platform config file path.
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fencesync").join("config.json"))
    }

    /// Resolved plan storage directory.
    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.storage_dir.clone().or_else(|| {
            dirs::data_local_dir()
                .or_else(dirs::home_dir)
                .map(|base| base.join("fencesync").join("plans"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = FenceConfig::from_json(r#"{ "altitude": { "default": 80.0 } }"#).unwrap();
        assert!((config.altitude.default - 80.0).abs() < f64::EPSILON);
        assert!((config.altitude.max - 10_000.0).abs() < f64::EPSILON);
        assert_eq!(config.vehicle_url, DEFAULT_VEHICLE_URL);
        assert_eq!(config.sync_timeout_secs, 10);
    }

    #[test]
    fn test_invalid_config() {
        let result = FenceConfig::from_json(r#"{ "sync_timeout_secs": "soon" }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "vehicle_url": "ws://10.0.0.2:5790/vehicle/3" }"#).unwrap();
        let config = FenceConfig::load(&path).unwrap();
        assert_eq!(config.vehicle_url, "ws://10.0.0.2:5790/vehicle/3");
    }

    #[test]
    fn test_explicit_storage_dir() {
        let config = FenceConfig {
            storage_dir: Some(PathBuf::from("/tmp/plans")),
            ..FenceConfig::default()
        };
        assert_eq!(config.storage_dir(), Some(PathBuf::from("/tmp/plans")));
    }
}
