//! Versioned settings document with forward-only migration.
//!
//! Schema version 2. A version-1 document (no `open_range` section) loads
//! as version 2 with defaults filled in and is rewritten on the next save;
//! loading never writes. A missing file yields the defaults document; a
//! malformed file yields the defaults document plus a recoverable error so
//! the caller can decide whether to overwrite.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::physics::{Conditions, Surface};
use crate::router::RouterMode;

/// Current schema version.
pub const SETTINGS_VERSION: u32 = 2;

const FILE_NAME: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed settings document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("settings document has no integer `version` field")]
    MissingVersion,
    #[error("settings version {found} is newer than supported version {SETTINGS_VERSION}")]
    UnsupportedVersion { found: u64 },
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub host: String,
    pub port: u16,
    pub auto_connect: bool,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::openconnect::DEFAULT_PORT,
            auto_connect: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub auto_connect: bool,
    pub reject_zero_spin: bool,
    pub use_mock: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            auto_connect: true,
            reject_zero_spin: true,
            use_mock: false,
        }
    }
}

/// Environment fields of the `open_range` section. The barometric pressure
/// is not part of the document; it defaults when building [`Conditions`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeConditions {
    pub temp_f: f64,
    pub elevation_ft: f64,
    pub humidity_pct: f64,
    pub wind_speed_mph: f64,
    pub wind_dir_deg: f64,
}

impl Default for RangeConditions {
    fn default() -> Self {
        let c = Conditions::default();
        Self {
            temp_f: c.temp_f,
            elevation_ft: c.elevation_ft,
            humidity_pct: c.humidity_pct,
            wind_speed_mph: c.wind_speed_mph,
            wind_dir_deg: c.wind_dir_deg,
        }
    }
}

impl From<&RangeConditions> for Conditions {
    fn from(rc: &RangeConditions) -> Self {
        Self {
            temp_f: rc.temp_f,
            elevation_ft: rc.elevation_ft,
            humidity_pct: rc.humidity_pct,
            wind_speed_mph: rc.wind_speed_mph,
            wind_dir_deg: rc.wind_dir_deg,
            ..Conditions::default()
        }
    }
}

/// The `open_range` section, new in version 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRangeSettings {
    pub conditions: RangeConditions,
    pub surface: Surface,
    pub show_trajectory: bool,
    pub camera_follow: bool,
}

impl Default for OpenRangeSettings {
    fn default() -> Self {
        Self {
            conditions: RangeConditions::default(),
            surface: Surface::Fairway,
            show_trajectory: true,
            camera_follow: true,
        }
    }
}

/// The whole settings document (schema version 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub version: u32,
    #[serde(default)]
    pub mode: RouterMode,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    /// Presentation state; opaque to the core, preserved across saves.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub ui: serde_json::Value,
    #[serde(default)]
    pub open_range: OpenRangeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            mode: RouterMode::default(),
            remote: RemoteSettings::default(),
            device: DeviceSettings::default(),
            ui: serde_json::Value::Null,
            open_range: OpenRangeSettings::default(),
        }
    }
}

impl Settings {
    /// Platform settings path: `GC2 Connect/settings.json` under the macOS
    /// application-support directory, `gc2-connect/settings.json` under the
    /// XDG config directory elsewhere.
    pub fn default_path() -> Option<PathBuf> {
        let dir = if cfg!(target_os = "macos") {
            "GC2 Connect"
        } else {
            "gc2-connect"
        };
        dirs::config_dir().map(|d| d.join(dir).join(FILE_NAME))
    }

    /// Load from `path`. Always yields a usable document:
    /// - missing file → defaults, no error;
    /// - version 1 → migrated to version 2 in memory (rewritten on next save);
    /// - malformed / unsupported → defaults plus the recoverable error. The
    ///   file is left untouched until the caller explicitly saves.
    pub fn load_from(path: &Path) -> (Self, Option<SettingsError>) {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(?path, "no settings file, using defaults");
                return (Self::default(), None);
            }
            Err(e) => {
                warn!(?path, error = %e, "settings unreadable, using defaults");
                return (Self::default(), Some(SettingsError::Io(e)));
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!(?path, error = %e, "settings malformed, using defaults");
                return (Self::default(), Some(SettingsError::Malformed(e)));
            }
        };

        let version = value.get("version").and_then(serde_json::Value::as_u64);
        match version {
            None => (Self::default(), Some(SettingsError::MissingVersion)),
            Some(v) if v > u64::from(SETTINGS_VERSION) => (
                Self::default(),
                Some(SettingsError::UnsupportedVersion { found: v }),
            ),
            Some(v) => match serde_json::from_value::<Settings>(value) {
                Ok(mut settings) => {
                    if v < u64::from(SETTINGS_VERSION) {
                        info!(from = v, to = SETTINGS_VERSION, "migrated settings document");
                        settings.version = SETTINGS_VERSION;
                    }
                    (settings, None)
                }
                Err(e) => (Self::default(), Some(SettingsError::Malformed(e))),
            },
        }
    }

    /// Save to `path`, atomically: write a sibling temp file, then rename
    /// over the destination. Parent directories are created as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Physics conditions for the open range, pressure defaulted.
    pub fn range_conditions(&self) -> Conditions {
        Conditions::from(&self.open_range.conditions)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
