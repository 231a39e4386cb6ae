//! Scanner settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::ExportFormat;

/// Environment variable overriding [`ScannerSettings::export_dir`]
pub const EXPORT_DIR_ENV: &str = "SCANNER_EXPORT_DIR";

/// Upload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// User-Agent header sent with uploads
    pub user_agent: String,
}

impl UploadSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("scanner/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// All scanner settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Directory default-path exports are written to
    pub export_dir: PathBuf,
    /// File name (without extension) of default-path exports
    pub file_stem: String,
    /// Upload settings
    pub upload: UploadSettings,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            export_dir: std::env::temp_dir(),
            file_stem: "scan".to_string(),
            upload: UploadSettings::default(),
        }
    }
}

impl ScannerSettings {
    /// Settings for artifacts written under `dir`
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Location of the settings file, if the platform has a config dir
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "scanner", "scanner")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Load settings from file, or return default if not found.
    /// `SCANNER_EXPORT_DIR` wins over the file.
    pub fn load() -> Self {
        let mut settings = Self::config_path()
            .and_then(|path| Self::load_from(&path))
            .unwrap_or_default();
        if let Some(dir) = std::env::var_os(EXPORT_DIR_ENV) {
            settings.export_dir = PathBuf::from(dir);
        }
        settings
    }

    /// Read settings from a JSON file; `None` when missing or unreadable
    pub fn load_from(path: &Path) -> Option<Self> {
        let json = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&json) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!("Ignoring malformed settings {}: {e}", path.display());
                None
            }
        }
    }

    /// `<export_dir>/<file_stem>.<ext>`
    pub fn default_artifact_path(&self, format: ExportFormat) -> PathBuf {
        self.export_dir
            .join(format!("{}.{}", self.file_stem, format.extension()))
    }
}
