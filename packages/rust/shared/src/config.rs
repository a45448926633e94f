//! Settings for the Supramolecular Explorer.
//!
//! Settings are read from `.env.toml` in the working directory, falling back to
//! `settings.toml`, then to `~/.supramol/settings.toml`. An explicit
//! `--settings` path on the command line skips the lookup entirely.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SupramolError};

/// Local settings file names, in lookup order.
pub const SETTINGS_CANDIDATES: [&str; 2] = [".env.toml", "settings.toml"];

/// User-level settings directory name under the home directory.
const SETTINGS_DIR_NAME: &str = ".supramol";

/// User-level settings file name.
const SETTINGS_FILE_NAME: &str = "settings.toml";

// ---------------------------------------------------------------------------
// Settings structs (matching settings.toml schema)
// ---------------------------------------------------------------------------

/// Top-level settings, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level and destination.
    #[serde(default)]
    pub logger: LoggerSettings,

    /// Database and raw data locations.
    #[serde(default)]
    pub paths: PathSettings,

    /// Mass spectrometry analysis defaults.
    #[serde(default)]
    pub ms: MsSettings,
}

/// `[logger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Level name: trace, debug, info, warn or error.
    #[serde(default = "default_level")]
    pub level: String,

    /// Log file, appended to. Logs go to stderr when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            path: None,
        }
    }
}

fn default_level() -> String {
    "info".into()
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Directory that ingested raw data files are copied into.
    #[serde(default = "default_raw_data")]
    pub raw_data: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            database: default_database(),
            raw_data: default_raw_data(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("var/supramol.db")
}
fn default_raw_data() -> PathBuf {
    PathBuf::from("var/raw")
}

/// `[ms]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsSettings {
    /// Absolute m/z tolerance used when matching observed to predicted values.
    #[serde(default = "default_mz_tolerance")]
    pub mz_tolerance: f64,

    /// Lowest charge state for which m/z values are predicted.
    #[serde(default = "default_min_charge")]
    pub min_charge: i64,
}

impl Default for MsSettings {
    fn default() -> Self {
        Self {
            mz_tolerance: default_mz_tolerance(),
            min_charge: default_min_charge(),
        }
    }
}

fn default_mz_tolerance() -> f64 {
    0.2
}
fn default_min_charge() -> i64 {
    1
}

// ---------------------------------------------------------------------------
// Settings loading
// ---------------------------------------------------------------------------

/// Get the path to the user-level settings directory (`~/.supramol/`).
pub fn settings_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SupramolError::config("could not determine home directory"))?;
    Ok(home.join(SETTINGS_DIR_NAME))
}

/// Find the settings file for `dir`: `.env.toml`, then `settings.toml`, then
/// the user-level file. Returns `None` when none of them exist.
pub fn locate_settings(dir: &Path) -> Option<PathBuf> {
    SETTINGS_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .chain(
            settings_dir()
                .ok()
                .map(|d| d.join(SETTINGS_FILE_NAME)),
        )
        .find(|p| p.exists())
}

/// Load settings for the current working directory.
///
/// Returns the settings and the path they were read from.
pub fn load_settings() -> Result<(Settings, PathBuf)> {
    let cwd = std::env::current_dir().map_err(|e| SupramolError::io(".", e))?;
    let path = locate_settings(&cwd).ok_or_else(|| {
        SupramolError::config(format!(
            "settings must be in {} or {}",
            SETTINGS_CANDIDATES[0], SETTINGS_CANDIDATES[1]
        ))
    })?;
    let settings = load_settings_from(&path)?;
    Ok((settings, path))
}

/// Load settings from a specific file path.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| SupramolError::io(path, e))?;

    let settings: Settings = toml::from_str(&content).map_err(|e| {
        SupramolError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    settings.validate()?;
    tracing::debug!(?path, "loaded settings");
    Ok(settings)
}

/// Write a default `settings.toml` into `dir`, refusing to overwrite.
/// Returns the path to the created file.
pub fn init_settings(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| SupramolError::io(dir, e))?;

    let path = dir.join(SETTINGS_CANDIDATES[1]);
    if path.exists() {
        return Err(SupramolError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = toml::to_string_pretty(&Settings::default())
        .map_err(|e| SupramolError::config(e.to_string()))?;
    std::fs::write(&path, content).map_err(|e| SupramolError::io(&path, e))?;
    tracing::info!(?path, "created default settings file");

    Ok(path)
}

impl Settings {
    /// Reject values that would make analysis meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.ms.mz_tolerance.is_finite() || self.ms.mz_tolerance < 0.0 {
            return Err(SupramolError::config(format!(
                "ms.mz_tolerance must be a non-negative number, got {}",
                self.ms.mz_tolerance
            )));
        }
        if self.ms.min_charge < 1 {
            return Err(SupramolError::config(format!(
                "ms.min_charge must be at least 1, got {}",
                self.ms.min_charge
            )));
        }
        match self.logger.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "warning" | "error" => Ok(()),
            other => Err(SupramolError::config(format!(
                "unknown logger.level '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "supramol_cfg_{}_{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn default_settings_serialize() {
        let toml_str = toml::to_string_pretty(&Settings::default()).expect("serialize");
        assert!(toml_str.contains("[paths]"));
        assert!(toml_str.contains("mz_tolerance"));
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let toml_str = r#"
[logger]
level = "DEBUG"
path = "log/explorer.log"

[paths]
database = "/data/samosa.db"
"#;
        let settings: Settings = toml::from_str(toml_str).expect("parse");
        assert_eq!(settings.logger.path, Some(PathBuf::from("log/explorer.log")));
        assert_eq!(settings.paths.database, PathBuf::from("/data/samosa.db"));
        assert_eq!(settings.paths.raw_data, PathBuf::from("var/raw"));
        assert_eq!(settings.ms.min_charge, 1);
        settings.validate().expect("valid");
    }

    #[test]
    fn env_toml_takes_precedence() {
        let dir = temp_dir();
        std::fs::write(dir.join("settings.toml"), "[ms]\nmin_charge = 2\n").unwrap();
        std::fs::write(dir.join(".env.toml"), "[ms]\nmin_charge = 3\n").unwrap();

        let path = locate_settings(&dir).expect("found");
        assert!(path.ends_with(".env.toml"));
        let settings = load_settings_from(&path).expect("load");
        assert_eq!(settings.ms.min_charge, 3);
    }

    #[test]
    fn falls_back_to_settings_toml() {
        let dir = temp_dir();
        std::fs::write(dir.join("settings.toml"), "[ms]\nmz_tolerance = 0.5\n").unwrap();
        let path = locate_settings(&dir).expect("found");
        assert!(path.ends_with("settings.toml"));
    }

    #[test]
    fn invalid_tolerance_rejected() {
        let dir = temp_dir();
        let path = dir.join("settings.toml");
        std::fs::write(&path, "[ms]\nmz_tolerance = -1.0\n").unwrap();
        let err = load_settings_from(&path).unwrap_err();
        assert!(err.to_string().contains("mz_tolerance"));
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = temp_dir();
        let path = init_settings(&dir).expect("init");
        let parsed = load_settings_from(&path).expect("load written defaults");
        assert_eq!(parsed.logger.level, "info");
        assert!(init_settings(&dir).is_err());
    }
}
