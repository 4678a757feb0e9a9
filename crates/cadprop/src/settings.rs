use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CadpropError;

/// Application configuration persisted as a JSON file next to the tool.
///
/// Unknown keys are ignored and missing keys fall back to defaults, so old
/// settings files keep loading across releases.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub telemetry: TelemetrySettings,
    /// Directory for the append-mode log files; `None` keeps logs on stderr.
    pub log_directory: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    /// Base URL of the remote key-value store the heartbeat PUTs into.
    pub endpoint: String,
    pub interval_secs: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            interval_secs: 300,
        }
    }
}

impl Settings {
    /// Loads settings, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, CadpropError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&raw)
            .map_err(|err| CadpropError::from(err).context(path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), CadpropError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.telemetry.enabled);
        assert_eq!(settings.telemetry.interval_secs, 300);
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cadprop.settings.json");

        let mut settings = Settings::default();
        settings.telemetry.enabled = true;
        settings.telemetry.endpoint = "https://kv.example.com/fleet".to_string();
        settings.telemetry.interval_secs = 60;
        settings.log_directory = Some(PathBuf::from("Logs"));

        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn tolerates_partial_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{"telemetry":{"enabled":true}}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert!(settings.telemetry.enabled);
        assert_eq!(settings.telemetry.interval_secs, 300);
        assert_eq!(settings.log_directory, None);
    }
}
