//! Configuration for the behavioral authentication agent.

use crate::collector::capture::DEFAULT_QUEUE_CAPACITY;
use crate::collector::types::Modality;
use crate::core::device::DeviceOverrides;
use crate::core::features::OutlierBounds;
use crate::verdict::VerdictConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Period of the authentication cycle
    #[serde(with = "duration_ms", rename = "interval_ms")]
    pub interval: Duration,

    /// Verdict service connection settings
    pub verdict: VerdictConfig,

    /// Plausible dwell/flight ranges; timings outside are discarded
    pub outlier_bounds: OutlierBounds,

    /// Which input modalities to capture
    pub sources: CaptureSources,

    /// Capacity of the input queue between sources and capture
    pub queue_capacity: usize,

    /// How often queued input is drained into the open session
    #[serde(with = "duration_ms", rename = "drain_interval_ms")]
    pub drain_interval: Duration,

    /// Required length of a step-up verification code
    pub step_up_code_length: usize,

    /// Values reported in device info instead of detected ones
    pub device: DeviceOverrides,

    /// Port of the local ingest server
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            verdict: VerdictConfig::default(),
            outlier_bounds: OutlierBounds::default(),
            sources: CaptureSources::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_interval: Duration::from_millis(50),
            step_up_code_length: 6,
            device: DeviceOverrides::default(),
            server_port: 8765,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file, falling back to defaults if it does
    /// not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("behavioral-auth-agent")
            .join("config.json")
    }
}

/// Configuration for which input modalities to capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSources {
    pub keyboard: bool,
    pub motion: bool,
    pub pointer: bool,
}

impl Default for CaptureSources {
    fn default() -> Self {
        Self {
            keyboard: true,
            motion: true,
            pointer: true,
        }
    }
}

impl CaptureSources {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let enabled = |name: &str| sources.iter().any(|s| s == name || s == "all");

        Self {
            keyboard: enabled("keyboard"),
            motion: enabled("motion"),
            pointer: enabled("pointer"),
        }
    }

    /// Check if at least one source is enabled.
    pub fn any_enabled(&self) -> bool {
        self.keyboard || self.motion || self.pointer
    }

    pub fn accepts(&self, modality: Modality) -> bool {
        match modality {
            Modality::Keyboard => self.keyboard,
            Modality::Motion => self.motion,
            Modality::Pointer => self.pointer,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_config_parsing() {
        let config = CaptureSources::from_csv("keyboard,pointer");
        assert!(config.keyboard);
        assert!(config.pointer);
        assert!(!config.motion);

        let config = CaptureSources::from_csv(" Motion ");
        assert!(config.motion);
        assert!(!config.keyboard);

        let config = CaptureSources::from_csv("all");
        assert_eq!(config, CaptureSources::default());

        assert!(!CaptureSources::from_csv("gps").any_enabled());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.step_up_code_length, 6);
        assert_eq!(config.outlier_bounds.dwell.max_ms, 1000.0);
        assert_eq!(config.outlier_bounds.flight.max_ms, 2000.0);
        assert!(config.sources.any_enabled());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"interval_ms": 5000, "sources": {"keyboard": true, "motion": false, "pointer": false}}"#)
                .unwrap();
        assert_eq!(config.interval, Duration::from_millis(5000));
        assert!(!config.sources.motion);
        assert_eq!(config.drain_interval, Duration::from_millis(50));
        assert_eq!(config.verdict, VerdictConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.interval = Duration::from_millis(12_500);
        config.verdict.base_url = "http://verdict.local:9000".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.interval, Duration::from_millis(12_500));
        assert_eq!(loaded.verdict.base_url, "http://verdict.local:9000");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.server_port, Config::default().server_port);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
