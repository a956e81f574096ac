//! Application configuration, stored as RON

use crate::midi::library::DEFAULT_DEMO;
use crate::tone::encoder::{
    CommandEncoder, CommandEncoding, DEFAULT_BROADCAST_ACTION, DEFAULT_BROADCAST_EXTRA,
    DEFAULT_MODE_TOKEN,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub protocol: ProtocolConfig,
    pub playback: PlaybackConfig,
    pub library: LibraryConfig,
}

/// Device discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// `adb` executable, looked up in PATH when relative
    pub adb_path: PathBuf,
    /// Only accept this device serial
    pub serial: Option<String>,
    /// Only accept devices whose `model:` matches
    pub model: Option<String>,
    /// Attempts made by `--wait` before giving up
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            serial: None,
            model: None,
            retry_attempts: 10,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
        }
    }
}

/// Device-side command interpreter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// First line of every line-protocol script
    pub mode_token: String,
    /// Interactive tone app driven by the line protocol
    pub tone_app_path: String,
    /// Output of the tone app once it accepts input
    pub ready_marker: String,
    pub ready_timeout_ms: u64,
    pub broadcast_action: String,
    pub broadcast_extra: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            mode_token: DEFAULT_MODE_TOKEN.to_string(),
            tone_app_path: "/vendor/bin/hw/vendor.hammerhead.testapp.sh".to_string(),
            ready_marker: "^C to exit.".to_string(),
            ready_timeout_ms: 10_000,
            broadcast_action: DEFAULT_BROADCAST_ACTION.to_string(),
            broadcast_extra: DEFAULT_BROADCAST_EXTRA.to_string(),
        }
    }
}

impl ProtocolConfig {
    pub fn encoder(&self) -> CommandEncoder {
        CommandEncoder::new(
            self.mode_token.clone(),
            self.broadcast_action.clone(),
            self.broadcast_extra.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub encoding: CommandEncoding,
    /// Interval at which playback progress is published
    pub progress_tick_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            encoding: CommandEncoding::BroadcastIntent,
            progress_tick_ms: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub demo_dir: PathBuf,
    pub default_demo: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let demo_dir = dirs::data_dir()
            .map(|dir| dir.join("adbeeper").join("midi"))
            .unwrap_or_else(|| PathBuf::from("midi"));

        Self {
            demo_dir,
            default_demo: DEFAULT_DEMO.to_string(),
        }
    }
}

impl AppConfig {
    /// `<config dir>/adbeeper/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("adbeeper").join("config.ron"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = ron::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path if given, else the default path when it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.adb_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("device.adb_path is empty".to_string()));
        }
        if self.protocol.mode_token.trim().is_empty() {
            return Err(ConfigError::Invalid("protocol.mode_token is empty".to_string()));
        }
        if self.protocol.ready_marker.is_empty() {
            return Err(ConfigError::Invalid("protocol.ready_marker is empty".to_string()));
        }
        if self.protocol.broadcast_action.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "protocol.broadcast_action is empty".to_string(),
            ));
        }
        if self.playback.progress_tick_ms == 0 {
            return Err(ConfigError::Invalid(
                "playback.progress_tick_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
