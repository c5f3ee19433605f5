//! Service configuration
//!
//! Loaded once at startup from a TOML file and then passed around explicitly;
//! there is no global configuration state. A missing file is not an error, the
//! bridge falls back to defaults that match a typical flight stick. CLI flags
//! are applied on top of whatever the file says.
//!
//! ```toml
//! [link]
//! baud = 57600
//! handshake_timeout_ms = 10000
//!
//! [supervisor]
//! mode = "manual-control"
//! tick_interval_ms = 100
//!
//! [axes.pitch]
//! source = "ABS_Y"
//! invert = true
//! curve = "bidirectional"
//! initial = 128
//!
//! [buttons]
//! fallback_index = 0
//! codes = { BTN_TRIGGER = 0, BTN_THUMB = 1 }
//!
//! [override]
//! axis = "pitch"
//! rc_channel = 1
//! ```

use crate::controller::channel_state::{ButtonIndexing, BUTTON_COUNT};
use crate::mapping::{AxisMap, MappingError, OutputMode, OverrideConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const APP_NAME: &str = "hid2mav";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    pub baud: u32,
    pub handshake_timeout_ms: u64,
    pub send_timeout_ms: u64,
    /// Our own system id on the link (255 = ground station)
    pub source_system: u8,
    pub source_component: u8,
    /// 0 disables the GCS heartbeat
    pub heartbeat_interval_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud: 57600,
            handshake_timeout_ms: 10_000,
            send_timeout_ms: 250,
            source_system: 255,
            source_component: 190,
            heartbeat_interval_ms: 1000,
        }
    }
}

impl LinkConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    pub mode: OutputMode,
    /// Falls back to the mode's own cadence when unset
    pub tick_interval_ms: Option<u64>,
    pub poll_backoff_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::default(),
            tick_interval_ms: None,
            poll_backoff_ms: 1000,
        }
    }
}

impl SupervisorConfig {
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.mode.default_tick_interval())
    }

    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub supervisor: SupervisorConfig,
    pub axes: AxisMap,
    pub buttons: ButtonIndexing,
    #[serde(rename = "override")]
    pub override_output: OverrideConfig,
}

/// Values given on the command line, applied over the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub baud: Option<u32>,
    pub mode: Option<OutputMode>,
    pub tick_interval_ms: Option<u64>,
}

impl AppConfig {
    /// `~/.config/hid2mav/config.toml` on Linux
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    }

    /// Reads the file if present, otherwise returns defaults
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            warn!(
                "Config file {} does not exist, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn apply(&mut self, overrides: &CliOverrides) {
        if let Some(baud) = overrides.baud {
            self.link.baud = baud;
        }
        if let Some(mode) = overrides.mode {
            self.supervisor.mode = mode;
        }
        if let Some(tick) = overrides.tick_interval_ms {
            self.supervisor.tick_interval_ms = Some(tick);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supervisor.tick_interval().is_zero() {
            return Err(ConfigError::Invalid(
                "tick interval must be greater than zero".to_string(),
            ));
        }
        if self.link.send_timeout_ms == 0 || self.link.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "link timeouts must be greater than zero".to_string(),
            ));
        }
        if let Some((code, index)) = self
            .buttons
            .codes
            .iter()
            .find(|(_, index)| **index >= BUTTON_COUNT)
        {
            return Err(ConfigError::Invalid(format!(
                "button {} maps to index {}, only 0-{} are transmitted",
                code,
                index,
                BUTTON_COUNT - 1
            )));
        }
        if self.buttons.fallback_index >= BUTTON_COUNT {
            return Err(ConfigError::Invalid(
                "button fallback index is out of range".to_string(),
            ));
        }

        self.axes.validate()?;
        if self.supervisor.mode == OutputMode::Override {
            self.override_output.validate()?;
            if self.axes.get(self.override_output.axis).is_none() {
                warn!(
                    "Override axis {} has no mapping and will stay centred",
                    self.override_output.axis
                );
            }
        }
        Ok(())
    }
}
