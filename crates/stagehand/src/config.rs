//! Channel configuration.
//!
//! Loaded from a TOML file. Every field has a default, so a config file
//! only needs the keys it wants to change:
//!
//! ```toml
//! bind_addr = "0.0.0.0:54001"
//! send_queue_capacity = 20
//!
//! [stage]
//! default_max_players = 4
//!
//! [semaphore]
//! well_known_prefix = "hs_l0u3B5"
//!
//! [logging]
//! level = "debug"
//! packets = { log_inbound = true, max_hexdump_len = 64 }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use stagehand_protocol::TextEncoding;
use stagehand_session::{PacketTrace, SessionConfig};
use stagehand_stage::{SemaphoreConfig, StageConfig};

/// Default for `bind_addr`.
fn default_bind_addr() -> String {
    "0.0.0.0:54001".to_string()
}

/// Default for `send_queue_capacity`.
fn default_send_queue_capacity() -> usize {
    SessionConfig::default().send_queue_capacity
}

/// Default for `logging.level`.
fn default_log_level() -> String {
    "info".to_string()
}

/// Errors that can occur while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML, or a value has the wrong type.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// ChannelConfig
// ---------------------------------------------------------------------------

/// Everything one channel server needs to start.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Address the listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bound of each session's outbound queue.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,

    /// How text fields are encoded for clients.
    #[serde(default)]
    pub text_encoding: TextEncoding,

    #[serde(default)]
    pub stage: StageConfig,

    #[serde(default)]
    pub semaphore: SemaphoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            send_queue_capacity: default_send_queue_capacity(),
            text_encoding: TextEncoding::default(),
            stage: StageConfig::default(),
            semaphore: SemaphoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Reads and parses a TOML config file.
    ///
    /// A missing file is an error. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The per-session settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            send_queue_capacity: self.send_queue_capacity,
            trace: self.logging.packets,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingConfig
// ---------------------------------------------------------------------------

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, such as `info` or `stagehand=debug`.
    /// `RUST_LOG` overrides it when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to color the output.
    #[serde(default)]
    pub ansi: bool,

    /// Per-packet trace lines.
    #[serde(default)]
    pub packets: PacketTrace,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: false,
            packets: PacketTrace::default(),
        }
    }
}
