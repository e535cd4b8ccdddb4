//! Configuration loading from TOML
//!
//! # Configuration File Format
//!
//! The monitor front-end optionally reads a TOML file with the following
//! structure (command-line flags override it):
//!
//! ```toml
//! [device]
//! ip = "192.168.10.240"
//! port = 9910
//!
//! [client]
//! retry_delay_secs = 3
//! max_connect_attempts = 10
//! read_timeout_ms = 1000
//! debug_datagrams = false
//! ```
//!
//! Applications embedding the library construct [`ClientOptions`] directly;
//! every field has a default, so `ClientOptions::default()` is a working
//! configuration.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default device control port.
pub const DEFAULT_PORT: u16 = 9910;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_retry_delay_secs() -> u64 {
    3
}

fn default_read_timeout_ms() -> u64 {
    1000
}

/// Device address configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Device IP address.
    ///
    /// **Required**: Yes (or supplied via `--ip`)
    pub ip: String,

    /// Device UDP control port.
    ///
    /// **Default**: 9910
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Tunables for the client's transport behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientOptions {
    /// Delay between connection attempts when opening the endpoint fails.
    ///
    /// **Units**: Seconds
    /// **Default**: 3
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Maximum number of open attempts before giving up.
    ///
    /// **Default**: None (retry indefinitely)
    #[serde(default)]
    pub max_connect_attempts: Option<u32>,

    /// Receive poll timeout. A close request preempts a blocked read
    /// within this interval.
    ///
    /// **Units**: Milliseconds
    /// **Valid range**: 10-1000
    /// **Default**: 1000
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Dump the raw bytes of every datagram, both directions, at debug
    /// log level.
    ///
    /// **Default**: false
    #[serde(default)]
    pub debug_datagrams: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            max_connect_attempts: None,
            read_timeout_ms: default_read_timeout_ms(),
            debug_datagrams: false,
        }
    }
}

/// Root configuration for the monitor front-end.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    #[serde(default)]
    pub client: ClientOptions,
}

/// Minimum receive poll timeout.
const MIN_READ_TIMEOUT_MS: u64 = 10;
/// Maximum receive poll timeout; the close path relies on the reader
/// waking up at least once per second.
const MAX_READ_TIMEOUT_MS: u64 = 1000;

impl ClientOptions {
    /// Validate option ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_READ_TIMEOUT_MS..=MAX_READ_TIMEOUT_MS).contains(&self.read_timeout_ms) {
            return Err(Error::Config(format!(
                "read_timeout_ms must be between {}ms and {}ms (got {}ms). \
                Larger values delay close requests past the guaranteed bound.",
                MIN_READ_TIMEOUT_MS, MAX_READ_TIMEOUT_MS, self.read_timeout_ms
            )));
        }
        if self.retry_delay_secs == 0 {
            return Err(Error::Config(
                "retry_delay_secs must be at least 1 to avoid hammering the network".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = basic_toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.client.validate()?;
        Ok(config)
    }
}
