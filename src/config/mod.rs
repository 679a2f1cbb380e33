//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - Environment variables
//! - CLI arguments
//!
//! ```toml
//! [connection]
//! display = "wayland-1"
//!
//! [request]
//! timeout_ms = 2000
//!
//! [buffer]
//! width = 100
//! height = 100
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::shm::buffer_layout;
use crate::wire::HDMI_INFOS_SIZE;

pub mod types;

pub use types::{BufferConfig, ConnectionConfig, LoggingConfig, RequestConfig};

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "WESTON_DISPLAYCONFIG_CONFIG";

/// Environment variable overriding `request.timeout_ms`
pub const TIMEOUT_ENV: &str = "WESTON_DISPLAYCONFIG_TIMEOUT_MS";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Compositor connection
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Request handling
    #[serde(default)]
    pub request: RequestConfig,
    /// Shared-memory buffer
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `WESTON_DISPLAYCONFIG_CONFIG` (defaults when
    /// unset), then apply `WESTON_DISPLAYCONFIG_TIMEOUT_MS`
    pub fn from_env() -> Result<Self> {
        let config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        let timeout = match std::env::var(TIMEOUT_ENV) {
            Ok(value) => Some(
                value
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("Invalid {}: {}", TIMEOUT_ENV, value))?,
            ),
            Err(_) => None,
        };

        Ok(config.with_overrides(None, timeout))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let (_, size) = buffer_layout(self.buffer.width, self.buffer.height)
            .context("Invalid buffer dimensions")?;
        if (size as usize) < HDMI_INFOS_SIZE {
            anyhow::bail!(
                "Buffer of {}x{} pixels ({} bytes) cannot hold a {} byte mode list",
                self.buffer.width,
                self.buffer.height,
                size,
                HDMI_INFOS_SIZE
            );
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            _ => anyhow::bail!("Invalid log format: {}", self.logging.format),
        }

        if let Some(display) = &self.connection.display {
            if display.is_empty() {
                anyhow::bail!("connection.display must not be empty");
            }
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, display: Option<String>, timeout_ms: Option<u64>) -> Self {
        if let Some(display) = display {
            self.connection.display = Some(display);
        }
        if let Some(timeout_ms) = timeout_ms {
            self.request.timeout_ms = timeout_ms;
        }
        self
    }

    /// Deadline for a single request, `None` to wait indefinitely
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
