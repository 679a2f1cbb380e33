//! Configuration type definitions

use serde::{Deserialize, Serialize};

/// Compositor connection configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Socket name (relative to `$XDG_RUNTIME_DIR`) or absolute path.
    /// `None` uses `WAYLAND_SOCKET` / `WAYLAND_DISPLAY` from the environment.
    pub display: Option<String>,
}

/// Request handling configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// How long to wait for the compositor to answer a request, in
    /// milliseconds (0 = wait indefinitely)
    pub timeout_ms: u64,
}

/// Shared-memory buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Buffer width in XRGB8888 pixels
    pub width: i32,

    /// Buffer height in XRGB8888 pixels
    pub height: i32,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Log format ("pretty", "compact", "json")
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}
