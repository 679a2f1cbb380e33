//! # weston-displayconfig
//!
//! Client for the `weston_display_coinfig` compositor extension: query the
//! HDMI modes an output supports and switch to one of them.
//!
//! # Architecture
//!
//! ```text
//! C host / CLI
//!   └─> DisplayConfigClient (mode cache, mode matching)
//!       └─> ConfigBackend
//!           └─> WaylandBackend
//!               ├─> weston_display_coinfig (get_resource2, set_mode, done)
//!               ├─> wl_shm buffer per output (mode list payload)
//!               └─> wl_output tracking (geometry, hot-plug)
//! ```
//!
//! # Data Flow
//!
//! **Query:** `get_resource2(output, buffer)` → compositor fills buffer →
//! `done` → [`HdmiInfos`] decoded from shared memory → cache
//!
//! **Select:** cached [`HdmiInfo`] matching the requested tuple →
//! `set_mode` per output → `done`
//!
//! # Example
//!
//! ```no_run
//! use weston_displayconfig::{Config, DisplayConfigClient, ModeRequest};
//!
//! let mut client = DisplayConfigClient::connect(&Config::default())?;
//! for mode in client.query_modes()?.modes() {
//!     println!("{}", mode);
//! }
//! client.set_mode(&"1920x1080@60000".parse::<ModeRequest>()?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Compositor backend abstraction
pub mod backend;

/// Display configuration client
pub mod client;

/// Configuration
pub mod config;

/// Error types
pub mod error;

/// C ABI entry points
pub mod ffi;

/// Logging setup
pub mod logging;

/// Output tracking
pub mod output;

/// Generated protocol bindings
pub mod protocol;

/// Request/response correlation
pub mod request;

/// Shared-memory buffers
pub mod shm;

/// Wayland backend
pub mod wayland;

/// Mode list wire format
pub mod wire;

pub use backend::ConfigBackend;
pub use client::DisplayConfigClient;
pub use config::Config;
pub use error::{DisplayConfigError, Result};
pub use output::{OutputGeometry, OutputId, OutputInfo};
pub use request::RequestId;
pub use wayland::WaylandBackend;
pub use wire::{HdmiInfo, HdmiInfos, ModeList, ModeRequest, MAX_HDMI_MODES};
