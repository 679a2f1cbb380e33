//! Display Configuration Error Types
//!
//! Every fallible operation in the crate returns [`DisplayConfigError`].
//! The C ABI flattens these into negative errno-style return codes via
//! [`DisplayConfigError::code`].

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use wayland_client::backend::WaylandError;
use wayland_client::globals::GlobalError;
use wayland_client::{ConnectError, DispatchError};

/// Result type for display configuration operations
pub type Result<T> = std::result::Result<T, DisplayConfigError>;

/// Display configuration error types
#[derive(Error, Debug)]
pub enum DisplayConfigError {
    /// Could not reach the compositor through the environment
    #[error("Failed to connect to Wayland display: {0}")]
    Connect(#[from] ConnectError),

    /// Could not open an explicitly configured socket
    #[error("Failed to connect to Wayland socket {path:?}: {source}")]
    Socket {
        /// Socket path that was tried
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Initial registry roundtrip failed
    #[error("Failed to initialize Wayland registry: {0}")]
    Registry(#[from] GlobalError),

    /// A required global is not advertised by the compositor
    #[error("Compositor does not advertise {0}")]
    MissingGlobal(&'static str),

    /// Event dispatch failed (includes protocol errors raised by the compositor)
    #[error("Wayland dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// Reading from or writing to the Wayland socket failed
    #[error("Wayland connection error: {0}")]
    Backend(#[from] WaylandError),

    /// Anonymous shared memory could not be created or mapped
    #[error("Failed to allocate {size} bytes of shared memory: {source}")]
    Shm {
        /// Requested segment size
        size: usize,
        /// Underlying error
        source: io::Error,
    },

    /// The configured buffer cannot hold one mode list
    #[error("Shared memory buffer of {actual} bytes is smaller than the {required} byte mode list")]
    BufferTooSmall {
        /// Bytes needed for a mode list
        required: usize,
        /// Bytes available
        actual: usize,
    },

    /// No output is currently tracked
    #[error("No outputs are tracked")]
    NoOutputs,

    /// The output disappeared (or never existed)
    #[error("Output {0} is not tracked")]
    UnknownOutput(u32),

    /// No entry of the cached mode list matches the requested tuple
    #[error("No cached mode matches {width}x{height}@{refresh} (interlaced={interlaced})")]
    ModeNotFound {
        /// Requested horizontal resolution
        width: i32,
        /// Requested vertical resolution
        height: i32,
        /// Requested refresh rate
        refresh: i32,
        /// Requested interlace flag
        interlaced: i32,
    },

    /// The compositor did not answer before the deadline
    #[error("Request {id} was not answered within {timeout:?}")]
    Timeout {
        /// Request identifier
        id: u64,
        /// Deadline that expired
        timeout: Duration,
    },

    /// A mode payload was shorter than the fixed wire size
    #[error("Mode payload truncated: got {actual} bytes, need {required}")]
    Truncated {
        /// Bytes needed
        required: usize,
        /// Bytes available
        actual: usize,
    },

    /// A mode list has more entries than the wire format can carry
    #[error("Mode list has {0} entries, wire format holds at most 100")]
    ModeListOverflow(usize),

    /// An operation was called before `init_display_config`
    #[error("Display configuration is not initialized")]
    NotInitialized,

    /// `init_display_config` was called twice without `deInit_display_config`
    #[error("Display configuration is already initialized")]
    AlreadyInitialized,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DisplayConfigError {
    /// Negative errno-style code returned across the C ABI
    pub fn code(&self) -> i32 {
        let errno = match self {
            Self::Connect(_) | Self::Socket { .. } => libc::ECONNREFUSED,
            Self::Registry(_) | Self::Dispatch(_) => libc::EPROTO,
            Self::MissingGlobal(_) => libc::ENOTSUP,
            Self::Backend(_) => libc::EIO,
            Self::Shm { .. } => libc::ENOMEM,
            Self::BufferTooSmall { .. } | Self::Config(_) => libc::EINVAL,
            Self::NoOutputs | Self::UnknownOutput(_) => libc::ENODEV,
            Self::ModeNotFound { .. } => libc::ENOENT,
            Self::Timeout { .. } => libc::ETIMEDOUT,
            Self::Truncated { .. } | Self::ModeListOverflow(_) => libc::EBADMSG,
            Self::NotInitialized => libc::ENXIO,
            Self::AlreadyInitialized => libc::EALREADY,
        };
        -errno
    }
}
