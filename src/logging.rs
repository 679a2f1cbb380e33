//! Logging setup
//!
//! Shared by the CLI and the C entry points. Output goes to stderr so the
//! CLI's stdout stays machine readable.

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static INSTALL: Mutex<()> = parking_lot::const_mutex(());

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `level`. Calling this again after a
/// subscriber is installed (by us or by the host application) is a no-op.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    if !matches!(format, "json" | "compact" | "pretty") {
        return Err(anyhow!("Unknown log format: {}", format));
    }

    let _guard = INSTALL.lock();
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "weston_displayconfig={level},warn",
            level = level
        ))
    });

    let result = match format {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        "compact" => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    match result {
        Ok(()) => Ok(()),
        // Installed by the host between the check and try_init
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(e) => Err(e).context("Failed to install log subscriber"),
    }
}

/// Map a `-v` count onto a level name
pub fn verbosity_level(verbose: u8, default: &str) -> &str {
    match verbose {
        0 => default,
        1 => "debug",
        _ => "trace",
    }
}
