//! C ABI
//!
//! Plain C entry points over one process-wide [`DisplayConfigClient`].
//! Every function returns `0` on success or a negative errno-style code
//! from [`DisplayConfigError::code`]. See `include/weston_displayconfig.h`.

#![allow(unsafe_code)]

use std::os::raw::c_int;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::client::DisplayConfigClient;
use crate::config::Config;
use crate::error::{DisplayConfigError, Result};
use crate::logging::init_logging;
use crate::wire::{HdmiInfos, ModeRequest};

static CLIENT: Mutex<Option<DisplayConfigClient>> = parking_lot::const_mutex(None);

fn with_client<T>(f: impl FnOnce(&mut DisplayConfigClient) -> Result<T>) -> Result<T> {
    let mut slot = CLIENT.lock();
    let client = slot.as_mut().ok_or(DisplayConfigError::NotInitialized)?;
    f(client)
}

fn status(result: Result<()>, operation: &str) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{} failed: {}", operation, e);
            e.code()
        }
    }
}

/// Connect to the compositor and bind the display configuration extension
///
/// Reads the configuration named by `WESTON_DISPLAYCONFIG_CONFIG` and
/// installs logging unless the host already did.
#[no_mangle]
pub extern "C" fn init_display_config() -> c_int {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Logging isn't configured yet
            eprintln!("weston-displayconfig: invalid configuration: {:#}", e);
            return DisplayConfigError::Config(format!("{:#}", e)).code();
        }
    };

    if let Err(e) = init_logging(&config.logging.level, &config.logging.format) {
        eprintln!("weston-displayconfig: logging disabled: {:#}", e);
    }

    let mut slot = CLIENT.lock();
    if slot.is_some() {
        return status(
            Err(DisplayConfigError::AlreadyInitialized),
            "init_display_config",
        );
    }

    match DisplayConfigClient::connect(&config) {
        Ok(client) => {
            info!(
                "Display configuration initialized, {} output(s)",
                client.outputs().len()
            );
            *slot = Some(client);
            0
        }
        Err(e) => status(Err(e), "init_display_config"),
    }
}

/// Query every output's HDMI modes and copy the cached list into `dest`
///
/// `dest` may be null, in which case only the internal cache is refreshed.
///
/// # Safety
///
/// A non-null `dest` must point to writable memory large enough for one
/// `HdmiInfos_t`.
#[no_mangle]
pub unsafe extern "C" fn get_display_hdmi_info(dest: *mut HdmiInfos) -> c_int {
    let result = with_client(|client| {
        let infos = *client.query_modes()?;
        if !dest.is_null() {
            // SAFETY: caller guarantees `dest` is valid for one HdmiInfos
            unsafe { dest.write(infos) };
        }
        debug!("Returned {} HDMI modes", infos.valid_len());
        Ok(())
    });
    status(result, "get_display_hdmi_info")
}

/// Switch every output to the cached mode matching the given tuple
///
/// `refresh` is in mHz. The last argument is accepted for ABI compatibility
/// and ignored.
#[no_mangle]
pub extern "C" fn set_hdmi_mode(
    width: c_int,
    height: c_int,
    refresh: c_int,
    interlaced: c_int,
    _reserved: c_int,
) -> c_int {
    let request = ModeRequest::new(width, height, refresh, interlaced);
    let result = with_client(|client| client.set_mode(&request).map(|_| ()));
    status(result, "set_hdmi_mode")
}

/// Release the client; a later `init_display_config` starts afresh
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn deInit_display_config() -> c_int {
    match CLIENT.lock().take() {
        Some(client) => client.close(),
        None => debug!("deInit_display_config called while not initialized"),
    }
    0
}
