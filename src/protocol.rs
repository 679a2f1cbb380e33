//! `weston_display_coinfig` protocol bindings
//!
//! Generated from `protocols/weston-display-config.xml`. The interface name
//! (including its spelling) and request order must match the compositor.

#![allow(missing_docs, unreachable_pub, clippy::all, clippy::wildcard_imports)]

pub use wayland_client;
pub use wayland_client::protocol::{wl_buffer, wl_output};

pub mod __interfaces {
    use wayland_client::backend as wayland_backend;
    use wayland_client::protocol::__interfaces::*;
    wayland_scanner::generate_interfaces!("protocols/weston-display-config.xml");
}
use self::__interfaces::*;

wayland_scanner::generate_client_code!("protocols/weston-display-config.xml");
