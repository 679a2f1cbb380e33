//! Compositor Backend Abstraction
//!
//! [`ConfigBackend`] is everything [`DisplayConfigClient`](crate::DisplayConfigClient)
//! needs from the compositor side. The production implementation is
//! [`WaylandBackend`](crate::wayland::WaylandBackend); tests drive the same
//! client logic with an in-memory fake.

use crate::error::Result;
use crate::output::{OutputId, OutputInfo};
use crate::request::RequestId;
use crate::wire::{HdmiInfo, HdmiInfos};

/// Compositor operations used by the mode query and mode selection logic
pub trait ConfigBackend {
    /// Currently tracked outputs, in the order the compositor announced them
    fn outputs(&self) -> Vec<OutputInfo>;

    /// Ask the compositor to write `output`'s mode list into its buffer
    fn request_modes(&mut self, output: OutputId) -> Result<RequestId>;

    /// Ask the compositor to switch `output` to `mode`
    fn request_set_mode(&mut self, output: OutputId, mode: &HdmiInfo) -> Result<RequestId>;

    /// Block until `request` (and everything issued before it) is acknowledged
    fn wait(&mut self, request: RequestId) -> Result<()>;

    /// Decode the mode list the compositor last wrote for `output`
    fn read_modes(&self, output: OutputId) -> Result<HdmiInfos>;
}
