//! Output Tracking
//!
//! One record per `wl_output` global. Records are keyed by the registry
//! global name, which is also the user data attached to the bound proxy, so
//! events for any output find their record without assuming a single display.
//!
//! Geometry, mode, done and scale events may arrive in any order relative to
//! other traffic; each one just updates the fields it carries.

use std::fmt;

use serde::Serialize;
use tracing::debug;
use wayland_client::protocol::wl_output::{self, WlOutput};
use wayland_client::{Proxy, WEnum};

use crate::shm::ShmBuffer;

/// Registry global name of a `wl_output`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OutputId(pub u32);

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wl_output@{}", self.0)
    }
}

/// What the compositor has told us about an output so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputGeometry {
    /// Current mode width in pixels
    pub width: i32,
    /// Current mode height in pixels
    pub height: i32,
    /// Current mode refresh in mHz
    pub refresh: i32,
    /// Position in the compositor's global space
    pub offset_x: i32,
    /// Position in the compositor's global space
    pub offset_y: i32,
    /// Manufacturer string from the geometry event
    pub make: String,
    /// Model string from the geometry event
    pub model: String,
    /// Integer scale factor (1 until told otherwise)
    pub scale: i32,
    /// Whether a done event has been seen since binding
    pub done: bool,
}

impl OutputGeometry {
    /// Geometry of a freshly bound output
    pub fn new() -> Self {
        Self {
            scale: 1,
            ..Self::default()
        }
    }

    /// Apply a geometry event: position and identification
    pub fn apply_geometry(&mut self, x: i32, y: i32, make: String, model: String) {
        self.offset_x = x;
        self.offset_y = y;
        self.make = make;
        self.model = model;
    }

    /// Apply a mode event
    ///
    /// Compositors advertise every mode an output supports; only the one
    /// flagged current changes the recorded size.
    ///
    /// Returns whether the event was retained.
    pub fn apply_mode(
        &mut self,
        flags: WEnum<wl_output::Mode>,
        width: i32,
        height: i32,
        refresh: i32,
    ) -> bool {
        let current = match flags {
            WEnum::Value(flags) => flags.contains(wl_output::Mode::Current),
            WEnum::Unknown(bits) => bits & wl_output::Mode::Current.bits() != 0,
        };
        if !current {
            return false;
        }

        self.width = width;
        self.height = height;
        self.refresh = refresh;
        true
    }

    /// Apply a scale event
    pub fn apply_scale(&mut self, factor: i32) {
        self.scale = factor;
    }

    /// Apply a done event
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// `make model`, or whichever half is known
    pub fn description(&self) -> String {
        match (self.make.is_empty(), self.model.is_empty()) {
            (false, false) => format!("{} {}", self.make, self.model),
            (false, true) => self.make.clone(),
            (true, false) => self.model.clone(),
            (true, true) => String::from("unknown"),
        }
    }
}

/// Snapshot of a tracked output handed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputInfo {
    /// Registry global name
    pub id: OutputId,
    /// Last known geometry
    #[serde(flatten)]
    pub geometry: OutputGeometry,
}

/// Tracked output with its protocol handle and shared-memory buffer
pub(crate) struct OutputRecord {
    pub(crate) id: OutputId,
    pub(crate) output: WlOutput,
    pub(crate) geometry: OutputGeometry,
    /// Lazily allocated on the first mode query, reused afterwards
    pub(crate) buffer: Option<ShmBuffer>,
}

impl OutputRecord {
    pub(crate) fn new(id: OutputId, output: WlOutput) -> Self {
        Self {
            id,
            output,
            geometry: OutputGeometry::new(),
            buffer: None,
        }
    }

    pub(crate) fn info(&self) -> OutputInfo {
        OutputInfo {
            id: self.id,
            geometry: self.geometry.clone(),
        }
    }

    /// Route a `wl_output` event into the geometry
    pub(crate) fn handle_event(&mut self, event: wl_output::Event) {
        match event {
            wl_output::Event::Geometry {
                x, y, make, model, ..
            } => {
                debug!("{}: geometry x={}, y={}, model={}", self.id, x, y, model);
                self.geometry.apply_geometry(x, y, make, model);
            }
            wl_output::Event::Mode {
                flags,
                width,
                height,
                refresh,
            } => {
                if self.geometry.apply_mode(flags, width, height, refresh) {
                    debug!("{}: current mode {}x{}", self.id, width, height);
                }
            }
            wl_output::Event::Done => {
                debug!("{}: done", self.id);
                self.geometry.mark_done();
            }
            wl_output::Event::Scale { factor } => {
                debug!("{}: scale {}", self.id, factor);
                self.geometry.apply_scale(factor);
            }
            _ => {}
        }
    }
}

impl Drop for OutputRecord {
    fn drop(&mut self) {
        if self.output.version() >= 3 {
            self.output.release();
        }
    }
}
