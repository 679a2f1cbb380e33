//! Request/Response Bridge
//!
//! `weston_display_coinfig` answers every `get_resource2` and `set_mode`
//! request with a single argument-less `done` event, in request order. The
//! tracker gives each request a monotonically increasing [`RequestId`] and
//! completes ids strictly FIFO as `done` events arrive, so several requests
//! may be outstanding at once and each caller waits for its own answer.
//!
//! [`wait_for`] turns that into a blocking call by pumping the event queue
//! until the id completes or an optional deadline passes.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::error::{DisplayConfigError, Result};

/// Identifier of one outstanding compositor request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Raw sequence number
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a request asked the compositor to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `get_resource2`: write the mode list into a buffer
    QueryModes,
    /// `set_mode`: switch an output's mode
    SetMode,
}

/// FIFO correlation of requests and `done` events
#[derive(Debug, Default)]
pub struct RequestTracker {
    next_id: u64,
    outstanding: VecDeque<(RequestId, RequestKind)>,
}

impl RequestTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request that has just been sent
    pub fn issue(&mut self, kind: RequestKind) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.outstanding.push_back((id, kind));
        trace!("Issued request {} ({:?})", id, kind);
        id
    }

    /// Handle one `done` event
    ///
    /// A `done` with nothing outstanding is dropped and never credited to a
    /// later request.
    pub fn complete_next(&mut self) -> Option<(RequestId, RequestKind)> {
        match self.outstanding.pop_front() {
            Some((id, kind)) => {
                debug!("Request {} ({:?}) acknowledged", id, kind);
                Some((id, kind))
            }
            None => {
                warn!("Ignoring done event with no outstanding request");
                None
            }
        }
    }

    /// Whether `id` has been acknowledged
    pub fn is_complete(&self, id: RequestId) -> bool {
        match self.outstanding.front() {
            Some((oldest, _)) => id < *oldest,
            None => id.0 < self.next_id,
        }
    }

    /// Number of requests still waiting for `done`
    pub fn pending(&self) -> usize {
        self.outstanding.len()
    }
}

/// Something that can move compositor events into a [`RequestTracker`]
pub trait EventPump {
    /// Tracker updated by dispatched events
    fn tracker(&self) -> &RequestTracker;

    /// Flush requests and dispatch at least one batch of events
    ///
    /// With `timeout` set, return after at most that long even if nothing
    /// arrived.
    fn pump(&mut self, timeout: Option<Duration>) -> Result<()>;
}

/// Block until `id` is acknowledged
///
/// With no timeout this waits for as long as the compositor takes.
pub fn wait_for<P>(pump: &mut P, id: RequestId, timeout: Option<Duration>) -> Result<()>
where
    P: EventPump + ?Sized,
{
    let deadline = timeout.map(|timeout| (Instant::now() + timeout, timeout));

    while !pump.tracker().is_complete(id) {
        let remaining = match deadline {
            Some((deadline, timeout)) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(DisplayConfigError::Timeout {
                        id: id.get(),
                        timeout,
                    });
                }
                Some(deadline - now)
            }
            None => None,
        };

        pump.pump(remaining)?;
    }

    Ok(())
}
