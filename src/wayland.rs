//! Wayland Backend
//!
//! Talks to a compositor exposing `weston_display_coinfig`.
//!
//! # Architecture
//!
//! ```text
//! WaylandBackend
//!   ├─> Wayland Connection (WAYLAND_DISPLAY, WAYLAND_SOCKET or configured socket)
//!   ├─> Protocol Binding (registry enumeration)
//!   │   ├─> weston_display_coinfig (required)
//!   │   ├─> wl_shm (required)
//!   │   └─> wl_output (every output, including hot-plugged ones)
//!   └─> DisplayConfigState (dispatch target)
//!       ├─> OutputRecord per output (geometry + shm buffer)
//!       └─> RequestTracker (done event correlation)
//! ```
//!
//! Setup performs two roundtrips: one to collect the globals and one so the
//! freshly bound outputs deliver their geometry and mode events.

use std::ffi::OsString;
use std::io;
use std::os::fd::BorrowedFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error, info, warn};
use wayland_client::backend::WaylandError;
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::wl_buffer::WlBuffer;
use wayland_client::protocol::wl_output::{self, WlOutput};
use wayland_client::protocol::wl_registry::{self, WlRegistry};
use wayland_client::protocol::wl_shm::WlShm;
use wayland_client::protocol::wl_shm_pool::WlShmPool;
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle};

use crate::backend::ConfigBackend;
use crate::config::Config;
use crate::error::{DisplayConfigError, Result};
use crate::output::{OutputId, OutputInfo, OutputRecord};
use crate::protocol::weston_display_coinfig::{self, WestonDisplayCoinfig};
use crate::request::{wait_for, EventPump, RequestId, RequestKind, RequestTracker};
use crate::shm::{buffer_layout, ShmBuffer};
use crate::wire::{HdmiInfo, HdmiInfos, HDMI_INFOS_SIZE};

/// Highest `wl_output` version we bind (v3 adds release)
const OUTPUT_VERSION: u32 = 3;

/// Dispatch state shared by every protocol object on the queue
pub struct DisplayConfigState {
    shm: WlShm,
    display_config: WestonDisplayCoinfig,
    outputs: Vec<OutputRecord>,
    tracker: RequestTracker,
}

impl DisplayConfigState {
    fn bind_output(
        &mut self,
        registry: &WlRegistry,
        name: u32,
        version: u32,
        qh: &QueueHandle<Self>,
    ) {
        let id = OutputId(name);
        if self.outputs.iter().any(|record| record.id == id) {
            return;
        }

        let output: WlOutput = registry.bind(name, version.min(OUTPUT_VERSION), qh, id);
        debug!("Bound {} (version {})", id, output.version());
        self.outputs.push(OutputRecord::new(id, output));
    }

    fn remove_output(&mut self, name: u32) {
        if let Some(index) = self.outputs.iter().position(|record| record.id.0 == name) {
            let record = self.outputs.remove(index);
            info!(
                "Output {} ({}) removed",
                record.id,
                record.geometry.description()
            );
        }
    }

    fn output_mut(&mut self, id: OutputId) -> Result<&mut OutputRecord> {
        self.outputs
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(DisplayConfigError::UnknownOutput(id.0))
    }
}

/// [`ConfigBackend`] over a live Wayland connection
pub struct WaylandBackend {
    connection: Connection,
    event_queue: EventQueue<DisplayConfigState>,
    state: DisplayConfigState,
    buffer_size: (i32, i32),
    request_timeout: Option<Duration>,
}

impl WaylandBackend {
    /// Connect as configured and bind the required globals
    pub fn connect(config: &Config) -> Result<Self> {
        let connection = match &config.connection.display {
            Some(display) => {
                let path = socket_path(display, std::env::var_os("XDG_RUNTIME_DIR"))?;
                let stream = UnixStream::connect(&path).map_err(|source| {
                    error!("Failed to connect to {:?}: {}", path, source);
                    DisplayConfigError::Socket {
                        path: path.clone(),
                        source,
                    }
                })?;
                Connection::from_socket(stream)?
            }
            None => Connection::connect_to_env().map_err(|e| {
                error!("Failed to connect to Wayland display: {}", e);
                e
            })?,
        };

        info!("Connected to Wayland display");

        Self::from_connection(connection, config)
    }

    /// Bind the required globals on an existing connection
    pub fn from_connection(connection: Connection, config: &Config) -> Result<Self> {
        let (stride, size) = buffer_layout(config.buffer.width, config.buffer.height)?;
        if (size as usize) < HDMI_INFOS_SIZE {
            return Err(DisplayConfigError::BufferTooSmall {
                required: HDMI_INFOS_SIZE,
                actual: size as usize,
            });
        }
        debug!(
            "Using {}x{} mode buffers (stride {})",
            config.buffer.width, config.buffer.height, stride
        );

        // First roundtrip: global announcements
        let (globals, mut event_queue) = registry_queue_init::<DisplayConfigState>(&connection)?;
        let qh = event_queue.handle();

        let display_config: WestonDisplayCoinfig =
            globals.bind(&qh, 1..=1, ()).map_err(|e| {
                error!("Display doesn't support weston_display_coinfig: {}", e);
                DisplayConfigError::MissingGlobal(WestonDisplayCoinfig::interface().name)
            })?;
        debug!("Bound weston_display_coinfig");

        let shm: WlShm = globals.bind(&qh, 1..=1, ()).map_err(|e| {
            error!("Display doesn't support wl_shm: {}", e);
            DisplayConfigError::MissingGlobal(WlShm::interface().name)
        })?;
        debug!("Bound wl_shm");

        let mut state = DisplayConfigState {
            shm,
            display_config,
            outputs: Vec::new(),
            tracker: RequestTracker::new(),
        };

        globals.contents().with_list(|list| {
            for global in list
                .iter()
                .filter(|global| global.interface == WlOutput::interface().name)
            {
                state.bind_output(globals.registry(), global.name, global.version, &qh);
            }
        });

        // Second roundtrip: output geometry and mode events
        event_queue.roundtrip(&mut state)?;

        if state.outputs.is_empty() {
            warn!("Compositor advertises no outputs");
        }
        info!("Display configuration ready, {} output(s)", state.outputs.len());

        Ok(Self {
            connection,
            event_queue,
            state,
            buffer_size: (config.buffer.width, config.buffer.height),
            request_timeout: config.request_timeout(),
        })
    }

    /// Underlying connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Number of requests waiting for the compositor
    pub fn pending_requests(&self) -> usize {
        self.state.tracker.pending()
    }

    fn flush(&self) -> Result<()> {
        self.connection.flush()?;
        Ok(())
    }
}

impl ConfigBackend for WaylandBackend {
    fn outputs(&self) -> Vec<OutputInfo> {
        self.state.outputs.iter().map(OutputRecord::info).collect()
    }

    fn request_modes(&mut self, output: OutputId) -> Result<RequestId> {
        let qh = self.event_queue.handle();
        let (width, height) = self.buffer_size;
        let state = &mut self.state;

        let record = state
            .outputs
            .iter_mut()
            .find(|record| record.id == output)
            .ok_or(DisplayConfigError::UnknownOutput(output.0))?;

        let mut buffer = match record.buffer.take() {
            Some(buffer) => buffer,
            None => ShmBuffer::new(&state.shm, width, height, &qh)?,
        };
        buffer.clear();

        state
            .display_config
            .get_resource2(&record.output, buffer.wl_buffer());
        record.buffer = Some(buffer);

        let request = state.tracker.issue(RequestKind::QueryModes);
        self.flush()?;

        debug!("Requested HDMI modes of {} ({})", output, request);
        Ok(request)
    }

    fn request_set_mode(&mut self, output: OutputId, mode: &HdmiInfo) -> Result<RequestId> {
        let record = self.state.output_mut(output)?;
        let wl_output = record.output.clone();

        self.state.display_config.set_mode(
            &wl_output,
            mode.xres,
            mode.yres,
            mode.refresh,
            mode.interlaced,
            0,
        );

        let request = self.state.tracker.issue(RequestKind::SetMode);
        self.flush()?;

        debug!("Requested {} on {} ({})", mode, output, request);
        Ok(request)
    }

    fn wait(&mut self, request: RequestId) -> Result<()> {
        let timeout = self.request_timeout;
        wait_for(self, request, timeout)
    }

    fn read_modes(&self, output: OutputId) -> Result<HdmiInfos> {
        let record = self
            .state
            .outputs
            .iter()
            .find(|record| record.id == output)
            .ok_or(DisplayConfigError::UnknownOutput(output.0))?;

        match &record.buffer {
            Some(buffer) => HdmiInfos::from_bytes(buffer.contents()),
            None => Err(DisplayConfigError::Truncated {
                required: HDMI_INFOS_SIZE,
                actual: 0,
            }),
        }
    }
}

impl EventPump for WaylandBackend {
    fn tracker(&self) -> &RequestTracker {
        &self.state.tracker
    }

    fn pump(&mut self, timeout: Option<Duration>) -> Result<()> {
        let Some(timeout) = timeout else {
            self.event_queue.blocking_dispatch(&mut self.state)?;
            return Ok(());
        };

        self.event_queue.flush()?;
        if self.event_queue.dispatch_pending(&mut self.state)? > 0 {
            return Ok(());
        }

        // None means events are already queued; dispatch them below
        if let Some(guard) = self.event_queue.prepare_read() {
            if poll_readable(guard.connection_fd(), timeout)? {
                match guard.read() {
                    Ok(_) => {}
                    Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.event_queue.dispatch_pending(&mut self.state)?;
        Ok(())
    }
}

impl Drop for WaylandBackend {
    fn drop(&mut self) {
        let outputs = self.state.outputs.len();
        self.state.outputs.clear();
        if let Err(e) = self.connection.flush() {
            debug!("Flush during teardown failed: {}", e);
        }
        info!("Display configuration released ({} output(s))", outputs);
    }
}

/// Resolve a configured display name the way libwayland does
fn socket_path(display: &str, runtime_dir: Option<OsString>) -> Result<PathBuf> {
    let display = Path::new(display);
    if display.is_absolute() {
        return Ok(display.to_path_buf());
    }

    match runtime_dir {
        Some(dir) => Ok(PathBuf::from(dir).join(display)),
        None => Err(DisplayConfigError::Config(format!(
            "XDG_RUNTIME_DIR is not set, cannot locate socket {}",
            display.display()
        ))),
    }
}

/// Wait up to `timeout` for the socket to become readable
fn poll_readable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool> {
    let millis = timeout.as_nanos().div_ceil(1_000_000).min(u16::MAX as u128) as u16;
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];

    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) => Ok(false),
        Ok(_) => Ok(true),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(DisplayConfigError::Backend(WaylandError::Io(e.into()))),
    }
}

impl Dispatch<WlRegistry, GlobalListContents> for DisplayConfigState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } if interface == WlOutput::interface().name => {
                info!("Output global {} announced", name);
                state.bind_output(registry, name, version, qh);
            }
            wl_registry::Event::GlobalRemove { name } => state.remove_output(name),
            _ => {}
        }
    }
}

impl Dispatch<WlOutput, OutputId> for DisplayConfigState {
    fn event(
        state: &mut Self,
        _proxy: &WlOutput,
        event: wl_output::Event,
        id: &OutputId,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        match state.outputs.iter_mut().find(|record| record.id == *id) {
            Some(record) => record.handle_event(event),
            None => debug!("Event for untracked {}", id),
        }
    }
}

impl Dispatch<WestonDisplayCoinfig, ()> for DisplayConfigState {
    fn event(
        state: &mut Self,
        _proxy: &WestonDisplayCoinfig,
        event: weston_display_coinfig::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        match event {
            weston_display_coinfig::Event::Done => {
                state.tracker.complete_next();
            }
        }
    }
}

impl Dispatch<WlShm, ()> for DisplayConfigState {
    fn event(
        _state: &mut Self,
        _proxy: &WlShm,
        _event: <WlShm as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        // Format announcements; XRGB8888 is mandatory
    }
}

impl Dispatch<WlShmPool, ()> for DisplayConfigState {
    fn event(
        _state: &mut Self,
        _proxy: &WlShmPool,
        _event: <WlShmPool as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        // No events expected from shm pools
    }
}

impl Dispatch<WlBuffer, ()> for DisplayConfigState {
    fn event(
        _state: &mut Self,
        _proxy: &WlBuffer,
        _event: <WlBuffer as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        // Release events don't matter, buffers are reused after done
    }
}
