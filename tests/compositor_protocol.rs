//! Protocol-level tests against an in-process compositor
//!
//! A `wayland-server` display serving `wl_shm`, `wl_output` and
//! `weston_display_coinfig` runs on its own thread and talks to
//! `WaylandBackend` over a socket pair. Mode lists are written into the
//! client's shm buffers exactly as the real compositor does.

use std::fs::File;
use std::os::unix::net::UnixStream;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use memmap2::{MmapMut, MmapOptions};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;
use wayland_client::Connection;
use wayland_server::backend::{ClientData, GlobalId};
use wayland_server::protocol::wl_buffer::WlBuffer;
use wayland_server::protocol::wl_output::{self, WlOutput};
use wayland_server::protocol::wl_shm::{self, WlShm};
use wayland_server::protocol::wl_shm_pool::{self, WlShmPool};
use wayland_server::{
    Client, DataInit, Dispatch, Display, DisplayHandle, GlobalDispatch, New, Resource,
};

use weston_displayconfig::{
    Config, DisplayConfigClient, DisplayConfigError, HdmiInfo, HdmiInfos, ModeList, ModeRequest,
    WaylandBackend,
};

use self::server::weston_display_coinfig::{self, WestonDisplayCoinfig};

mod server {
    #![allow(missing_docs, unreachable_pub, clippy::all, clippy::wildcard_imports)]

    pub use wayland_server;
    pub use wayland_server::protocol::{wl_buffer, wl_output};

    pub mod __interfaces {
        use wayland_server::backend as wayland_backend;
        use wayland_server::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/weston-display-config.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/weston-display-config.xml");
}

/// One monitor advertised by the test compositor
#[derive(Debug, Clone)]
struct Monitor {
    model: &'static str,
    modes: Vec<HdmiInfo>,
}

impl Monitor {
    fn new(model: &'static str, modes: &[HdmiInfo]) -> Self {
        Self {
            model,
            modes: modes.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Behavior {
    /// Send `done` for every request
    answer: bool,
    /// Write the mode list into the buffer before answering
    write_payload: bool,
    /// Send an unsolicited `done` when the extension is bound
    done_on_bind: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            answer: true,
            write_payload: true,
            done_on_bind: false,
        }
    }
}

struct Scenario {
    monitors: Vec<Monitor>,
    display_config: bool,
    behavior: Behavior,
}

impl Scenario {
    fn new(monitors: Vec<Monitor>) -> Self {
        Self {
            monitors,
            display_config: true,
            behavior: Behavior::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SetModeCall {
    monitor: Option<usize>,
    xres: i32,
    yres: i32,
    refresh: i32,
    interlaced: i32,
    flag: i32,
}

/// Requests the compositor has seen, in arrival order
#[derive(Debug, Clone, Default)]
struct RequestLog {
    queries: Vec<Option<usize>>,
    set_modes: Vec<SetModeCall>,
    pools: usize,
}

enum Command {
    AddMonitor(Monitor, Sender<()>),
    RemoveMonitor(usize, Sender<()>),
    Behave(Behavior, Sender<()>),
}

struct BufferSlot {
    map: Arc<Mutex<MmapMut>>,
    offset: usize,
}

struct TestClient;

impl ClientData for TestClient {}

struct CompositorState {
    monitors: Vec<Monitor>,
    behavior: Behavior,
    log: Arc<Mutex<RequestLog>>,
}

impl CompositorState {
    fn add_monitor(&mut self, dh: &DisplayHandle, monitor: Monitor) -> GlobalId {
        let index = self.monitors.len();
        self.monitors.push(monitor);
        dh.create_global::<Self, WlOutput, usize>(3, index)
    }

    fn write_modes(&self, monitor: usize, slot: &BufferSlot) {
        let modes: ModeList = self.monitors[monitor].modes.iter().copied().collect();
        let infos = HdmiInfos::try_from(&modes).unwrap();
        let mut map = slot.map.lock();
        infos.write_to(&mut map[slot.offset..]).unwrap();
    }
}

impl GlobalDispatch<WlShm, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlShm>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let shm = data_init.init(resource, ());
        shm.format(wl_shm::Format::Argb8888);
        shm.format(wl_shm::Format::Xrgb8888);
    }
}

impl Dispatch<WlShm, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &WlShm,
        request: wl_shm::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shm::Request::CreatePool { id, fd, size } = request {
            let file = File::from(fd);
            #[allow(unsafe_code)]
            let map = unsafe { MmapOptions::new().len(size as usize).map_mut(&file) }.unwrap();
            state.log.lock().pools += 1;
            data_init.init(id, Arc::new(Mutex::new(map)));
        }
    }
}

impl Dispatch<WlShmPool, Arc<Mutex<MmapMut>>> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlShmPool,
        request: wl_shm_pool::Request,
        data: &Arc<Mutex<MmapMut>>,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shm_pool::Request::CreateBuffer { id, offset, .. } = request {
            data_init.init(
                id,
                BufferSlot {
                    map: data.clone(),
                    offset: offset as usize,
                },
            );
        }
    }
}

impl Dispatch<WlBuffer, BufferSlot> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlBuffer,
        _request: <WlBuffer as Resource>::Request,
        _data: &BufferSlot,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl GlobalDispatch<WlOutput, usize> for CompositorState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlOutput>,
        global_data: &usize,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let output = data_init.init(resource, *global_data);
        let monitor = &state.monitors[*global_data];

        output.geometry(
            0,
            0,
            600,
            340,
            wl_output::Subpixel::Unknown,
            "Test".to_string(),
            monitor.model.to_string(),
            wl_output::Transform::Normal,
        );
        output.mode(
            wl_output::Mode::Preferred,
            1280,
            720,
            60000,
        );
        output.mode(
            wl_output::Mode::Current | wl_output::Mode::Preferred,
            1920,
            1080,
            60000,
        );
        if output.version() >= 2 {
            output.scale(1);
            output.done();
        }
    }
}

impl Dispatch<WlOutput, usize> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlOutput,
        _request: wl_output::Request,
        _data: &usize,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl GlobalDispatch<WestonDisplayCoinfig, ()> for CompositorState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WestonDisplayCoinfig>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let display_config = data_init.init(resource, ());
        if state.behavior.done_on_bind {
            display_config.done();
        }
    }
}

impl Dispatch<WestonDisplayCoinfig, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &WestonDisplayCoinfig,
        request: weston_display_coinfig::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            weston_display_coinfig::Request::GetResource { .. } => return,
            weston_display_coinfig::Request::GetResource2 { output, buffer } => {
                let monitor = output.data::<usize>().copied();
                state.log.lock().queries.push(monitor);

                if state.behavior.write_payload {
                    if let (Some(monitor), Some(slot)) = (monitor, buffer.data::<BufferSlot>()) {
                        state.write_modes(monitor, slot);
                    }
                }
            }
            weston_display_coinfig::Request::SetMode {
                output,
                xres,
                yres,
                refresh,
                interlaced,
                flag,
            } => {
                state.log.lock().set_modes.push(SetModeCall {
                    monitor: output.data::<usize>().copied(),
                    xres,
                    yres,
                    refresh,
                    interlaced,
                    flag,
                });
            }
        }

        if state.behavior.answer {
            resource.done();
        }
    }
}

/// Compositor thread plus the controls tests need
struct TestCompositor {
    commands: Option<Sender<Command>>,
    log: Arc<Mutex<RequestLog>>,
    thread: Option<JoinHandle<()>>,
}

impl TestCompositor {
    fn start(scenario: Scenario) -> (Self, Connection) {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        let (commands, receiver) = mpsc::channel();
        let log = Arc::new(Mutex::new(RequestLog::default()));

        let thread_log = log.clone();
        let thread = thread::spawn(move || serve(server_end, scenario, thread_log, receiver));

        let connection = Connection::from_socket(client_end).unwrap();
        let compositor = Self {
            commands: Some(commands),
            log,
            thread: Some(thread),
        };
        (compositor, connection)
    }

    fn send(&self, command: impl FnOnce(Sender<()>) -> Command) {
        let (ack, done) = mpsc::channel();
        if let Some(commands) = &self.commands {
            commands.send(command(ack)).unwrap();
        }
        done.recv().unwrap();
    }

    fn add_monitor(&self, monitor: Monitor) {
        self.send(|ack| Command::AddMonitor(monitor, ack));
    }

    fn remove_monitor(&self, index: usize) {
        self.send(|ack| Command::RemoveMonitor(index, ack));
    }

    fn set_behavior(&self, behavior: Behavior) {
        self.send(|ack| Command::Behave(behavior, ack));
    }

    fn log(&self) -> RequestLog {
        self.log.lock().clone()
    }
}

impl Drop for TestCompositor {
    fn drop(&mut self) {
        // Closing the channel stops the loop
        self.commands.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve(
    stream: UnixStream,
    scenario: Scenario,
    log: Arc<Mutex<RequestLog>>,
    commands: Receiver<Command>,
) {
    let mut display = Display::<CompositorState>::new().unwrap();
    let mut dh = display.handle();

    let mut state = CompositorState {
        monitors: Vec::new(),
        behavior: scenario.behavior,
        log,
    };

    dh.create_global::<CompositorState, WlShm, ()>(1, ());
    if scenario.display_config {
        dh.create_global::<CompositorState, WestonDisplayCoinfig, ()>(1, ());
    }
    let mut globals: Vec<GlobalId> = scenario
        .monitors
        .into_iter()
        .map(|monitor| state.add_monitor(&dh, monitor))
        .collect();

    dh.insert_client(stream, Arc::new(TestClient)).unwrap();

    loop {
        loop {
            let ack = match commands.try_recv() {
                Ok(Command::AddMonitor(monitor, ack)) => {
                    globals.push(state.add_monitor(&dh, monitor));
                    ack
                }
                Ok(Command::RemoveMonitor(index, ack)) => {
                    dh.remove_global::<CompositorState>(globals[index].clone());
                    ack
                }
                Ok(Command::Behave(behavior, ack)) => {
                    state.behavior = behavior;
                    ack
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            };
            let _ = display.flush_clients();
            let _ = ack.send(());
        }

        {
            let fd = display.backend().poll_fd();
            let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
            let _ = poll(&mut fds, PollTimeout::from(5u16));
        }

        if display.dispatch_clients(&mut state).is_err() {
            return;
        }
        let _ = display.flush_clients();
    }
}

fn config(timeout_ms: u64) -> Config {
    Config::default().with_overrides(None, Some(timeout_ms))
}

fn connect(connection: Connection, timeout_ms: u64) -> DisplayConfigClient {
    let backend = WaylandBackend::from_connection(connection, &config(timeout_ms)).unwrap();
    DisplayConfigClient::with_backend(backend)
}

fn living_room() -> Vec<HdmiInfo> {
    vec![
        HdmiInfo::new(1920, 1080, 60000, false),
        HdmiInfo::new(1280, 720, 60000, false),
    ]
}

fn projector() -> Vec<HdmiInfo> {
    vec![
        HdmiInfo::new(1920, 1080, 60000, false),
        HdmiInfo::new(1920, 1080, 50000, true),
        HdmiInfo::new(720, 576, 50000, true),
    ]
}

fn two_monitors() -> Vec<Monitor> {
    vec![
        Monitor::new("HDMI-0", &living_room()),
        Monitor::new("HDMI-1", &projector()),
    ]
}

#[test]
fn test_outputs_tracked_after_init() {
    let (_compositor, connection) = TestCompositor::start(Scenario::new(two_monitors()));
    let client = connect(connection, 2000);

    let outputs = client.outputs();
    assert_eq!(outputs.len(), 2);
    for (output, model) in outputs.iter().zip(["HDMI-0", "HDMI-1"]) {
        let geometry = &output.geometry;
        assert_eq!(geometry.model, model);
        assert_eq!(geometry.make, "Test");
        assert_eq!(
            (geometry.width, geometry.height, geometry.refresh),
            (1920, 1080, 60000)
        );
        assert_eq!(geometry.scale, 1);
        assert!(geometry.done);
    }
}

#[test]
fn test_query_last_output_wins() {
    let mut scenario = Scenario::new(two_monitors());
    scenario.behavior.done_on_bind = true;
    let (compositor, connection) = TestCompositor::start(scenario);
    let mut client = connect(connection, 2000);
    let outputs = client.outputs();

    let cached = *client.query_modes().unwrap();

    assert_eq!(cached.count, 3);
    assert_eq!(cached.modes(), &projector()[..]);
    assert_eq!(
        client.output_modes(outputs[0].id).unwrap().modes(),
        &living_room()[..]
    );
    assert_eq!(compositor.log().queries, vec![Some(0), Some(1)]);
    // the done sent at bind time was not credited to a query
    assert_eq!(client.backend().pending_requests(), 0);
}

#[test]
fn test_set_mode_once_per_output() {
    let (compositor, connection) = TestCompositor::start(Scenario::new(two_monitors()));
    // no deadline: waits go through blocking dispatch
    let mut client = connect(connection, 0);
    client.query_modes().unwrap();

    let applied = client
        .set_mode(&"1920x1080@60000".parse::<ModeRequest>().unwrap())
        .unwrap();
    assert_eq!(applied, HdmiInfo::new(1920, 1080, 60000, false));

    let expected: Vec<SetModeCall> = [0, 1]
        .into_iter()
        .map(|monitor| SetModeCall {
            monitor: Some(monitor),
            xres: 1920,
            yres: 1080,
            refresh: 60000,
            interlaced: 0,
            flag: 0,
        })
        .collect();
    assert_eq!(compositor.log().set_modes, expected);
    assert_eq!(client.backend().pending_requests(), 0);

    // Unknown tuple: nothing reaches the compositor
    assert!(matches!(
        client.set_mode(&ModeRequest::new(3840, 2160, 60000, 0)),
        Err(DisplayConfigError::ModeNotFound { .. })
    ));
    client.query_modes().unwrap();
    assert_eq!(compositor.log().set_modes.len(), 2);
}

#[test]
fn test_interlaced_mode_selected_exactly() {
    let (compositor, connection) =
        TestCompositor::start(Scenario::new(vec![Monitor::new("HDMI-1", &projector())]));
    let mut client = connect(connection, 2000);
    client.query_modes().unwrap();

    client
        .set_mode(&"1920x1080@50000i".parse::<ModeRequest>().unwrap())
        .unwrap();

    let calls = compositor.log().set_modes;
    assert_eq!(calls.len(), 1);
    assert_eq!((calls[0].refresh, calls[0].interlaced), (50000, 1));
}

#[test]
fn test_missing_display_config_global() {
    let mut scenario = Scenario::new(two_monitors());
    scenario.display_config = false;
    let (_compositor, connection) = TestCompositor::start(scenario);

    match WaylandBackend::from_connection(connection, &config(2000)) {
        Err(e) => {
            assert!(matches!(
                e,
                DisplayConfigError::MissingGlobal("weston_display_coinfig")
            ));
            assert_eq!(e.code(), -libc::ENOTSUP);
        }
        Ok(_) => panic!("bound a global the compositor never advertised"),
    }
}

#[test]
fn test_silent_compositor_times_out() {
    let mut scenario = Scenario::new(two_monitors());
    scenario.behavior.answer = false;
    let (_compositor, connection) = TestCompositor::start(scenario);
    let mut client = connect(connection, 150);

    let err = client.query_modes().unwrap_err();
    assert!(matches!(err, DisplayConfigError::Timeout { .. }));
    assert_eq!(err.code(), -libc::ETIMEDOUT);
    assert_eq!(client.backend().pending_requests(), 1);
}

#[test]
fn test_output_removed_during_session() {
    let (compositor, connection) = TestCompositor::start(Scenario::new(two_monitors()));
    let mut client = connect(connection, 2000);
    client.query_modes().unwrap();

    compositor.remove_monitor(1);

    // The removal is dispatched while the first output's query is waiting
    let cached = *client.query_modes().unwrap();
    assert_eq!(cached.modes(), &living_room()[..]);
    assert_eq!(client.outputs().len(), 1);
    assert_eq!(compositor.log().queries, vec![Some(0), Some(1), Some(0)]);
}

#[test]
fn test_output_added_during_session() {
    let (compositor, connection) =
        TestCompositor::start(Scenario::new(vec![Monitor::new("HDMI-0", &living_room())]));
    let mut client = connect(connection, 2000);
    client.query_modes().unwrap();

    compositor.add_monitor(Monitor::new("HDMI-1", &projector()));

    // Announced while waiting; bound but not part of this query
    let cached = *client.query_modes().unwrap();
    assert_eq!(cached.modes(), &living_room()[..]);
    assert_eq!(client.outputs().len(), 2);

    let cached = *client.query_modes().unwrap();
    assert_eq!(cached.modes(), &projector()[..]);
    assert_eq!(
        compositor.log().queries,
        vec![Some(0), Some(0), Some(0), Some(1)]
    );
}

#[test]
fn test_buffer_reused_and_cleared() {
    let (compositor, connection) =
        TestCompositor::start(Scenario::new(vec![Monitor::new("HDMI-0", &living_room())]));
    let mut client = connect(connection, 2000);

    assert_eq!(client.query_modes().unwrap().count, 2);

    compositor.set_behavior(Behavior {
        write_payload: false,
        ..Behavior::default()
    });

    // Nothing written this time: the zeroed buffer reads back empty
    let cached = *client.query_modes().unwrap();
    assert_eq!(cached, HdmiInfos::default());
    assert!(client.mode_list().is_empty());
    assert_eq!(compositor.log().pools, 1);
}
