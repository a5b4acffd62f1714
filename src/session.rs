//! Composition root: owns the transport threads, the router, and the
//! event stream.
//!
//! Two long-lived loops (the device read loop and the simulator client
//! loop) run on their own threads and cooperate only through channels.
//! Each loop supervises its own reconnection with the shared backoff
//! policy; CPU-bound flight simulation runs on a dedicated worker so it
//! never holds back-pressure on an I/O loop. Event emission never blocks:
//! a full event channel drops the event, not the pipeline.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded, select};
use tracing::{debug, info, trace, warn};

use crate::accumulator::{ShotAccumulator, ShotOutcome, ValidatedShot};
use crate::events::{BridgeEvent, EventKind, Transport, TransportState};
use crate::frame::{MessageSplitter, SplitterItem};
use crate::mock::MockDevice;
use crate::openconnect::client::HEARTBEAT_INTERVAL;
use crate::openconnect::{SimClient, SimulatorError};
use crate::physics::{FlightEngine, Launch};
use crate::protocol::{Message, StatusFrame};
use crate::reconnect::{self, BackoffPolicy, CancelToken, ReconnectError};
use crate::router::{Router, RouterMode, ShotSink};
use crate::settings::Settings;
use crate::usb::{ChunkSource, DeviceError, UsbSession};

const EVENT_CAPACITY: usize = 256;
const SINK_CAPACITY: usize = 32;
/// Idle pause when a chunk source reports no data without blocking itself.
const IDLE_POLL: std::time::Duration = std::time::Duration::from_millis(10);

/// Makes one device connection attempt.
pub type DeviceFactory = Box<dyn FnMut() -> Result<Box<dyn ChunkSource>, DeviceError> + Send>;

struct TaskHandle {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// The bridge core. External collaborators talk to it through these
/// methods and the event stream returned by [`Session::new`].
pub struct Session {
    events_tx: Sender<BridgeEvent>,
    router: Arc<Mutex<Router>>,
    policy: BackoffPolicy,
    use_mock: bool,
    reject_zero_spin: bool,
    /// Send-half of the status line into the simulator loop, present while
    /// a remote connection task is running.
    remote_status: Arc<Mutex<Option<Sender<(bool, bool)>>>>,
    device_task: Option<TaskHandle>,
    remote_task: Option<TaskHandle>,
}

impl Session {
    /// Build the core from a settings document. Returns the session handle
    /// and the receive-half of its event stream.
    pub fn new(settings: &Settings) -> (Self, Receiver<BridgeEvent>) {
        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);
        let router = Arc::new(Mutex::new(Router::new(settings.mode)));

        // The local sink is always attached; the physics worker exits on
        // its own once every send-half is gone.
        let engine = FlightEngine::new(settings.range_conditions(), settings.open_range.surface);
        let (local_tx, local_rx) = bounded::<ValidatedShot>(SINK_CAPACITY);
        router
            .lock()
            .expect("router lock poisoned")
            .attach(ShotSink::Local(local_tx));
        {
            let events = events_tx.clone();
            thread::Builder::new()
                .name("physics".to_string())
                .spawn(move || run_physics_worker(engine, local_rx, events))
                .expect("failed to spawn physics worker");
        }

        let session = Self {
            events_tx,
            router,
            policy: BackoffPolicy::default(),
            use_mock: settings.device.use_mock,
            reject_zero_spin: settings.device.reject_zero_spin,
            remote_status: Arc::new(Mutex::new(None)),
            device_task: None,
            remote_task: None,
        };
        (session, events_rx)
    }

    pub fn mode(&self) -> RouterMode {
        self.router.lock().expect("router lock poisoned").mode()
    }

    /// Switch the shot destination. Idempotent; subscribers see a
    /// `ModeChanged` event only on an actual change.
    pub fn set_mode(&self, mode: RouterMode) {
        let changed = self
            .router
            .lock()
            .expect("router lock poisoned")
            .set_mode(mode);
        if changed {
            emit(&self.events_tx, EventKind::ModeChanged { mode });
        }
    }

    /// Start the device task (USB, or the scripted mock when configured).
    /// No-op while a device task is already running.
    pub fn connect_device(&mut self) {
        let factory: DeviceFactory = if self.use_mock {
            Box::new(|| Ok(Box::new(MockDevice::demo()) as Box<dyn ChunkSource>))
        } else {
            Box::new(|| UsbSession::open().map(|s| Box::new(s) as Box<dyn ChunkSource>))
        };
        self.connect_device_with(factory);
    }

    /// Start the device task with an explicit source factory (embedding
    /// hook; also how the tests drive the pipeline).
    pub fn connect_device_with(&mut self, factory: DeviceFactory) {
        if self.device_task.is_some() {
            debug!("device task already running");
            return;
        }
        let cancel = CancelToken::new();
        let task_cancel = cancel.clone();
        let router = Arc::clone(&self.router);
        let events = self.events_tx.clone();
        let remote_status = Arc::clone(&self.remote_status);
        let policy = self.policy;
        let reject_zero_spin = self.reject_zero_spin;
        let handle = thread::Builder::new()
            .name("gc2-device".to_string())
            .spawn(move || {
                run_device_task(
                    factory,
                    router,
                    events,
                    remote_status,
                    policy,
                    reject_zero_spin,
                    task_cancel,
                );
            })
            .expect("failed to spawn device task");
        self.device_task = Some(TaskHandle { cancel, handle });
    }

    /// Stop the device task and wait for it to wind down.
    pub fn disconnect_device(&mut self) {
        if let Some(task) = self.device_task.take() {
            task.cancel.cancel();
            let _ = task.handle.join();
        }
    }

    /// Start the simulator client task. No-op while one is already running.
    pub fn connect_remote(&mut self, host: &str, port: u16) {
        if self.remote_task.is_some() {
            debug!("remote task already running");
            return;
        }

        let (shots_tx, shots_rx) = bounded::<ValidatedShot>(SINK_CAPACITY);
        let (status_tx, status_rx) = bounded::<(bool, bool)>(SINK_CAPACITY);
        self.router
            .lock()
            .expect("router lock poisoned")
            .attach(ShotSink::Remote(shots_tx));
        *self.remote_status.lock().expect("status lock poisoned") = Some(status_tx);

        let cancel = CancelToken::new();
        let task_cancel = cancel.clone();
        let events = self.events_tx.clone();
        let policy = self.policy;
        let host = host.to_string();
        let handle = thread::Builder::new()
            .name("simulator".to_string())
            .spawn(move || {
                run_remote_task(&host, port, shots_rx, status_rx, events, policy, task_cancel);
            })
            .expect("failed to spawn simulator task");
        self.remote_task = Some(TaskHandle { cancel, handle });
    }

    /// Stop the simulator client task, detach its sink, and wait for it.
    pub fn disconnect_remote(&mut self) {
        *self.remote_status.lock().expect("status lock poisoned") = None;
        self.router
            .lock()
            .expect("router lock poisoned")
            .detach(RouterMode::Remote);
        if let Some(task) = self.remote_task.take() {
            task.cancel.cancel();
            let _ = task.handle.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect_device();
        self.disconnect_remote();
    }
}

fn emit(events: &Sender<BridgeEvent>, kind: EventKind) {
    if events.try_send(BridgeEvent::new(kind)).is_err() {
        trace!("event channel full or closed, event dropped");
    }
}

// ---------------------------------------------------------------------------
// Physics worker
// ---------------------------------------------------------------------------

fn run_physics_worker(
    engine: FlightEngine,
    shots: Receiver<ValidatedShot>,
    events: Sender<BridgeEvent>,
) {
    while let Ok(shot) = shots.recv() {
        let shot_number = shot.shot_number;
        match engine.simulate(&Launch::from(&shot)) {
            Ok(result) => {
                emit(&events, EventKind::ShotSimulated { shot_number, result });
            }
            Err(e) => {
                warn!(shot_number, error = %e, "simulation failed");
                emit(
                    &events,
                    EventKind::SimulationFailed {
                        shot_number,
                        error: e.to_string(),
                    },
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Device task
// ---------------------------------------------------------------------------

enum DeviceEnd {
    Cancelled,
    Disconnected,
    Fatal,
}

fn run_device_task(
    mut factory: DeviceFactory,
    router: Arc<Mutex<Router>>,
    events: Sender<BridgeEvent>,
    remote_status: Arc<Mutex<Option<Sender<(bool, bool)>>>>,
    policy: BackoffPolicy,
    reject_zero_spin: bool,
    cancel: CancelToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        emit(
            &events,
            EventKind::TransportStateChanged {
                transport: Transport::Device,
                state: TransportState::Connecting,
            },
        );

        let source = match reconnect::supervise(
            &policy,
            &cancel,
            || factory(),
            |status| {
                emit(
                    &events,
                    EventKind::ReconnectStatus {
                        transport: Transport::Device,
                        status,
                    },
                );
            },
        ) {
            Ok(source) => source,
            Err(ReconnectError::Cancelled) => break,
            Err(ReconnectError::Exhausted { attempts, last }) => {
                warn!(attempts, error = %last, "device reconnect exhausted");
                break; // explicit retry required
            }
        };

        emit(
            &events,
            EventKind::TransportStateChanged {
                transport: Transport::Device,
                state: TransportState::Connected,
            },
        );

        match run_device_session(
            source,
            &router,
            &events,
            &remote_status,
            reject_zero_spin,
            &cancel,
        ) {
            DeviceEnd::Cancelled | DeviceEnd::Fatal => break,
            DeviceEnd::Disconnected => {
                emit(
                    &events,
                    EventKind::TransportStateChanged {
                        transport: Transport::Device,
                        state: TransportState::Disconnected,
                    },
                );
                // Loop around into a fresh supervision run.
            }
        }
    }

    emit(
        &events,
        EventKind::TransportStateChanged {
            transport: Transport::Device,
            state: TransportState::Disconnected,
        },
    );
}

fn run_device_session(
    mut source: Box<dyn ChunkSource>,
    router: &Arc<Mutex<Router>>,
    events: &Sender<BridgeEvent>,
    remote_status: &Arc<Mutex<Option<Sender<(bool, bool)>>>>,
    reject_zero_spin: bool,
    cancel: &CancelToken,
) -> DeviceEnd {
    let mut splitter = MessageSplitter::new();
    let mut accumulator = ShotAccumulator::new().with_reject_zero_spin(reject_zero_spin);
    let mut last_status: Option<StatusFrame> = None;

    loop {
        if cancel.is_cancelled() {
            return DeviceEnd::Cancelled;
        }

        match source.read_chunk() {
            Ok(Some(chunk)) => match splitter.feed(&chunk) {
                Ok(items) => {
                    for item in items {
                        handle_item(
                            item,
                            &mut accumulator,
                            &mut last_status,
                            router,
                            events,
                            remote_status,
                        );
                    }
                }
                Err(e) => {
                    // The splitter reset itself; the stream continues.
                    warn!(error = %e, "framing error, buffer reset");
                }
            },
            Ok(None) => thread::sleep(IDLE_POLL),
            Err(DeviceError::PermissionDenied) => {
                warn!("device permission denied; user action required");
                return DeviceEnd::Fatal;
            }
            Err(e) => {
                info!(error = %e, "device session ended");
                return DeviceEnd::Disconnected;
            }
        }

        for outcome in accumulator.tick(Instant::now()) {
            handle_outcome(outcome, router, events);
        }
    }
}

fn handle_item(
    item: SplitterItem,
    accumulator: &mut ShotAccumulator,
    last_status: &mut Option<StatusFrame>,
    router: &Arc<Mutex<Router>>,
    events: &Sender<BridgeEvent>,
    remote_status: &Arc<Mutex<Option<Sender<(bool, bool)>>>>,
) {
    let (lines, salvage) = match item {
        SplitterItem::Message(lines) => (lines, false),
        SplitterItem::SalvageCandidate(lines) => (lines, true),
    };

    let message = match Message::decode(&lines) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "undecodable message dropped");
            return;
        }
    };

    match message {
        Message::Shot(frame) => {
            if salvage {
                debug!(shot_id = frame.shot_id, "salvage candidate from interrupted shot");
            } else {
                emit(events, EventKind::FrameReceived { frame: frame.clone() });
            }
            for outcome in accumulator.handle_frame(frame, Instant::now()) {
                handle_outcome(outcome, router, events);
            }
        }
        Message::Status(status) => {
            if last_status.replace(status) != Some(status) {
                emit(
                    events,
                    EventKind::StatusChanged {
                        status,
                        ready: status.ready(),
                        ball_detected: status.ball_detected(),
                    },
                );
                if let Some(tx) = remote_status.lock().expect("status lock poisoned").as_ref() {
                    let _ = tx.try_send((status.ready(), status.ball_detected()));
                }
            }
        }
        Message::Unknown { tag, .. } => {
            trace!(tag, "unknown message tag ignored");
        }
    }
}

fn handle_outcome(
    outcome: ShotOutcome,
    router: &Arc<Mutex<Router>>,
    events: &Sender<BridgeEvent>,
) {
    match outcome {
        ShotOutcome::Validated(mut shot) => {
            let routed = router
                .lock()
                .expect("router lock poisoned")
                .route(shot.clone());
            match routed {
                Ok(number) => {
                    shot.shot_number = number;
                    info!(
                        shot_id = shot.shot_id,
                        shot_number = number,
                        speed = shot.ball_speed_mph,
                        incomplete = shot.incomplete,
                        "shot routed"
                    );
                    emit(events, EventKind::ShotValidated { shot });
                }
                Err(e) => warn!(shot_id = shot.shot_id, error = %e, "shot dropped by router"),
            }
        }
        ShotOutcome::Rejected { shot_id, reason } => {
            emit(events, EventKind::ShotRejected { shot_id, reason });
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator task
// ---------------------------------------------------------------------------

enum RemoteEnd {
    Cancelled,
    Disconnected,
}

fn run_remote_task(
    host: &str,
    port: u16,
    shots_rx: Receiver<ValidatedShot>,
    status_rx: Receiver<(bool, bool)>,
    events: Sender<BridgeEvent>,
    policy: BackoffPolicy,
    cancel: CancelToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        emit(
            &events,
            EventKind::TransportStateChanged {
                transport: Transport::Simulator,
                state: TransportState::Connecting,
            },
        );

        let client = match reconnect::supervise(
            &policy,
            &cancel,
            || SimClient::connect(host, port),
            |status| {
                emit(
                    &events,
                    EventKind::ReconnectStatus {
                        transport: Transport::Simulator,
                        status,
                    },
                );
            },
        ) {
            Ok(client) => client,
            Err(ReconnectError::Cancelled) => break,
            Err(ReconnectError::Exhausted { attempts, last }) => {
                warn!(attempts, error = %last, "simulator reconnect exhausted");
                break; // explicit retry required
            }
        };

        emit(
            &events,
            EventKind::TransportStateChanged {
                transport: Transport::Simulator,
                state: TransportState::Connected,
            },
        );

        match run_remote_session(client, &shots_rx, &status_rx, &events, &cancel) {
            RemoteEnd::Cancelled => break,
            RemoteEnd::Disconnected => {
                emit(
                    &events,
                    EventKind::TransportStateChanged {
                        transport: Transport::Simulator,
                        state: TransportState::Disconnected,
                    },
                );
            }
        }
    }

    emit(
        &events,
        EventKind::TransportStateChanged {
            transport: Transport::Simulator,
            state: TransportState::Disconnected,
        },
    );
}

fn run_remote_session(
    mut client: SimClient,
    shots_rx: &Receiver<ValidatedShot>,
    status_rx: &Receiver<(bool, bool)>,
    events: &Sender<BridgeEvent>,
    cancel: &CancelToken,
) -> RemoteEnd {
    let mut heartbeat_at = Instant::now() + HEARTBEAT_INTERVAL;

    loop {
        if cancel.is_cancelled() {
            emit(
                events,
                EventKind::TransportStateChanged {
                    transport: Transport::Simulator,
                    state: TransportState::Disconnecting,
                },
            );
            client.shutdown();
            return RemoteEnd::Cancelled;
        }

        let until_heartbeat = heartbeat_at.saturating_duration_since(Instant::now());
        select! {
            recv(shots_rx) -> msg => match msg {
                Ok(shot) => {
                    match client.send_shot(&shot) {
                        Ok(resp) => debug!(
                            shot_number = shot.shot_number,
                            code = resp.code,
                            "shot accepted by simulator"
                        ),
                        Err(SimulatorError::Rejected { code, message }) => {
                            warn!(shot_number = shot.shot_number, code, message, "simulator rejected shot");
                        }
                        Err(e) if e.is_fatal() => {
                            warn!(error = %e, "simulator connection lost");
                            return RemoteEnd::Disconnected;
                        }
                        Err(e) => warn!(error = %e, "simulator response dropped"),
                    }
                    heartbeat_at = Instant::now() + HEARTBEAT_INTERVAL;
                }
                // Sink detached: the session is tearing this task down.
                Err(_) => return RemoteEnd::Cancelled,
            },
            recv(status_rx) -> msg => match msg {
                Ok((ready, ball_detected)) => {
                    if let Err(e) = client.send_status(ready, ball_detected) {
                        if e.is_fatal() {
                            warn!(error = %e, "simulator connection lost");
                            return RemoteEnd::Disconnected;
                        }
                        warn!(error = %e, "status update dropped");
                    }
                    heartbeat_at = Instant::now() + HEARTBEAT_INTERVAL;
                }
                Err(_) => return RemoteEnd::Cancelled,
            },
            default(until_heartbeat) => {
                if let Err(e) = client.heartbeat() {
                    warn!(error = %e, "heartbeat failed");
                    return RemoteEnd::Disconnected;
                }
                heartbeat_at = Instant::now() + HEARTBEAT_INTERVAL;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
