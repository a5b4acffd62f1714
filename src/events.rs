//! Typed event stream consumed by external collaborators (UI, CLI, export).
//!
//! Every event flows through a single bounded channel handed out by the
//! session. Producers stamp events with the UTC wall clock; consumers
//! subscribe and filter. The core never blocks on a slow consumer: events
//! are dropped (with a trace) when the channel is full.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::accumulator::{RejectReason, ValidatedShot};
use crate::physics::ShotResult;
use crate::protocol::{ShotFrame, StatusFrame};
use crate::reconnect::ReconnectStatus;
use crate::router::RouterMode;

/// Which transport an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Device,
    Simulator,
}

/// Lifecycle of a transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// A single event on the session's stream.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeEvent {
    pub timestamp: DateTime<Utc>,
    pub event: EventKind,
}

impl BridgeEvent {
    pub fn new(event: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum EventKind {
    /// A `0H` frame was parsed (before accumulation/validation).
    FrameReceived { frame: ShotFrame },
    /// Device status changed.
    StatusChanged {
        status: StatusFrame,
        ready: bool,
        ball_detected: bool,
    },
    /// A shot cleared validation and was routed. `shot.shot_number` is the
    /// router-assigned sequence number.
    ShotValidated { shot: ValidatedShot },
    /// A shot was discarded by validation.
    ShotRejected { shot_id: u32, reason: RejectReason },
    /// The local flight engine finished a shot.
    ShotSimulated {
        shot_number: u64,
        result: ShotResult,
    },
    /// The local flight engine could not finish a shot.
    SimulationFailed { shot_number: u64, error: String },
    /// A transport changed connection state.
    TransportStateChanged {
        transport: Transport,
        state: TransportState,
    },
    /// Progress of a reconnect supervisor.
    ReconnectStatus {
        transport: Transport,
        status: ReconnectStatus,
    },
    /// The router switched destinations.
    ModeChanged { mode: RouterMode },
}
