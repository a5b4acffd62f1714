//! Shot routing between the two destination sinks.
//!
//! Exactly one destination is active at a time: the remote simulator (TCP)
//! or the local flight engine. A sink is the send-half of a channel owned
//! by the destination thread; the router never holds a transport, so
//! switching modes neither opens nor closes connections.

use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::accumulator::ValidatedShot;

/// Active shot destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// Forward shots to the remote simulator over TCP.
    #[default]
    Remote,
    /// Feed shots to the in-process flight engine.
    Local,
}

/// Why a shot could not be handed to the active sink. The router never
/// retries; callers decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("{mode:?} sink is not attached")]
    NotAttached { mode: RouterMode },
    #[error("{mode:?} sink is detached (receiver dropped)")]
    Closed { mode: RouterMode },
    #[error("{mode:?} sink queue is full")]
    Busy { mode: RouterMode },
}

/// One shot destination. Both variants share a single contract (accept a
/// validated shot or report why delivery failed); the closed set keeps
/// dispatch a match, not open-ended trait inheritance.
pub enum ShotSink {
    /// The simulator client thread's inbound shot queue.
    Remote(Sender<ValidatedShot>),
    /// The flight-engine worker's inbound shot queue.
    Local(Sender<ValidatedShot>),
}

impl ShotSink {
    /// The mode this sink serves.
    pub fn mode(&self) -> RouterMode {
        match self {
            ShotSink::Remote(_) => RouterMode::Remote,
            ShotSink::Local(_) => RouterMode::Local,
        }
    }

    fn deliver(&self, shot: ValidatedShot) -> Result<(), RouteError> {
        let mode = self.mode();
        let sender = match self {
            ShotSink::Remote(tx) | ShotSink::Local(tx) => tx,
        };
        match sender.try_send(shot) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RouteError::Busy { mode }),
            Err(TrySendError::Disconnected(_)) => Err(RouteError::Closed { mode }),
        }
    }
}

/// Single-writer dispatch of validated shots to exactly one sink.
///
/// Callers serialize access (the session wraps the router in a mutex), so
/// a mode change is atomic with respect to any in-flight `route()` call.
pub struct Router {
    mode: RouterMode,
    remote: Option<ShotSink>,
    local: Option<ShotSink>,
    next_shot_number: u64,
}

impl Router {
    pub fn new(mode: RouterMode) -> Self {
        Self {
            mode,
            remote: None,
            local: None,
            next_shot_number: 1,
        }
    }

    pub fn mode(&self) -> RouterMode {
        self.mode
    }

    /// Switch the active destination. Idempotent; returns whether the mode
    /// actually changed so the caller can notify subscribers.
    pub fn set_mode(&mut self, mode: RouterMode) -> bool {
        if self.mode == mode {
            return false;
        }
        debug!(from = ?self.mode, to = ?mode, "router mode change");
        self.mode = mode;
        true
    }

    /// Attach a sink in the slot its variant names. Replaces any sink
    /// already there.
    pub fn attach(&mut self, sink: ShotSink) {
        match sink.mode() {
            RouterMode::Remote => self.remote = Some(sink),
            RouterMode::Local => self.local = Some(sink),
        }
    }

    /// Detach the sink serving `mode`, leaving its transport untouched.
    pub fn detach(&mut self, mode: RouterMode) {
        match mode {
            RouterMode::Remote => self.remote = None,
            RouterMode::Local => self.local = None,
        }
    }

    /// Assign the next shot number and dispatch to the active sink exactly
    /// once. The number is consumed even when dispatch fails, so numbers
    /// stay strictly increasing across the process lifetime.
    pub fn route(&mut self, mut shot: ValidatedShot) -> Result<u64, RouteError> {
        let sink = match self.mode {
            RouterMode::Remote => self.remote.as_ref(),
            RouterMode::Local => self.local.as_ref(),
        }
        .ok_or(RouteError::NotAttached { mode: self.mode })?;

        let number = self.next_shot_number;
        self.next_shot_number += 1;
        shot.shot_number = number;

        sink.deliver(shot)?;
        Ok(number)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
