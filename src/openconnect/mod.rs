//! Open Connect — the simulator's JSON-over-TCP wire protocol.
//!
//! Outbound messages are single JSON objects, one per write, with no
//! trailing newline. Inbound bytes may concatenate several objects; the
//! client decodes exactly one per response and leaves the rest buffered.
//!
//! - [`wire`] — message types and their exact key spellings.
//! - [`client`] — the TCP client state machine.

pub mod client;
pub mod wire;

pub use client::{SimClient, SimulatorError};
pub use wire::{BallData, ClubData, ShotDataOptions, ShotMessage, SimResponse};

/// Default simulator port.
pub const DEFAULT_PORT: u16 = 921;
