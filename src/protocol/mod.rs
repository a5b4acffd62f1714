//! Message types and decode dispatch for the GC2 text protocol.
//!
//! The device emits line-grouped messages (see [`crate::frame`]) tagged by
//! their first line: `0H` for shot data, `0M` for status. Anything else is
//! preserved as [`Message::Unknown`] and ignored upstream, so newer
//! firmware tags never break the pipeline.

pub mod shot;
pub mod status;

use crate::error::{ProtocolError, Result};

pub use shot::{ClubFrame, ShotFrame};
pub use status::StatusFrame;

// ---------------------------------------------------------------------------
// Message tags
// ---------------------------------------------------------------------------

/// Shot data message tag.
pub const TAG_SHOT: &str = "0H";
/// Status message tag.
pub const TAG_STATUS: &str = "0M";

// ---------------------------------------------------------------------------
// Message — decoded device output
// ---------------------------------------------------------------------------

/// A decoded device message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Shot data (`0H`).
    Shot(ShotFrame),
    /// Device status (`0M`).
    Status(StatusFrame),

    // -- Forward compat --
    Unknown { tag: String, lines: Vec<String> },
}

impl Message {
    /// Decode a line-grouped message into a typed `Message`.
    pub fn decode(lines: &[String]) -> Result<Self> {
        let header = lines.first().ok_or(ProtocolError::EmptyMessage)?;
        match crate::codec::first_token(header) {
            TAG_SHOT => Ok(Message::Shot(ShotFrame::decode(lines)?)),
            TAG_STATUS => Ok(Message::Status(StatusFrame::decode(lines))),
            tag => Ok(Message::Unknown {
                tag: tag.to_string(),
                lines: lines.to_vec(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
