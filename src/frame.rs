//! Message reassembly for the GC2 USB byte stream.
//!
//! Wire format:
//! ```text
//! TAG\nKEY=VALUE\nKEY=VALUE\n\t
//! ```
//!
//! `\n` terminates a line, `\n\t` terminates a message. Lines never cross
//! message boundaries but may be split across USB chunks at any byte, so
//! the splitter buffers partial data across `feed()` calls.
//!
//! The device interrupts itself: a `0H` header arriving mid-message means
//! the shot under assembly was abandoned (discard it), while a `0M` header
//! arriving during a `0H` means a status event preempted the shot. The
//! partial shot is still worth salvaging and is emitted as a candidate for
//! the accumulator to rule on.

use crate::codec;
use crate::error::{ProtocolError, Result};
use crate::protocol::{TAG_SHOT, TAG_STATUS};

/// Reassembly buffer limit. Bounds memory against a pathological device.
pub const MAX_BUFFER: usize = 16 * 1024;

/// One output of [`MessageSplitter::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitterItem {
    /// A complete message (terminated by `\n\t`).
    Message(Vec<String>),
    /// A partial `0H` message cut off by a `0M` status event. The shot
    /// state machine decides whether its fields are worth keeping.
    SalvageCandidate(Vec<String>),
}

/// Splits a byte stream into line-grouped messages. Buffers partial lines
/// and partial messages across calls, so it can be fed USB chunk
/// boundaries.
pub struct MessageSplitter {
    /// Bytes of the line currently under assembly.
    line: Vec<u8>,
    /// Complete lines of the message currently under assembly.
    message: Vec<String>,
    /// Bytes held in `message`; `limit` applies to this plus the partial line.
    buffered: usize,
    /// The previous byte was `\n`; a following `\t` terminates the message.
    at_line_boundary: bool,
    limit: usize,
}

impl MessageSplitter {
    pub fn new() -> Self {
        Self::with_limit(MAX_BUFFER)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            line: Vec::with_capacity(64),
            message: Vec::new(),
            buffered: 0,
            at_line_boundary: false,
            limit,
        }
    }

    /// Feed new bytes and extract any complete messages.
    ///
    /// On buffer overflow the splitter resets itself (partial line and
    /// message dropped) and returns `ProtocolError::BufferOverflow`;
    /// subsequent `feed()` calls resume normally.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<SplitterItem>> {
        let mut items = Vec::new();

        for &b in data {
            if self.at_line_boundary {
                self.at_line_boundary = false;
                if b == b'\t' {
                    self.finish_message(&mut items);
                    continue;
                }
            }

            if b == b'\n' {
                self.finish_line(&mut items);
                self.at_line_boundary = true;
            } else {
                self.line.push(b);
                let len = self.buffered + self.line.len();
                if len > self.limit {
                    self.reset();
                    return Err(ProtocolError::BufferOverflow {
                        len,
                        limit: self.limit,
                    });
                }
            }
        }

        Ok(items)
    }

    /// Drop all buffered state.
    pub fn reset(&mut self) {
        self.line.clear();
        self.message.clear();
        self.buffered = 0;
        self.at_line_boundary = false;
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn finish_line(&mut self, items: &mut Vec<SplitterItem>) {
        let raw = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        let line = raw.trim_end_matches('\r').to_string();
        if line.trim_ascii().is_empty() {
            return;
        }

        let token = codec::first_token(&line);
        let starts_shot = token == TAG_SHOT;
        let starts_status = token == TAG_STATUS;

        if starts_shot {
            // New shot header preempts whatever was under assembly.
            if !self.message.is_empty() {
                self.drop_message();
            }
        } else if starts_status && !self.message.is_empty() {
            // Status preempting a shot: the partial shot goes out as a
            // salvage candidate; anything else under assembly is stale.
            if codec::first_token(&self.message[0]) == TAG_SHOT {
                items.push(SplitterItem::SalvageCandidate(std::mem::take(
                    &mut self.message,
                )));
                self.buffered = 0;
            } else {
                self.drop_message();
            }
        }
        self.push_line(line);
    }

    fn finish_message(&mut self, items: &mut Vec<SplitterItem>) {
        if !self.message.is_empty() {
            items.push(SplitterItem::Message(std::mem::take(&mut self.message)));
            self.buffered = 0;
        }
    }

    fn push_line(&mut self, line: String) {
        self.buffered += line.len();
        self.message.push(line);
    }

    fn drop_message(&mut self) {
        self.message.clear();
        self.buffered = 0;
    }
}

impl Default for MessageSplitter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
