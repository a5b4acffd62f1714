//! Scripted byte source standing in for the device.
//!
//! Backs the `device.use_mock` setting and the pipeline tests: the scripted
//! chunks flow through the exact same splitter/parser/accumulator path as
//! real USB reads, including arbitrary chunk boundaries.

use std::collections::VecDeque;

use crate::protocol::{ShotFrame, StatusFrame};
use crate::usb::{ChunkSource, DeviceError};

/// Replays a queued script of byte chunks, then reads as an idle device.
#[derive(Debug, Default)]
pub struct MockDevice {
    chunks: VecDeque<Vec<u8>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ready device with one ball teed and a clean driver shot queued.
    pub fn demo() -> Self {
        let mut mock = Self::new();
        mock.push_status(&StatusFrame { flags: 7, balls: 1 });
        mock.push_shot(&ShotFrame {
            shot_id: 1,
            msec_since_contact: Some(1000),
            ball_speed_mph: Some(167.0),
            vla_deg: Some(10.9),
            hla_deg: Some(0.0),
            total_spin_rpm: Some(2686.0),
            back_spin_rpm: Some(2686.0),
            side_spin_rpm: Some(0.0),
            has_hmt: false,
            club: Default::default(),
        });
        mock
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.chunks.push_back(bytes.to_vec());
    }

    pub fn push_text(&mut self, text: &str) {
        self.push_bytes(text.as_bytes());
    }

    /// Queue `text` split into `chunk_size`-byte reads, exercising line and
    /// message reassembly across chunk boundaries.
    pub fn push_chunked(&mut self, text: &str, chunk_size: usize) {
        for chunk in text.as_bytes().chunks(chunk_size.max(1)) {
            self.push_bytes(chunk);
        }
    }

    pub fn push_shot(&mut self, frame: &ShotFrame) {
        self.push_text(&frame.encode());
    }

    pub fn push_status(&mut self, status: &StatusFrame) {
        self.push_text(&status.encode());
    }

    pub fn is_exhausted(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl ChunkSource for MockDevice {
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, DeviceError> {
        Ok(self.chunks.pop_front())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
