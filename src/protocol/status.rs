//! Device status messages (`0M`).

use serde::Serialize;

use crate::codec;

const KEY_FLAGS: &str = "FLAGS";
const KEY_BALLS: &str = "BALLS";

/// Flags value the device reports when all subsystems are up.
pub const FLAGS_READY: u32 = 7;

/// Parsed `0M` message. Sent unsolicited whenever the device state
/// changes, including mid-shot (see [`crate::frame`] for how that
/// interrupts a `0H` transmission).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusFrame {
    /// Subsystem readiness bitfield; `7` means fully ready.
    pub flags: u32,
    /// Number of balls the cameras currently see.
    pub balls: u32,
}

impl StatusFrame {
    /// Missing or unparseable fields default to zero; a status message is
    /// never rejected outright.
    pub fn decode(lines: &[String]) -> Self {
        let mut flags = 0;
        let mut balls = 0;
        for line in lines.iter().skip(1) {
            let Some((key, value)) = codec::split_kv(line) else {
                continue;
            };
            match key {
                KEY_FLAGS => {
                    flags = codec::read_i64(value)
                        .and_then(|v| u32::try_from(v).ok())
                        .unwrap_or(0);
                }
                KEY_BALLS => {
                    balls = codec::read_i64(value)
                        .and_then(|v| u32::try_from(v).ok())
                        .unwrap_or(0);
                }
                _ => {}
            }
        }
        Self { flags, balls }
    }

    /// Encode as complete wire text (including the `\n\t` terminator).
    pub fn encode(&self) -> String {
        format!("0M\n{KEY_FLAGS}={}\n{KEY_BALLS}={}\n\t", self.flags, self.balls)
    }

    /// Device is ready to track a shot.
    pub fn ready(&self) -> bool {
        self.flags == FLAGS_READY
    }

    /// A ball is teed and detected.
    pub fn ball_detected(&self) -> bool {
        self.balls > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ready_with_ball() {
        let status = StatusFrame::decode(&lines(&["0M", "FLAGS=7", "BALLS=1"]));
        assert!(status.ready());
        assert!(status.ball_detected());
    }

    #[test]
    fn partial_flags_not_ready() {
        let status = StatusFrame::decode(&lines(&["0M", "FLAGS=3", "BALLS=0"]));
        assert!(!status.ready());
        assert!(!status.ball_detected());
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let status = StatusFrame::decode(&lines(&["0M"]));
        assert_eq!(status, StatusFrame { flags: 0, balls: 0 });
    }

    #[test]
    fn encode_decode_round_trip() {
        let status = StatusFrame { flags: 7, balls: 2 };
        let wire = status.encode();
        let lines: Vec<String> = wire
            .trim_end_matches('\t')
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(StatusFrame::decode(&lines), status);
    }
}
