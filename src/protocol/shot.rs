//! Shot data messages (`0H`).

use serde::Serialize;

use crate::codec;
use crate::error::{ProtocolError, Result};

// ---------------------------------------------------------------------------
// Wire keys
// ---------------------------------------------------------------------------

const KEY_SHOT_ID: &str = "SHOT_ID";
const KEY_MSEC: &str = "MSEC_SINCE_CONTACT";
const KEY_SPEED: &str = "SPEED_MPH";
const KEY_ELEVATION: &str = "ELEVATION_DEG";
const KEY_AZIMUTH: &str = "AZIMUTH_DEG";
const KEY_TOTAL_SPIN: &str = "SPIN_RPM";
const KEY_BACK_SPIN: &str = "BACK_RPM";
const KEY_SIDE_SPIN: &str = "SIDE_RPM";
const KEY_HMT: &str = "HMT";
const KEY_CLUB_SPEED: &str = "CLUB_MPH";
const KEY_PATH_H: &str = "PATH_H_DEG";
const KEY_PATH_V: &str = "PATH_V_DEG";
const KEY_FACE_TO_TARGET: &str = "FACE_TO_TARGET_DEG";
const KEY_LIE: &str = "LIE_DEG";
const KEY_LOFT: &str = "LOFT_DEG";

// ---------------------------------------------------------------------------
// 0H — shot data
// ---------------------------------------------------------------------------

/// Club (HMT) fields of a shot frame. Present only when the head
/// measurement add-on reported on this shot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ClubFrame {
    /// Club head speed (mph)
    pub club_speed_mph: Option<f64>,
    /// Horizontal path (deg, positive = in-to-out)
    pub path_h_deg: Option<f64>,
    /// Vertical path / angle of attack (deg)
    pub path_v_deg: Option<f64>,
    /// Face angle relative to target (deg)
    pub face_to_target_deg: Option<f64>,
    /// Lie (deg)
    pub lie_deg: Option<f64>,
    /// Dynamic loft (deg)
    pub loft_deg: Option<f64>,
}

impl ClubFrame {
    pub fn is_empty(&self) -> bool {
        self.club_speed_mph.is_none()
            && self.path_h_deg.is_none()
            && self.path_v_deg.is_none()
            && self.face_to_target_deg.is_none()
            && self.lie_deg.is_none()
            && self.loft_deg.is_none()
    }
}

/// Parsed `0H` message. One per transmission; the device sends up to two
/// transmissions per shot (preliminary, then refined) sharing a `shot_id`.
///
/// Every metric is optional on the wire: an unparseable value drops that
/// field only, and unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShotFrame {
    /// Device-assigned shot identifier (positive).
    pub shot_id: u32,
    /// Milliseconds since club contact at transmission time. Distinguishes
    /// preliminary (< 500) from refined transmissions.
    pub msec_since_contact: Option<u32>,
    /// Ball speed (mph)
    pub ball_speed_mph: Option<f64>,
    /// Vertical launch angle / elevation (deg)
    pub vla_deg: Option<f64>,
    /// Horizontal launch angle / azimuth (deg, positive = right)
    pub hla_deg: Option<f64>,
    /// Total spin (rpm)
    pub total_spin_rpm: Option<f64>,
    /// Back spin (rpm)
    pub back_spin_rpm: Option<f64>,
    /// Side spin (rpm, positive = slice spin)
    pub side_spin_rpm: Option<f64>,
    /// Head-measurement data reported for this shot; club fields are
    /// required for completeness when set.
    pub has_hmt: bool,
    pub club: ClubFrame,
}

impl ShotFrame {
    pub fn decode(lines: &[String]) -> Result<Self> {
        let mut shot_id: Option<i64> = None;
        let mut frame = Self {
            shot_id: 0,
            msec_since_contact: None,
            ball_speed_mph: None,
            vla_deg: None,
            hla_deg: None,
            total_spin_rpm: None,
            back_spin_rpm: None,
            side_spin_rpm: None,
            has_hmt: false,
            club: ClubFrame::default(),
        };

        for line in lines.iter().skip(1) {
            let Some((key, value)) = codec::split_kv(line) else {
                continue;
            };
            match key {
                KEY_SHOT_ID => shot_id = codec::read_i64(value),
                KEY_MSEC => {
                    frame.msec_since_contact = codec::read_i64(value)
                        .and_then(|v| u32::try_from(v).ok());
                }
                KEY_SPEED => frame.ball_speed_mph = codec::read_f64(value),
                KEY_ELEVATION => frame.vla_deg = codec::read_f64(value),
                KEY_AZIMUTH => frame.hla_deg = codec::read_f64(value),
                KEY_TOTAL_SPIN => frame.total_spin_rpm = codec::read_f64(value),
                KEY_BACK_SPIN => frame.back_spin_rpm = codec::read_f64(value),
                KEY_SIDE_SPIN => frame.side_spin_rpm = codec::read_f64(value),
                KEY_HMT => frame.has_hmt = codec::read_flag(value).unwrap_or(false),
                KEY_CLUB_SPEED => frame.club.club_speed_mph = codec::read_f64(value),
                KEY_PATH_H => frame.club.path_h_deg = codec::read_f64(value),
                KEY_PATH_V => frame.club.path_v_deg = codec::read_f64(value),
                KEY_FACE_TO_TARGET => frame.club.face_to_target_deg = codec::read_f64(value),
                KEY_LIE => frame.club.lie_deg = codec::read_f64(value),
                KEY_LOFT => frame.club.loft_deg = codec::read_f64(value),
                _ => {} // unknown keys dropped silently
            }
        }

        match shot_id {
            Some(id) if id > 0 => {
                frame.shot_id = id as u32;
                Ok(frame)
            }
            Some(id) => Err(ProtocolError::InvalidShotId { id }),
            None => Err(ProtocolError::missing_shot_id().with_lines(lines)),
        }
    }

    /// Encode as complete wire text (including the `\n\t` terminator) for
    /// the canonical field set. Fields that are `None` are omitted.
    pub fn encode(&self) -> String {
        let mut out = String::from("0H\n");
        let mut kv = |key: &str, value: String| {
            out.push_str(key);
            out.push('=');
            out.push_str(&value);
            out.push('\n');
        };
        kv(KEY_SHOT_ID, self.shot_id.to_string());
        if let Some(msec) = self.msec_since_contact {
            kv(KEY_MSEC, msec.to_string());
        }
        if let Some(v) = self.ball_speed_mph {
            kv(KEY_SPEED, format!("{v:.1}"));
        }
        if let Some(v) = self.vla_deg {
            kv(KEY_ELEVATION, format!("{v:.1}"));
        }
        if let Some(v) = self.hla_deg {
            kv(KEY_AZIMUTH, format!("{v:.1}"));
        }
        if let Some(v) = self.total_spin_rpm {
            kv(KEY_TOTAL_SPIN, format!("{v:.0}"));
        }
        if let Some(v) = self.back_spin_rpm {
            kv(KEY_BACK_SPIN, format!("{v:.0}"));
        }
        if let Some(v) = self.side_spin_rpm {
            kv(KEY_SIDE_SPIN, format!("{v:.0}"));
        }
        if self.has_hmt {
            kv(KEY_HMT, "1".to_string());
            if let Some(v) = self.club.club_speed_mph {
                kv(KEY_CLUB_SPEED, format!("{v:.1}"));
            }
            if let Some(v) = self.club.path_h_deg {
                kv(KEY_PATH_H, format!("{v:.1}"));
            }
            if let Some(v) = self.club.path_v_deg {
                kv(KEY_PATH_V, format!("{v:.1}"));
            }
            if let Some(v) = self.club.face_to_target_deg {
                kv(KEY_FACE_TO_TARGET, format!("{v:.1}"));
            }
            if let Some(v) = self.club.lie_deg {
                kv(KEY_LIE, format!("{v:.1}"));
            }
            if let Some(v) = self.club.loft_deg {
                kv(KEY_LOFT, format!("{v:.1}"));
            }
        }
        out.push('\t');
        out
    }

    /// Preliminary transmission: observed under 500 ms after contact.
    pub fn is_preliminary(&self) -> bool {
        matches!(self.msec_since_contact, Some(msec) if msec < crate::accumulator::REFINED_CONTACT_MSEC)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn decode_driver_frame() {
        let frame = ShotFrame::decode(&lines(&[
            "0H",
            "SHOT_ID=1",
            "SPEED_MPH=167.0",
            "ELEVATION_DEG=10.9",
            "AZIMUTH_DEG=0.0",
            "SPIN_RPM=2686",
            "BACK_RPM=2686",
            "SIDE_RPM=0",
            "MSEC_SINCE_CONTACT=1000",
        ]))
        .unwrap();
        assert_eq!(frame.shot_id, 1);
        assert_eq!(frame.msec_since_contact, Some(1000));
        assert_eq!(frame.ball_speed_mph, Some(167.0));
        assert_eq!(frame.vla_deg, Some(10.9));
        assert_eq!(frame.hla_deg, Some(0.0));
        assert_eq!(frame.back_spin_rpm, Some(2686.0));
        assert_eq!(frame.side_spin_rpm, Some(0.0));
        assert!(!frame.has_hmt);
        assert!(!frame.is_preliminary());
    }

    #[test]
    fn decode_hmt_frame() {
        let frame = ShotFrame::decode(&lines(&[
            "0H",
            "SHOT_ID=9",
            "SPEED_MPH=120.0",
            "HMT=1",
            "CLUB_MPH=85.3",
            "PATH_H_DEG=-1.2",
            "LOFT_DEG=31.5",
        ]))
        .unwrap();
        assert!(frame.has_hmt);
        assert_eq!(frame.club.club_speed_mph, Some(85.3));
        assert_eq!(frame.club.path_h_deg, Some(-1.2));
        assert_eq!(frame.club.loft_deg, Some(31.5));
        assert_eq!(frame.club.face_to_target_deg, None);
    }

    #[test]
    fn missing_shot_id_is_an_error() {
        assert!(matches!(
            ShotFrame::decode(&lines(&["0H", "SPEED_MPH=167.0"])),
            Err(ProtocolError::MissingShotId { .. })
        ));
    }

    #[test]
    fn non_positive_shot_id_rejected() {
        assert!(matches!(
            ShotFrame::decode(&lines(&["0H", "SHOT_ID=0"])),
            Err(ProtocolError::InvalidShotId { id: 0 })
        ));
        assert!(matches!(
            ShotFrame::decode(&lines(&["0H", "SHOT_ID=-3"])),
            Err(ProtocolError::InvalidShotId { id: -3 })
        ));
    }

    #[test]
    fn bad_value_drops_only_that_field() {
        let frame = ShotFrame::decode(&lines(&[
            "0H",
            "SHOT_ID=2",
            "SPEED_MPH=garbage",
            "BACK_RPM=2650",
        ]))
        .unwrap();
        assert_eq!(frame.ball_speed_mph, None);
        assert_eq!(frame.back_spin_rpm, Some(2650.0));
    }

    #[test]
    fn unknown_keys_ignored() {
        let frame = ShotFrame::decode(&lines(&[
            "0H",
            "SHOT_ID=3",
            "FIRMWARE_WHIM=42",
            "SPEED_MPH=140.0",
        ]))
        .unwrap();
        assert_eq!(frame.ball_speed_mph, Some(140.0));
    }

    #[test]
    fn preliminary_threshold() {
        let mut frame = ShotFrame::decode(&lines(&["0H", "SHOT_ID=4"])).unwrap();
        frame.msec_since_contact = Some(140);
        assert!(frame.is_preliminary());
        frame.msec_since_contact = Some(500);
        assert!(!frame.is_preliminary());
        frame.msec_since_contact = None;
        assert!(!frame.is_preliminary());
    }

    #[test]
    fn encode_decode_round_trip() {
        let frame = ShotFrame {
            shot_id: 7,
            msec_since_contact: Some(1010),
            ball_speed_mph: Some(120.0),
            vla_deg: Some(16.3),
            hla_deg: Some(0.0),
            total_spin_rpm: Some(7108.0),
            back_spin_rpm: Some(7097.0),
            side_spin_rpm: Some(-400.0),
            has_hmt: false,
            club: ClubFrame::default(),
        };
        let wire = frame.encode();
        let lines: Vec<String> = wire
            .trim_end_matches('\t')
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(ShotFrame::decode(&lines).unwrap(), frame);
    }
}
