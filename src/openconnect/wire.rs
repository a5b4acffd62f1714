//! Open Connect message types.
//!
//! Key spellings are fixed by the receiving simulator and deliberately
//! inconsistent (`DeviceID`, `APIversion`, `HLA`); the serde renames below
//! are the contract.

use serde::{Deserialize, Serialize};

use crate::accumulator::ValidatedShot;
use crate::protocol::ClubFrame;

/// Protocol version string sent with every message.
pub const API_VERSION: &str = "1";
/// Units string sent with every message.
pub const UNITS: &str = "Yards";

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Ball launch data as the simulator expects it (mph / rpm / deg).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BallData {
    pub speed: f64,
    pub spin_axis: f64,
    pub total_spin: f64,
    pub back_spin: f64,
    pub side_spin: f64,
    #[serde(rename = "HLA")]
    pub hla: f64,
    #[serde(rename = "VLA")]
    pub vla: f64,
}

impl From<&ValidatedShot> for BallData {
    fn from(shot: &ValidatedShot) -> Self {
        Self {
            speed: shot.ball_speed_mph,
            spin_axis: shot.spin_axis_deg,
            total_spin: shot.total_spin_rpm,
            back_spin: shot.back_spin_rpm,
            side_spin: shot.side_spin_rpm,
            hla: shot.hla_deg,
            vla: shot.vla_deg,
        }
    }
}

/// Club data. The GC2 HMT reports a subset; fields it cannot measure are
/// sent as zero, which the simulator treats as "not measured".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClubData {
    pub speed: f64,
    pub angle_of_attack: f64,
    pub face_to_target: f64,
    pub lie: f64,
    pub loft: f64,
    pub path: f64,
    pub speed_at_impact: f64,
    pub vertical_face_impact: f64,
    pub horizontal_face_impact: f64,
    pub closure_rate: f64,
}

impl From<&ClubFrame> for ClubData {
    fn from(club: &ClubFrame) -> Self {
        let speed = club.club_speed_mph.unwrap_or(0.0);
        Self {
            speed,
            angle_of_attack: club.path_v_deg.unwrap_or(0.0),
            face_to_target: club.face_to_target_deg.unwrap_or(0.0),
            lie: club.lie_deg.unwrap_or(0.0),
            loft: club.loft_deg.unwrap_or(0.0),
            path: club.path_h_deg.unwrap_or(0.0),
            speed_at_impact: speed,
            vertical_face_impact: 0.0,
            horizontal_face_impact: 0.0,
            closure_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShotDataOptions {
    pub contains_ball_data: bool,
    pub contains_club_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_monitor_is_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_monitor_ball_detected: Option<bool>,
    pub is_heart_beat: bool,
}

/// One outbound message. Three shapes share it (see [`ShotDataOptions`]):
/// shots expect a response, heartbeats and status updates do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotMessage {
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    #[serde(rename = "Units")]
    pub units: String,
    #[serde(rename = "ShotNumber")]
    pub shot_number: u64,
    #[serde(rename = "APIversion")]
    pub api_version: String,
    #[serde(rename = "BallData", skip_serializing_if = "Option::is_none")]
    pub ball_data: Option<BallData>,
    #[serde(rename = "ClubData", skip_serializing_if = "Option::is_none")]
    pub club_data: Option<ClubData>,
    #[serde(rename = "ShotDataOptions")]
    pub shot_data_options: ShotDataOptions,
}

impl ShotMessage {
    fn base(device_id: &str, shot_number: u64) -> Self {
        Self {
            device_id: device_id.to_string(),
            units: UNITS.to_string(),
            shot_number,
            api_version: API_VERSION.to_string(),
            ball_data: None,
            club_data: None,
            shot_data_options: ShotDataOptions {
                contains_ball_data: false,
                contains_club_data: false,
                launch_monitor_is_ready: None,
                launch_monitor_ball_detected: None,
                is_heart_beat: false,
            },
        }
    }

    /// A shot message. Expects a response.
    pub fn shot(device_id: &str, shot_number: u64, shot: &ValidatedShot) -> Self {
        let mut msg = Self::base(device_id, shot_number);
        msg.ball_data = Some(BallData::from(shot));
        msg.club_data = shot.club.as_ref().map(ClubData::from);
        msg.shot_data_options.contains_ball_data = true;
        msg.shot_data_options.contains_club_data = msg.club_data.is_some();
        msg
    }

    /// A keepalive. No response expected.
    pub fn heartbeat(device_id: &str, shot_number: u64) -> Self {
        let mut msg = Self::base(device_id, shot_number);
        msg.shot_data_options.is_heart_beat = true;
        msg
    }

    /// A launch-monitor status update. No response expected.
    pub fn status(device_id: &str, shot_number: u64, ready: bool, ball_detected: bool) -> Self {
        let mut msg = Self::base(device_id, shot_number);
        msg.shot_data_options.launch_monitor_is_ready = Some(ready);
        msg.shot_data_options.launch_monitor_ball_detected = Some(ball_detected);
        msg
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A simulator response: `{Code, Message, Player?}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimResponse {
    #[serde(rename = "Code")]
    pub code: u32,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Player", default, skip_serializing_if = "Option::is_none")]
    pub player: Option<serde_json::Value>,
}

impl SimResponse {
    /// 2xx codes indicate success (200 and 201 in practice).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
