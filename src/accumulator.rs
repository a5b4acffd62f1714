//! Per-shot accumulation, completion policy, and validation.
//!
//! The GC2 sends up to two `0H` transmissions per shot: a preliminary one
//! within half a second of contact (ball data only, spin still being
//! measured) and a refined one once spin converges. The refined
//! transmission may never arrive (a status event can preempt it), so the
//! accumulator holds a deadline per shot and salvages what it has when the
//! spin wait expires.
//!
//! Once a shot id has produced a [`ValidatedShot`], every later frame for
//! that id is rejected as a duplicate; nothing is ever emitted twice.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::protocol::{ClubFrame, ShotFrame};

/// `MSEC_SINCE_CONTACT` at or above which a transmission is refined.
/// Below it the device is still integrating spin. Heuristic carried over
/// from the device's observed two-phase timing.
pub const REFINED_CONTACT_MSEC: u32 = 500;

/// How long to wait for a refined transmission, measured from the first
/// frame of a shot id.
pub const SPIN_WAIT: Duration = Duration::from_millis(1500);

/// Upper plausibility bound for ball speed.
pub const SPEED_MAX_MPH: f64 = 250.0;

/// Back spin value the device reports when its spin measurement failed.
pub const SPIN_ERROR_SENTINEL_RPM: f64 = 2222.0;

/// Launch angles assumed when a salvaged shot never reported them.
const SALVAGE_DEFAULT_VLA_DEG: f64 = 20.0;
const SALVAGE_DEFAULT_HLA_DEG: f64 = 0.0;

// ---------------------------------------------------------------------------
// ValidatedShot
// ---------------------------------------------------------------------------

/// A shot that cleared completion policy and validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedShot {
    /// Device-assigned shot identifier.
    pub shot_id: u32,
    /// Process-wide sequence number, assigned by the router at dispatch.
    pub shot_number: u64,
    /// Ball speed (mph)
    pub ball_speed_mph: f64,
    /// Vertical launch angle (deg)
    pub vla_deg: f64,
    /// Horizontal launch angle (deg, positive = right)
    pub hla_deg: f64,
    /// Total spin (rpm); backfilled from back/side when the device omits it
    pub total_spin_rpm: f64,
    /// Back spin (rpm)
    pub back_spin_rpm: f64,
    /// Side spin (rpm, positive = slice spin)
    pub side_spin_rpm: f64,
    /// `atan2(side, back)` in degrees; zero when back spin is zero
    pub spin_axis_deg: f64,
    /// Club data, present when the shot carried HMT fields
    pub club: Option<ClubFrame>,
    /// Emitted by salvage (spin wait expired before a complete refined frame)
    pub incomplete: bool,
    /// Wall-clock acceptance time
    pub received_at: DateTime<Utc>,
}

/// Why a shot was discarded instead of emitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, thiserror::Error)]
pub enum RejectReason {
    #[error("back and side spin both zero")]
    ZeroSpin,
    #[error("back spin reads the device error sentinel ({SPIN_ERROR_SENTINEL_RPM} rpm)")]
    SpinSentinel,
    #[error("ball speed {0} mph outside (0, {SPEED_MAX_MPH}]")]
    SpeedOutOfRange(f64),
    #[error("shot id already emitted")]
    DuplicateShotId,
}

/// One result of feeding the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum ShotOutcome {
    Validated(ValidatedShot),
    Rejected { shot_id: u32, reason: RejectReason },
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Fields merged across the transmissions of one shot id.
struct Pending {
    merged: ShotFrame,
    first_seen: Instant,
}

/// Per-shot-id state machine. Owned by the device read loop; `tick()` is
/// driven by that loop's read timeout, so deadlines fire within ~100 ms of
/// their nominal time.
pub struct ShotAccumulator {
    pending: HashMap<u32, Pending>,
    emitted: HashSet<u32>,
    reject_zero_spin: bool,
}

impl ShotAccumulator {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            emitted: HashSet::new(),
            reject_zero_spin: true,
        }
    }

    /// Disable the both-spins-zero rejection (the `device.reject_zero_spin`
    /// setting). The error-sentinel and speed checks always apply.
    pub fn with_reject_zero_spin(mut self, reject: bool) -> Self {
        self.reject_zero_spin = reject;
        self
    }

    /// Feed one `0H` frame (complete or salvage candidate). Returns any
    /// outcomes produced, in order.
    pub fn handle_frame(&mut self, frame: ShotFrame, now: Instant) -> Vec<ShotOutcome> {
        let shot_id = frame.shot_id;
        if self.emitted.contains(&shot_id) {
            debug!(shot_id, "dropping frame for already-emitted shot");
            return vec![ShotOutcome::Rejected {
                shot_id,
                reason: RejectReason::DuplicateShotId,
            }];
        }

        let preliminary = frame.is_preliminary();
        let entry = self.pending.entry(shot_id).or_insert_with(|| Pending {
            merged: ShotFrame {
                shot_id,
                msec_since_contact: None,
                ball_speed_mph: None,
                vla_deg: None,
                hla_deg: None,
                total_spin_rpm: None,
                back_spin_rpm: None,
                side_spin_rpm: None,
                has_hmt: false,
                club: ClubFrame::default(),
            },
            first_seen: now,
        });
        merge_frame(&mut entry.merged, &frame);

        // Preliminary transmissions only seed fields for the refined one.
        if preliminary {
            return Vec::new();
        }

        if is_complete(&entry.merged) {
            let merged = self.pending.remove(&shot_id).unwrap().merged;
            vec![self.finalize(merged, false)]
        } else {
            // Refined but missing required fields: hold for the spin wait.
            Vec::new()
        }
    }

    /// Fire any spin-wait deadlines that have expired by `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<ShotOutcome> {
        let mut due: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.first_seen) >= SPIN_WAIT)
            .map(|(&id, _)| id)
            .collect();
        due.sort_unstable();

        let mut outcomes = Vec::new();
        for shot_id in due {
            let mut merged = self.pending.remove(&shot_id).unwrap().merged;
            if merged.ball_speed_mph.is_none() {
                debug!(shot_id, "spin wait expired with no ball speed, discarding");
                continue;
            }
            warn!(shot_id, "spin wait expired, salvaging partial shot");
            if merged.vla_deg.is_none() {
                merged.vla_deg = Some(SALVAGE_DEFAULT_VLA_DEG);
            }
            if merged.hla_deg.is_none() {
                merged.hla_deg = Some(SALVAGE_DEFAULT_HLA_DEG);
            }
            outcomes.push(self.finalize(merged, true));
        }
        outcomes
    }

    /// Shot ids currently awaiting a refined transmission.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop all in-flight accumulation (device session ended).
    pub fn reset_pending(&mut self) {
        self.pending.clear();
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn finalize(&mut self, merged: ShotFrame, salvage: bool) -> ShotOutcome {
        let shot_id = merged.shot_id;
        match validate(&merged, salvage, salvage || !self.reject_zero_spin) {
            Ok(shot) => {
                self.emitted.insert(shot_id);
                ShotOutcome::Validated(shot)
            }
            Err(reason) => {
                warn!(shot_id, %reason, "shot rejected");
                ShotOutcome::Rejected { shot_id, reason }
            }
        }
    }
}

impl Default for ShotAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Merge / completeness / validation
// ---------------------------------------------------------------------------

/// Later transmissions win field-by-field; earlier values survive only
/// where the later frame is silent.
fn merge_frame(merged: &mut ShotFrame, frame: &ShotFrame) {
    merged.msec_since_contact = frame.msec_since_contact.or(merged.msec_since_contact);
    merged.ball_speed_mph = frame.ball_speed_mph.or(merged.ball_speed_mph);
    merged.vla_deg = frame.vla_deg.or(merged.vla_deg);
    merged.hla_deg = frame.hla_deg.or(merged.hla_deg);
    merged.total_spin_rpm = frame.total_spin_rpm.or(merged.total_spin_rpm);
    merged.back_spin_rpm = frame.back_spin_rpm.or(merged.back_spin_rpm);
    merged.side_spin_rpm = frame.side_spin_rpm.or(merged.side_spin_rpm);
    merged.has_hmt |= frame.has_hmt;
    let club = &mut merged.club;
    club.club_speed_mph = frame.club.club_speed_mph.or(club.club_speed_mph);
    club.path_h_deg = frame.club.path_h_deg.or(club.path_h_deg);
    club.path_v_deg = frame.club.path_v_deg.or(club.path_v_deg);
    club.face_to_target_deg = frame.club.face_to_target_deg.or(club.face_to_target_deg);
    club.lie_deg = frame.club.lie_deg.or(club.lie_deg);
    club.loft_deg = frame.club.loft_deg.or(club.loft_deg);
}

/// Complete: ball speed plus at least one spin component; HMT shots also
/// need a club speed before they can go out.
fn is_complete(frame: &ShotFrame) -> bool {
    let spin = frame.back_spin_rpm.is_some() || frame.side_spin_rpm.is_some();
    let club = !frame.has_hmt || frame.club.club_speed_mph.is_some();
    frame.ball_speed_mph.is_some() && spin && club
}

fn validate(
    frame: &ShotFrame,
    salvage: bool,
    allow_zero_spin: bool,
) -> Result<ValidatedShot, RejectReason> {
    let ball_speed = frame.ball_speed_mph.unwrap_or(0.0);
    if ball_speed <= 0.0 || ball_speed > SPEED_MAX_MPH {
        return Err(RejectReason::SpeedOutOfRange(ball_speed));
    }

    let back = frame.back_spin_rpm.unwrap_or(0.0);
    let side = frame.side_spin_rpm.unwrap_or(0.0);
    if back == SPIN_ERROR_SENTINEL_RPM {
        return Err(RejectReason::SpinSentinel);
    }
    // A salvaged shot legitimately has unmeasured (zero) spin.
    if !allow_zero_spin && back == 0.0 && side == 0.0 {
        return Err(RejectReason::ZeroSpin);
    }

    let spin_axis_deg = if back == 0.0 {
        0.0
    } else {
        side.atan2(back).to_degrees()
    };
    let total = frame
        .total_spin_rpm
        .unwrap_or_else(|| (back * back + side * side).sqrt());

    Ok(ValidatedShot {
        shot_id: frame.shot_id,
        shot_number: 0,
        ball_speed_mph: ball_speed,
        vla_deg: frame.vla_deg.unwrap_or(0.0),
        hla_deg: frame.hla_deg.unwrap_or(0.0),
        total_spin_rpm: total,
        back_spin_rpm: back,
        side_spin_rpm: side,
        spin_axis_deg,
        club: (frame.has_hmt && !frame.club.is_empty()).then_some(frame.club),
        incomplete: salvage,
        received_at: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(shot_id: u32) -> ShotFrame {
        ShotFrame {
            shot_id,
            msec_since_contact: Some(1000),
            ball_speed_mph: Some(167.0),
            vla_deg: Some(10.9),
            hla_deg: Some(0.0),
            total_spin_rpm: Some(2686.0),
            back_spin_rpm: Some(2686.0),
            side_spin_rpm: Some(0.0),
            has_hmt: false,
            club: ClubFrame::default(),
        }
    }

    fn expect_validated(outcomes: Vec<ShotOutcome>) -> ValidatedShot {
        match outcomes.as_slice() {
            [ShotOutcome::Validated(shot)] => shot.clone(),
            other => panic!("expected one Validated, got {other:?}"),
        }
    }

    #[test]
    fn clean_refined_frame_emits_immediately() {
        let mut acc = ShotAccumulator::new();
        let shot = expect_validated(acc.handle_frame(frame(1), Instant::now()));
        assert_eq!(shot.shot_id, 1);
        assert_eq!(shot.ball_speed_mph, 167.0);
        assert_eq!(shot.vla_deg, 10.9);
        assert_eq!(shot.back_spin_rpm, 2686.0);
        assert!(!shot.incomplete);
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn preliminary_then_refined_emits_once_with_refined_spin() {
        let mut acc = ShotAccumulator::new();
        let t0 = Instant::now();

        let mut prelim = frame(3);
        prelim.msec_since_contact = Some(180);
        prelim.back_spin_rpm = Some(3000.0);
        assert!(acc.handle_frame(prelim, t0).is_empty());
        assert_eq!(acc.pending_len(), 1);

        let mut refined = frame(3);
        refined.msec_since_contact = Some(1010);
        refined.back_spin_rpm = Some(2650.0);
        let shot = expect_validated(acc.handle_frame(refined, t0 + Duration::from_millis(800)));
        assert_eq!(shot.back_spin_rpm, 2650.0);
        assert!(!shot.incomplete);

        // Nothing further for this id, even on later ticks.
        assert!(acc.tick(t0 + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn preliminary_seeds_fields_refined_lacks() {
        let mut acc = ShotAccumulator::new();
        let t0 = Instant::now();

        let mut prelim = frame(4);
        prelim.msec_since_contact = Some(140);
        prelim.vla_deg = Some(12.5);
        assert!(acc.handle_frame(prelim, t0).is_empty());

        let mut refined = frame(4);
        refined.msec_since_contact = Some(1000);
        refined.vla_deg = None;
        let shot = expect_validated(acc.handle_frame(refined, t0));
        assert_eq!(shot.vla_deg, 12.5);
    }

    #[test]
    fn salvage_on_timeout_with_speed_only() {
        let mut acc = ShotAccumulator::new();
        let t0 = Instant::now();

        let partial = ShotFrame {
            shot_id: 5,
            msec_since_contact: None,
            ball_speed_mph: Some(140.0),
            vla_deg: None,
            hla_deg: None,
            total_spin_rpm: None,
            back_spin_rpm: None,
            side_spin_rpm: None,
            has_hmt: false,
            club: ClubFrame::default(),
        };
        assert!(acc.handle_frame(partial, t0).is_empty());

        // Before the deadline nothing fires.
        assert!(acc.tick(t0 + Duration::from_millis(1400)).is_empty());

        let shot = expect_validated(acc.tick(t0 + SPIN_WAIT));
        assert!(shot.incomplete);
        assert_eq!(shot.ball_speed_mph, 140.0);
        assert_eq!(shot.vla_deg, 20.0);
        assert_eq!(shot.hla_deg, 0.0);
        assert_eq!(shot.back_spin_rpm, 0.0);
        assert_eq!(shot.spin_axis_deg, 0.0);
    }

    #[test]
    fn timeout_without_speed_discards_silently() {
        let mut acc = ShotAccumulator::new();
        let t0 = Instant::now();
        let mut partial = frame(6);
        partial.msec_since_contact = Some(100);
        partial.ball_speed_mph = None;
        assert!(acc.handle_frame(partial, t0).is_empty());
        assert!(acc.tick(t0 + SPIN_WAIT).is_empty());
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn zero_spin_rejected() {
        let mut acc = ShotAccumulator::new();
        let mut f = frame(7);
        f.back_spin_rpm = Some(0.0);
        f.side_spin_rpm = Some(0.0);
        assert_eq!(
            acc.handle_frame(f, Instant::now()),
            vec![ShotOutcome::Rejected {
                shot_id: 7,
                reason: RejectReason::ZeroSpin,
            }]
        );
    }

    #[test]
    fn sentinel_spin_rejected() {
        let mut acc = ShotAccumulator::new();
        let mut f = frame(8);
        f.back_spin_rpm = Some(2222.0);
        assert_eq!(
            acc.handle_frame(f, Instant::now()),
            vec![ShotOutcome::Rejected {
                shot_id: 8,
                reason: RejectReason::SpinSentinel,
            }]
        );
    }

    #[test]
    fn speed_bounds_rejected() {
        let mut acc = ShotAccumulator::new();
        for (id, speed) in [(9, 0.0), (10, -5.0), (11, 250.1)] {
            let mut f = frame(id);
            f.ball_speed_mph = Some(speed);
            assert!(matches!(
                acc.handle_frame(f, Instant::now()).as_slice(),
                [ShotOutcome::Rejected {
                    reason: RejectReason::SpeedOutOfRange(_),
                    ..
                }]
            ));
        }
        // Exactly 250 is in range.
        let mut f = frame(12);
        f.ball_speed_mph = Some(250.0);
        expect_validated(acc.handle_frame(f, Instant::now()));
    }

    #[test]
    fn duplicate_after_emission_rejected() {
        let mut acc = ShotAccumulator::new();
        expect_validated(acc.handle_frame(frame(13), Instant::now()));
        assert_eq!(
            acc.handle_frame(frame(13), Instant::now()),
            vec![ShotOutcome::Rejected {
                shot_id: 13,
                reason: RejectReason::DuplicateShotId,
            }]
        );
    }

    #[test]
    fn spin_axis_sign_tracks_side_spin() {
        let mut acc = ShotAccumulator::new();

        let mut draw = frame(14);
        draw.side_spin_rpm = Some(-400.0);
        draw.back_spin_rpm = Some(7097.0);
        draw.total_spin_rpm = None;
        let shot = expect_validated(acc.handle_frame(draw, Instant::now()));
        assert!(shot.spin_axis_deg < 0.0);
        let expected = (7097.0f64 * 7097.0 + 400.0 * 400.0).sqrt();
        assert!((shot.total_spin_rpm - expected).abs() < 1e-9);

        let mut fade = frame(15);
        fade.side_spin_rpm = Some(400.0);
        let shot = expect_validated(acc.handle_frame(fade, Instant::now()));
        assert!(shot.spin_axis_deg > 0.0);
    }

    #[test]
    fn hmt_shot_waits_for_club_speed() {
        let mut acc = ShotAccumulator::new();
        let t0 = Instant::now();

        let mut f = frame(16);
        f.has_hmt = true;
        assert!(acc.handle_frame(f, t0).is_empty(), "club data still due");

        let mut follow = frame(16);
        follow.has_hmt = true;
        follow.club.club_speed_mph = Some(112.0);
        let shot = expect_validated(acc.handle_frame(follow, t0));
        let club = shot.club.expect("club data");
        assert_eq!(club.club_speed_mph, Some(112.0));
    }
}
