//! Ground interaction: bounce (restitution + friction) and roll.

use serde::{Deserialize, Serialize};

use super::trajectory::BallState;
use super::{GRAVITY_MPS2, Vec3};

/// Landing surface. Read-only property table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    #[default]
    Fairway,
    Rough,
    Green,
    Bunker,
}

/// Per-surface constants: coefficient of restitution (vertical), sliding
/// friction, and rolling resistance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceProps {
    pub cor: f64,
    pub friction: f64,
    pub rolling_resistance: f64,
}

impl Surface {
    pub fn props(self) -> SurfaceProps {
        match self {
            Surface::Fairway => SurfaceProps { cor: 0.60, friction: 0.50, rolling_resistance: 0.10 },
            Surface::Rough => SurfaceProps { cor: 0.30, friction: 0.70, rolling_resistance: 0.30 },
            Surface::Green => SurfaceProps { cor: 0.40, friction: 0.30, rolling_resistance: 0.05 },
            Surface::Bunker => SurfaceProps { cor: 0.20, friction: 0.80, rolling_resistance: 0.50 },
        }
    }
}

/// Bounces past this count force the transition to rolling.
pub const MAX_BOUNCES: u32 = 5;
/// Rebound speeds below this (m/s) transition to rolling.
const ROLL_TRANSITION_SPEED_MPS: f64 = 1.0;
/// Horizontal speeds below this (m/s) stop the ball.
const STOP_SPEED_MPS: f64 = 0.1;
/// Height the ball is lifted to after a bounce so the ground contact does
/// not immediately re-trigger.
const BOUNCE_LIFT_M: f64 = 0.001;
/// Spin retention: spins scale by `1 − this × (Δv_t/|v_t|)`, i.e.
/// proportionally to the tangential friction impulse. Tunable.
const SPIN_BOUNCE_LOSS: f64 = 0.4;
/// Rolling deceleration contributed per rpm of back spin (m/s²). Tunable.
pub const ROLL_SPIN_ACCEL_PER_RPM: f64 = 1.0e-4;
/// Cap on the spin contribution to rolling deceleration (m/s²).
const ROLL_SPIN_ACCEL_CAP: f64 = 0.3;

/// What the ball is doing after a bounce impulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceOutcome {
    /// Rebounded; still airborne.
    Airborne,
    /// Too little rebound (or too many bounces); now rolling.
    Rolling,
}

/// Apply one bounce impulse in place. `state.vel.y` must be ≤ 0 (incoming).
pub fn bounce(state: &mut BallState, props: &SurfaceProps, bounce_count: u32) -> BounceOutcome {
    let v_in = state.vel.y.min(0.0);
    let v_out = -props.cor * v_in;

    // Friction eats tangential speed, capped at stopping the slide outright.
    let tangential = state.vel.horizontal();
    let t_mag = tangential.norm();
    let dv = (props.friction * v_in.abs()).min(t_mag);
    let tangential = if t_mag > 1e-9 {
        tangential.scale((t_mag - dv) / t_mag)
    } else {
        Vec3::ZERO
    };

    // Spin loss proportional to the friction impulse.
    if t_mag > 1e-9 {
        let keep = (1.0 - SPIN_BOUNCE_LOSS * dv / t_mag).max(0.0);
        state.back_rpm *= keep;
        state.side_rpm *= keep;
    }

    state.pos.y = BOUNCE_LIFT_M;
    state.vel = Vec3::new(tangential.x, v_out, tangential.z);

    if v_out < ROLL_TRANSITION_SPEED_MPS || bounce_count >= MAX_BOUNCES {
        state.vel.y = 0.0;
        state.pos.y = 0.0;
        BounceOutcome::Rolling
    } else {
        BounceOutcome::Airborne
    }
}

/// Advance one rolling step of `dt` seconds. Returns `true` once stopped.
pub fn roll_step(state: &mut BallState, props: &SurfaceProps, dt: f64) -> bool {
    let hvel = state.vel.horizontal();
    let speed = hvel.norm();
    if speed < STOP_SPEED_MPS {
        state.vel = Vec3::ZERO;
        return true;
    }

    // Back spin bites into the turf and adds drag; top spin releases some.
    let spin_term = (state.back_rpm * ROLL_SPIN_ACCEL_PER_RPM)
        .clamp(-ROLL_SPIN_ACCEL_CAP, ROLL_SPIN_ACCEL_CAP);
    let decel = (props.rolling_resistance * GRAVITY_MPS2).max(0.5) + spin_term;

    let new_speed = (speed - decel * dt).max(0.0);
    state.vel = hvel.scale(new_speed / speed);
    state.pos = state.pos + state.vel.scale(dt);
    state.back_rpm *= 1.0 - 0.01 * dt;
    state.side_rpm *= 1.0 - 0.01 * dt;
    state.t += dt;

    if new_speed < STOP_SPEED_MPS {
        state.vel = Vec3::ZERO;
        return true;
    }
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming(vx: f64, vy: f64) -> BallState {
        BallState {
            pos: Vec3::new(100.0, 0.0, 0.0),
            vel: Vec3::new(vx, vy, 0.0),
            back_rpm: 3000.0,
            side_rpm: 0.0,
            t: 5.0,
        }
    }

    #[test]
    fn surface_table() {
        let fw = Surface::Fairway.props();
        assert_eq!((fw.cor, fw.friction, fw.rolling_resistance), (0.60, 0.50, 0.10));
        let gr = Surface::Green.props();
        assert_eq!((gr.cor, gr.friction, gr.rolling_resistance), (0.40, 0.30, 0.05));
    }

    #[test]
    fn bounce_reflects_normal_with_cor() {
        let mut s = incoming(20.0, -10.0);
        let out = bounce(&mut s, &Surface::Fairway.props(), 1);
        assert_eq!(out, BounceOutcome::Airborne);
        assert!((s.vel.y - 6.0).abs() < 1e-9); // 0.60 × 10
        assert!((s.pos.y - 0.001).abs() < 1e-12);
    }

    #[test]
    fn bounce_friction_reduces_tangential_speed_and_spin() {
        let mut s = incoming(20.0, -10.0);
        bounce(&mut s, &Surface::Fairway.props(), 1);
        // μ|v_n| = 5 removed from 20.
        assert!((s.vel.x - 15.0).abs() < 1e-9);
        assert!(s.back_rpm < 3000.0);
    }

    #[test]
    fn bounce_friction_capped_at_tangential_speed() {
        let mut s = incoming(2.0, -10.0);
        bounce(&mut s, &Surface::Bunker.props(), 1);
        // μ|v_n| = 8 exceeds |v_t| = 2: the slide stops, never reverses.
        assert!(s.vel.x.abs() < 1e-9);
    }

    #[test]
    fn weak_rebound_transitions_to_rolling() {
        let mut s = incoming(10.0, -1.0);
        let out = bounce(&mut s, &Surface::Fairway.props(), 1);
        assert_eq!(out, BounceOutcome::Rolling);
        assert_eq!(s.vel.y, 0.0);
    }

    #[test]
    fn bounce_cap_forces_rolling() {
        let mut s = incoming(10.0, -10.0);
        let out = bounce(&mut s, &Surface::Fairway.props(), MAX_BOUNCES);
        assert_eq!(out, BounceOutcome::Rolling);
    }

    #[test]
    fn roll_decelerates_to_stop() {
        let props = Surface::Green.props();
        let mut s = incoming(3.0, 0.0);
        s.vel.y = 0.0;
        let mut steps = 0;
        while !roll_step(&mut s, &props, 0.01) {
            steps += 1;
            assert!(steps < 10_000, "roll failed to stop");
        }
        assert_eq!(s.vel, Vec3::ZERO);
        assert!(s.pos.x > 100.0, "ball should have rolled forward");
    }

    #[test]
    fn backspin_shortens_roll() {
        let props = Surface::Fairway.props();
        let mut spinning = incoming(3.0, 0.0);
        spinning.vel.y = 0.0;
        let mut flat = spinning;
        flat.back_rpm = 0.0;

        while !roll_step(&mut spinning, &props, 0.01) {}
        while !roll_step(&mut flat, &props, 0.01) {}
        assert!(spinning.pos.x < flat.pos.x);
    }
}
