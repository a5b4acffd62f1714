//! Flight integration: gravity, drag, Magnus, and wind under classical RK4.

use serde::Serialize;

use super::aero;
use super::{
    BALL_AREA_M2, BALL_MASS_KG, Conditions, GRAVITY_MPS2, Launch, MPH_TO_MPS, RPM_TO_RAD_PER_S,
    Vec3,
};

/// Fixed integration step (s).
pub const DT: f64 = 0.01;

/// Multiplicative spin decay applied once per integration step.
const SPIN_DECAY_PER_STEP: f64 = 1.0 - 0.01 * DT;

/// Wind is zero at and below this height (m).
const WIND_MIN_HEIGHT_M: f64 = 0.03;
/// Roughness length of the wind profile (m); the profile vanishes exactly
/// at the cutoff height.
const WIND_ROUGHNESS_M: f64 = 0.03;
/// Reference (anemometer) height for the configured wind speed (m).
const WIND_REF_HEIGHT_M: f64 = 10.0;

/// Where in its lifecycle a trajectory sample was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Flight,
    Bounce,
    Rolling,
    Stopped,
}

/// Integration state. Positions in meters, velocities in m/s, spins in rpm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallState {
    pub pos: Vec3,
    pub vel: Vec3,
    pub back_rpm: f64,
    pub side_rpm: f64,
    pub t: f64,
}

/// Initial state from launch parameters.
pub fn initial_state(launch: &Launch) -> BallState {
    let v = launch.ball_speed_mph * MPH_TO_MPS;
    let vla = launch.vla_deg.to_radians();
    let hla = launch.hla_deg.to_radians();
    BallState {
        pos: Vec3::ZERO,
        vel: Vec3::new(
            v * vla.cos() * hla.cos(),
            v * vla.sin(),
            v * vla.cos() * hla.sin(),
        ),
        back_rpm: launch.back_spin_rpm,
        side_rpm: launch.side_spin_rpm,
        t: 0.0,
    }
}

/// Force model shared by the flight and bounce phases. Air density and the
/// wind profile are fixed per run.
pub struct FlightModel {
    rho: f64,
    wind_ref_mps: f64,
    wind_dir_rad: f64,
}

impl FlightModel {
    pub fn new(cond: &Conditions) -> Self {
        Self {
            rho: aero::air_density(cond),
            wind_ref_mps: cond.wind_speed_mph.max(0.0) * MPH_TO_MPS,
            wind_dir_rad: cond.wind_dir_deg.to_radians(),
        }
    }

    pub fn air_density(&self) -> f64 {
        self.rho
    }

    /// Wind velocity at height `h`: logarithmic profile referenced to
    /// anemometer height, clamped to `[0, 2·v_ref]`. Direction 0° blows
    /// straight down the target line toward the player (headwind).
    pub fn wind_at(&self, h: f64) -> Vec3 {
        if self.wind_ref_mps <= 0.0 || h <= WIND_MIN_HEIGHT_M {
            return Vec3::ZERO;
        }
        let profile = (h / WIND_ROUGHNESS_M).ln() / (WIND_REF_HEIGHT_M / WIND_ROUGHNESS_M).ln();
        let speed = (self.wind_ref_mps * profile).clamp(0.0, 2.0 * self.wind_ref_mps);
        Vec3::new(
            -speed * self.wind_dir_rad.cos(),
            0.0,
            -speed * self.wind_dir_rad.sin(),
        )
    }

    /// Net acceleration at a given position/velocity/spin.
    fn acceleration(&self, pos: Vec3, vel: Vec3, back_rpm: f64, side_rpm: f64) -> Vec3 {
        let mut acc = Vec3::new(0.0, -GRAVITY_MPS2, 0.0);

        let rel = vel - self.wind_at(pos.y);
        let airspeed = rel.norm();
        if airspeed <= 1e-9 {
            return acc;
        }

        let omega_rpm = (back_rpm * back_rpm + side_rpm * side_rpm).sqrt();
        let s = aero::spin_factor(omega_rpm, airspeed);
        let re = aero::reynolds(airspeed);
        let cd = aero::drag_coefficient(re, s);
        let cl = aero::lift_coefficient(s);

        // F_d = -1/2 ρ |v_r| v_r Cd A
        let drag_k = 0.5 * self.rho * airspeed * BALL_AREA_M2 * cd / BALL_MASS_KG;
        acc = acc + rel.scale(-drag_k);

        // F_m = 1/2 ρ |v_r|² Cl A (ŝ × v̂_r): back spin about +z (for HLA 0),
        // side spin about the vertical, positive side = slice.
        if omega_rpm * RPM_TO_RAD_PER_S > 1e-9 {
            let axis = Vec3::new(0.0, -side_rpm, back_rpm).normalize();
            let magnus_k = 0.5 * self.rho * airspeed * airspeed * BALL_AREA_M2 * cl / BALL_MASS_KG;
            acc = acc + axis.cross(rel.normalize()).scale(magnus_k);
        }

        acc
    }

    /// One RK4 step of `DT`, with per-step spin decay.
    pub fn step(&self, s: &BallState) -> BallState {
        let (p, v) = (s.pos, s.vel);
        let (back, side) = (s.back_rpm, s.side_rpm);

        let a1 = self.acceleration(p, v, back, side);
        let v2 = v + a1.scale(DT / 2.0);
        let a2 = self.acceleration(p + v.scale(DT / 2.0), v2, back, side);
        let v3 = v + a2.scale(DT / 2.0);
        let a3 = self.acceleration(p + v2.scale(DT / 2.0), v3, back, side);
        let v4 = v + a3.scale(DT);
        let a4 = self.acceleration(p + v3.scale(DT), v4, back, side);

        let pos = p + (v + (v2 + v3).scale(2.0) + v4).scale(DT / 6.0);
        let vel = v + (a1 + (a2 + a3).scale(2.0) + a4).scale(DT / 6.0);

        BallState {
            pos,
            vel,
            back_rpm: back * SPIN_DECAY_PER_STEP,
            side_rpm: side * SPIN_DECAY_PER_STEP,
            t: s.t + DT,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
