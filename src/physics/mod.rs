//! Ball-flight physics for the offline (local) mode.
//!
//! Split the way the model splits: [`aero`] for coefficients and air
//! density, [`trajectory`] for the RK4 flight integration, [`ground`] for
//! bounce and roll, and [`engine`] composing them into a [`engine::ShotResult`].
//!
//! Everything is pure `f64` arithmetic with no clock or randomness, so a
//! given launch under given [`Conditions`] is bitwise-reproducible.

pub mod aero;
pub mod engine;
pub mod ground;
pub mod trajectory;

use serde::{Deserialize, Serialize};

use crate::accumulator::ValidatedShot;

pub use engine::{FlightEngine, PhysicsError, ShotResult, ShotSummary, TrajectoryPoint};
pub use ground::Surface;
pub use trajectory::Phase;

// ---------------------------------------------------------------------------
// Physical constants
// ---------------------------------------------------------------------------

/// Golf ball diameter (m).
pub const BALL_DIAMETER_M: f64 = 0.04267;
/// Golf ball radius (m).
pub const BALL_RADIUS_M: f64 = BALL_DIAMETER_M / 2.0;
/// Golf ball mass (kg).
pub const BALL_MASS_KG: f64 = 0.04593;
/// Ball cross-sectional area (m²).
pub const BALL_AREA_M2: f64 = std::f64::consts::PI * BALL_RADIUS_M * BALL_RADIUS_M;
/// Gravitational acceleration (m/s²).
pub const GRAVITY_MPS2: f64 = 9.81;

pub const MPH_TO_MPS: f64 = 0.44704;
pub const M_TO_YD: f64 = 1.0936133;
pub const M_TO_FT: f64 = 3.2808399;
pub const RPM_TO_RAD_PER_S: f64 = std::f64::consts::TAU / 60.0;

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Immutable environment snapshot for a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    pub temp_f: f64,
    pub elevation_ft: f64,
    pub humidity_pct: f64,
    pub pressure_inhg: f64,
    pub wind_speed_mph: f64,
    /// Direction the wind comes from, relative to the target line.
    /// 0° = headwind, 180° = tailwind.
    pub wind_dir_deg: f64,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            temp_f: 70.0,
            elevation_ft: 0.0,
            humidity_pct: 50.0,
            pressure_inhg: 29.92,
            wind_speed_mph: 0.0,
            wind_dir_deg: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

/// Launch parameters the flight model needs from a shot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Launch {
    pub ball_speed_mph: f64,
    pub vla_deg: f64,
    pub hla_deg: f64,
    pub back_spin_rpm: f64,
    pub side_spin_rpm: f64,
}

impl From<&ValidatedShot> for Launch {
    fn from(shot: &ValidatedShot) -> Self {
        Self {
            ball_speed_mph: shot.ball_speed_mph,
            vla_deg: shot.vla_deg,
            hla_deg: shot.hla_deg,
            back_spin_rpm: shot.back_spin_rpm,
            side_spin_rpm: shot.side_spin_rpm,
        }
    }
}

// ---------------------------------------------------------------------------
// Vec3
// ---------------------------------------------------------------------------

/// Minimal 3-vector. Axes: x downrange toward the target, y up, z lateral
/// (positive = right of the target line).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    /// Unit vector, or zero when the norm is numerically zero.
    pub fn normalize(self) -> Self {
        let n = self.norm();
        if n > 1e-12 { self.scale(1.0 / n) } else { Self::ZERO }
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Horizontal (ground-plane) component.
    pub fn horizontal(self) -> Self {
        Self::new(self.x, 0.0, self.z)
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_follows_right_hand_rule() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        let z = Vec3::new(0.0, 0.0, 1.0);
        assert_eq!(x.cross(y), z);
        assert_eq!(z.cross(x), y);
    }

    #[test]
    fn normalize_zero_is_zero() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
    }
}
