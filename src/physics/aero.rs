//! Aerodynamic coefficients and air density.
//!
//! The drag curve is a piecewise-linear fit across the drag crisis: a
//! dimpled ball holds Cd ≈ 0.50 below Re 5×10⁴ and ≈ 0.212 above 1×10⁵,
//! with spin adding a capped increment. Lift follows a quadratic in the
//! spin factor `S = ωr/v`, clamped to the measured ceiling.

use super::{BALL_DIAMETER_M, BALL_RADIUS_M, Conditions, RPM_TO_RAD_PER_S};

/// Kinematic viscosity of air (m²/s).
pub const KINEMATIC_VISCOSITY: f64 = 1.5e-5;

const RE_LOW: f64 = 5.0e4;
const RE_HIGH: f64 = 1.0e5;
const CD_LOW: f64 = 0.500;
const CD_HIGH: f64 = 0.212;
const CD_SPIN_GAIN: f64 = 0.15;
const CD_SPIN_CAP: f64 = 0.4;
const CL_MAX: f64 = 0.305;

/// Reynolds number for the ball at the given airspeed (m/s).
pub fn reynolds(airspeed_mps: f64) -> f64 {
    airspeed_mps * BALL_DIAMETER_M / KINEMATIC_VISCOSITY
}

/// Spin factor `S = ωr/v` from total spin (rpm) and airspeed (m/s).
pub fn spin_factor(total_spin_rpm: f64, airspeed_mps: f64) -> f64 {
    if airspeed_mps <= 1e-9 {
        return 0.0;
    }
    total_spin_rpm.abs() * RPM_TO_RAD_PER_S * BALL_RADIUS_M / airspeed_mps
}

/// Drag coefficient: piecewise linear in Re, plus a capped spin term.
pub fn drag_coefficient(re: f64, spin_factor: f64) -> f64 {
    let base = if re < RE_LOW {
        CD_LOW
    } else if re > RE_HIGH {
        CD_HIGH
    } else {
        let t = (re - RE_LOW) / (RE_HIGH - RE_LOW);
        CD_LOW + t * (CD_HIGH - CD_LOW)
    };
    base + CD_SPIN_GAIN * spin_factor.min(CD_SPIN_CAP)
}

/// Lift coefficient from the spin factor.
pub fn lift_coefficient(spin_factor: f64) -> f64 {
    (1.990 * spin_factor - 3.250 * spin_factor * spin_factor).clamp(0.0, CL_MAX)
}

/// Air density (kg/m³) for the given conditions.
///
/// Magnus-form saturation vapor pressure, barometric pressure corrected by
/// the isothermal scale height, then the CRC moist-air formula with
/// pressures in mmHg.
pub fn air_density(cond: &Conditions) -> f64 {
    let temp_c = (cond.temp_f - 32.0) / 1.8;
    let temp_k = temp_c + 273.15;

    // Saturation vapor pressure (hPa) → partial pressure (mmHg).
    let sat_hpa = 6.1094 * (17.625 * temp_c / (temp_c + 243.04)).exp();
    let vapor_mmhg = sat_hpa * 0.750062 * (cond.humidity_pct / 100.0);

    // Station pressure (mmHg), altitude-corrected.
    let pressure_mmhg = cond.pressure_inhg * 25.4 * (-cond.elevation_ft / 27000.0).exp();

    1.2929 * (273.15 / temp_k) * ((pressure_mmhg - 0.3783 * vapor_mmhg) / 760.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reynolds_scales_with_speed() {
        let re = reynolds(70.0);
        assert!((re - 70.0 * BALL_DIAMETER_M / KINEMATIC_VISCOSITY).abs() < 1e-6);
    }

    #[test]
    fn drag_plateaus() {
        assert_eq!(drag_coefficient(4.0e4, 0.0), 0.500);
        assert_eq!(drag_coefficient(2.0e5, 0.0), 0.212);
    }

    #[test]
    fn drag_interpolates_between_plateaus() {
        let mid = drag_coefficient(7.5e4, 0.0);
        assert!((mid - 0.356).abs() < 1e-9);
    }

    #[test]
    fn drag_spin_term_capped() {
        let base = drag_coefficient(2.0e5, 0.0);
        assert!((drag_coefficient(2.0e5, 0.2) - (base + 0.03)).abs() < 1e-12);
        // Past the cap the term stops growing.
        assert_eq!(drag_coefficient(2.0e5, 0.4), drag_coefficient(2.0e5, 0.9));
    }

    #[test]
    fn lift_zero_spin_zero_lift() {
        assert_eq!(lift_coefficient(0.0), 0.0);
    }

    #[test]
    fn lift_never_exceeds_ceiling_or_goes_negative() {
        for i in 0..100 {
            let s = i as f64 * 0.01;
            let cl = lift_coefficient(s);
            assert!((0.0..=CL_MAX).contains(&cl), "cl({s}) = {cl}");
        }
        // Large S drives the quadratic negative; clamp holds it at zero.
        assert_eq!(lift_coefficient(0.7), 0.0);
    }

    #[test]
    fn density_at_standard_conditions() {
        let rho = air_density(&Conditions {
            temp_f: 59.0,
            elevation_ft: 0.0,
            humidity_pct: 0.0,
            pressure_inhg: 29.92,
            wind_speed_mph: 0.0,
            wind_dir_deg: 0.0,
        });
        // ISA sea level: 1.225 kg/m³.
        assert!((rho - 1.225).abs() < 0.005, "rho = {rho}");
    }

    #[test]
    fn density_drops_with_altitude_heat_and_humidity() {
        let base = Conditions {
            temp_f: 59.0,
            elevation_ft: 0.0,
            humidity_pct: 0.0,
            pressure_inhg: 29.92,
            wind_speed_mph: 0.0,
            wind_dir_deg: 0.0,
        };
        let at_altitude = Conditions { elevation_ft: 5280.0, ..base };
        let hot = Conditions { temp_f: 95.0, ..base };
        let humid = Conditions { humidity_pct: 100.0, ..base };

        let rho = air_density(&base);
        assert!(air_density(&at_altitude) < rho);
        assert!(air_density(&hot) < rho);
        assert!(air_density(&humid) < rho);
    }
}
