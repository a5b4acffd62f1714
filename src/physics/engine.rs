//! Shot simulation: flight → bounce → roll → rest.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::ground::{self, BounceOutcome};
use super::trajectory::{self, DT, FlightModel, Phase};
use super::{Conditions, Launch, M_TO_FT, M_TO_YD, Surface, Vec3};

/// Hard cap on simulated time.
pub const MAX_SIM_TIME_S: f64 = 30.0;
/// Hard cap on recorded trajectory points.
pub const MAX_TRAJECTORY_POINTS: usize = 600;
/// Ground contact before this much flight time is ignored (launch jitter).
const MIN_FLIGHT_TIME_S: f64 = 0.1;

/// One sampled point of the ball's path. Distances in yards, height in feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub t_s: f64,
    pub x_yd: f64,
    pub y_ft: f64,
    pub z_yd: f64,
    pub phase: Phase,
}

/// Aggregate results of a simulated shot. Distances in yards, apex in feet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShotSummary {
    pub carry_yd: f64,
    pub total_yd: f64,
    pub roll_yd: f64,
    /// Lateral offset at rest; positive = right of the target line.
    pub offline_yd: f64,
    pub apex_ft: f64,
    pub apex_time_s: f64,
    pub flight_time_s: f64,
    pub total_time_s: f64,
    pub bounces: u32,
}

/// Trajectory plus summary for one simulated shot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShotResult {
    pub points: Vec<TrajectoryPoint>,
    pub summary: ShotSummary,
}

#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("simulation exceeded {MAX_SIM_TIME_S} s without coming to rest")]
    Timeout,
}

/// Composes aerodynamics, trajectory integration, and ground interaction.
/// Same launch + same conditions ⇒ bitwise-identical output.
pub struct FlightEngine {
    conditions: Conditions,
    surface: Surface,
}

impl FlightEngine {
    pub fn new(conditions: Conditions, surface: Surface) -> Self {
        Self { conditions, surface }
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// Simulate a shot from launch to rest.
    pub fn simulate(&self, launch: &Launch) -> Result<ShotResult, PhysicsError> {
        let model = FlightModel::new(&self.conditions);
        let props = self.surface.props();

        let mut state = trajectory::initial_state(launch);
        let mut samples: Vec<(f64, Vec3, Phase)> = vec![(0.0, state.pos, Phase::Flight)];
        let mut apex = (0.0_f64, 0.0_f64); // (height m, time s)

        // -- Flight --
        loop {
            state = model.step(&state);
            if state.pos.y > apex.0 {
                apex = (state.pos.y, state.t);
            }
            samples.push((state.t, state.pos, Phase::Flight));
            if state.pos.y <= 0.0 && state.t > MIN_FLIGHT_TIME_S {
                break;
            }
            if state.t >= MAX_SIM_TIME_S {
                return Err(PhysicsError::Timeout);
            }
        }
        let carry_m = state.pos.horizontal().norm();
        let flight_time_s = state.t;

        // -- Bounces --
        let mut bounces = 0;
        loop {
            bounces += 1;
            match ground::bounce(&mut state, &props, bounces) {
                BounceOutcome::Rolling => break,
                BounceOutcome::Airborne => {
                    samples.push((state.t, state.pos, Phase::Bounce));
                    loop {
                        state = model.step(&state);
                        samples.push((state.t, state.pos, Phase::Bounce));
                        if state.pos.y <= 0.0 {
                            break;
                        }
                        if state.t >= MAX_SIM_TIME_S {
                            return Err(PhysicsError::Timeout);
                        }
                    }
                }
            }
        }

        // -- Roll --
        samples.push((state.t, state.pos, Phase::Rolling));
        while !ground::roll_step(&mut state, &props, DT) {
            samples.push((state.t, state.pos, Phase::Rolling));
            if state.t >= MAX_SIM_TIME_S {
                return Err(PhysicsError::Timeout);
            }
        }
        samples.push((state.t, state.pos, Phase::Stopped));

        let total_m = state.pos.horizontal().norm();
        let summary = ShotSummary {
            carry_yd: carry_m * M_TO_YD,
            total_yd: total_m * M_TO_YD,
            roll_yd: (total_m - carry_m) * M_TO_YD,
            offline_yd: state.pos.z * M_TO_YD,
            apex_ft: apex.0 * M_TO_FT,
            apex_time_s: apex.1,
            flight_time_s,
            total_time_s: state.t,
            bounces,
        };
        debug!(
            carry_yd = summary.carry_yd,
            total_yd = summary.total_yd,
            offline_yd = summary.offline_yd,
            bounces,
            "shot simulated"
        );

        Ok(ShotResult {
            points: downsample(samples),
            summary,
        })
    }
}

/// Reduce raw samples to at most [`MAX_TRAJECTORY_POINTS`], evenly strided,
/// always keeping the first and last.
fn downsample(samples: Vec<(f64, Vec3, Phase)>) -> Vec<TrajectoryPoint> {
    let last = samples.len() - 1;
    // Stride sized so the strided points plus the final point fit the cap.
    let stride = last.div_ceil(MAX_TRAJECTORY_POINTS - 1).max(1);
    samples
        .iter()
        .enumerate()
        .filter(|(i, _)| i % stride == 0 || *i == last)
        .map(|(_, &(t_s, pos, phase))| TrajectoryPoint {
            t_s,
            x_yd: pos.x * M_TO_YD,
            y_ft: pos.y * M_TO_FT,
            z_yd: pos.z * M_TO_YD,
            phase,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
