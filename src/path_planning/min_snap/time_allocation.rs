//! Per-segment duration estimates from a trapezoidal velocity profile

use itertools::Itertools;
use nalgebra::{DVector, Vector3};

use crate::common::{BoundaryConditions, PlannerError, PlannerResult};

/// Segments shorter than this are treated as coincident waypoints
const MIN_SEGMENT_LENGTH: f64 = 1e-9;

/// Time to cover `distance` starting at `v_start` and ending at `v_end`,
/// accelerating at `max_acc` up to at most `max_vel`.
pub fn trapezoid_duration(distance: f64, v_start: f64, v_end: f64, max_vel: f64, max_acc: f64) -> f64 {
    let vs = v_start.clamp(0.0, max_vel);
    let ve = v_end.clamp(0.0, max_vel);

    let d_accel = (max_vel * max_vel - vs * vs) / (2.0 * max_acc);
    let d_decel = (max_vel * max_vel - ve * ve) / (2.0 * max_acc);
    if d_accel + d_decel <= distance {
        // accelerate, cruise, decelerate
        return (max_vel - vs) / max_acc + (max_vel - ve) / max_acc + (distance - d_accel - d_decel) / max_vel;
    }

    let v_peak = (max_acc * distance + 0.5 * (vs * vs + ve * ve)).sqrt();
    if v_peak >= vs.max(ve) {
        // triangular profile
        return (v_peak - vs) / max_acc + (v_peak - ve) / max_acc;
    }

    // too short to reach the end speed at this acceleration; ramp linearly
    2.0 * distance / (vs + ve)
}

/// Duration of every segment between consecutive `waypoints`.
///
/// Entry speed of the first segment and exit speed of the last are the
/// boundary velocities projected on the segment direction; all interior
/// speeds are taken as zero.
pub fn allocate_times(
    waypoints: &[Vector3<f64>],
    boundary: &BoundaryConditions,
    max_vel: f64,
    max_acc: f64,
) -> PlannerResult<DVector<f64>> {
    if waypoints.len() < 2 {
        return Err(PlannerError::PreconditionViolation(format!(
            "time allocation needs at least 2 waypoints, got {}",
            waypoints.len()
        )));
    }
    if !(max_vel > 0.0 && max_acc > 0.0) {
        return Err(PlannerError::InvalidParameter(format!(
            "velocity and acceleration limits must be positive, got {} and {}",
            max_vel, max_acc
        )));
    }

    let last = waypoints.len() - 2;
    let mut times = Vec::with_capacity(waypoints.len() - 1);
    for (i, (from, to)) in waypoints.iter().tuple_windows().enumerate() {
        let delta = to - from;
        let distance = delta.norm();
        if !(distance > MIN_SEGMENT_LENGTH) {
            return Err(PlannerError::PreconditionViolation(format!(
                "waypoints {} and {} coincide",
                i,
                i + 1
            )));
        }
        let direction = delta / distance;
        let v_start = if i == 0 { boundary.start_velocity.dot(&direction) } else { 0.0 };
        let v_end = if i == last { boundary.end_velocity.dot(&direction) } else { 0.0 };

        let duration = trapezoid_duration(distance, v_start, v_end, max_vel, max_acc);
        if !(duration.is_finite() && duration > 0.0) {
            return Err(PlannerError::PreconditionViolation(format!(
                "segment {} got degenerate duration {}",
                i, duration
            )));
        }
        times.push(duration);
    }
    Ok(DVector::from_vec(times))
}
