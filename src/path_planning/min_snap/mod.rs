//! Minimum-snap trajectory optimization
//!
//! Turns critical waypoints into a piecewise polynomial that passes through
//! every waypoint, matches the boundary velocity and acceleration, stays
//! `c_order`-times continuously differentiable at interior waypoints and
//! minimizes the integrated square of the `t_order`-th derivative (snap for
//! `t_order = 4`).
//!
//! Two interchangeable solvers are provided: a closed-form solve over the
//! endpoint derivatives ([`analytic`]) and a KKT solve of the equivalent
//! equality-constrained QP ([`qp`]). They agree up to solver tolerance.

pub mod analytic;
pub mod polynomial;
pub mod qp;
pub mod time_allocation;

pub use polynomial::*;
pub use time_allocation::{allocate_times, trapezoid_duration};

use log::debug;
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::common::{BoundaryConditions, PlannerError, PlannerResult};

/// Coefficient solving strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Solver {
    Analytic,
    Numeric,
}

/// Configuration for the trajectory optimizer
#[derive(Debug, Clone, PartialEq)]
pub struct MinSnapConfig {
    /// Derivative order whose squared norm is minimized
    pub t_order: usize,
    /// Continuity order at interior waypoints
    pub c_order: usize,
    /// Velocity limit used for time allocation [m/s]
    pub max_vel: f64,
    /// Acceleration limit used for time allocation [m/s^2]
    pub max_acc: f64,
}

impl Default for MinSnapConfig {
    fn default() -> Self {
        Self { t_order: 4, c_order: 3, max_vel: 1.0, max_acc: 1.0 }
    }
}

impl MinSnapConfig {
    pub fn validate(&self) -> PlannerResult<()> {
        if self.t_order < 1 || self.c_order < 1 {
            return Err(PlannerError::InvalidParameter(format!(
                "t_order ({}) and c_order ({}) must be at least 1",
                self.t_order, self.c_order
            )));
        }
        if self.t_order > 2 * self.c_order + 1 {
            return Err(PlannerError::InvalidParameter(format!(
                "t_order {} exceeds the degree {} of the polynomial basis for c_order {}",
                self.t_order,
                2 * self.c_order + 1,
                self.c_order
            )));
        }
        if !(self.max_vel > 0.0 && self.max_acc > 0.0) {
            return Err(PlannerError::InvalidParameter(format!(
                "max_vel ({}) and max_acc ({}) must be positive",
                self.max_vel, self.max_acc
            )));
        }
        Ok(())
    }
}

pub struct TrajectoryOptimizer {
    config: MinSnapConfig,
}

impl TrajectoryOptimizer {
    pub fn new(config: MinSnapConfig) -> PlannerResult<Self> {
        config.validate()?;
        Ok(TrajectoryOptimizer { config })
    }

    pub fn config(&self) -> &MinSnapConfig {
        &self.config
    }

    /// Initial duration of every segment between consecutive waypoints
    pub fn allocate_times(
        &self,
        waypoints: &[Vector3<f64>],
        boundary: &BoundaryConditions,
    ) -> PlannerResult<DVector<f64>> {
        allocate_times(waypoints, boundary, self.config.max_vel, self.config.max_acc)
    }

    /// Solve for the polynomial coefficients of every segment
    pub fn generate_trajectory(
        &self,
        waypoints: &[Vector3<f64>],
        boundary: &BoundaryConditions,
        times: &DVector<f64>,
        solver: Solver,
    ) -> PlannerResult<PolynomialTrajectory> {
        if waypoints.len() < 2 {
            return Err(PlannerError::PreconditionViolation(format!(
                "trajectory needs at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }
        if times.len() + 1 != waypoints.len() {
            return Err(PlannerError::PreconditionViolation(format!(
                "{} durations for {} waypoints",
                times.len(),
                waypoints.len()
            )));
        }
        if let Some(i) = times.iter().position(|&t| !(t.is_finite() && t > 0.0)) {
            return Err(PlannerError::PreconditionViolation(format!(
                "segment {} has non-positive duration {}",
                i, times[i]
            )));
        }

        let (t_order, c_order) = (self.config.t_order, self.config.c_order);
        let coefficients = match solver {
            Solver::Analytic => analytic::solve(waypoints, boundary, times, t_order, c_order)?,
            Solver::Numeric => qp::solve(waypoints, boundary, times, t_order, c_order)?,
        };
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(PlannerError::NumericalError(
                "solver produced non-finite coefficients".to_string(),
            ));
        }
        debug!(
            "{:?} solve: {} segments over {:.3} s",
            solver,
            times.len(),
            times.sum()
        );
        PolynomialTrajectory::new(coefficients, times.clone())
    }
}
