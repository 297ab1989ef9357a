//! Polynomial trajectory export message
//!
//! Each segment is published on the normalized variable `tau = t / T` in
//! [0, 1]: coefficient `j` of the internal real-time polynomial is scaled by
//! `T^j`, so a consumer evaluates `sum_j coef_j * tau^j` with `tau = t / T`.

use log::info;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::common::{PlannerError, PlannerResult};
use crate::path_planning::min_snap::{evaluate_poly, PolynomialTrajectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryAction {
    /// First trajectory towards a goal
    Add,
    /// Supersedes the trajectory being executed
    Replace,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrajectoryMsg {
    pub stamp: f64,
    pub frame_id: String,
    pub trajectory_id: u32,
    pub action: TrajectoryAction,
    /// Polynomial degree shared by all segments
    pub num_order: u32,
    pub num_segment: u32,
    pub start_yaw: f64,
    pub final_yaw: f64,
    pub coef_x: Vec<f64>,
    pub coef_y: Vec<f64>,
    pub coef_z: Vec<f64>,
    pub time: Vec<f64>,
    pub order: Vec<u32>,
    pub mag_coeff: f64,
}

impl TrajectoryMsg {
    /// Position of exported segment `segment` at normalized time `tau`
    pub fn evaluate(&self, segment: usize, tau: f64) -> PlannerResult<Vector3<f64>> {
        if segment >= self.num_segment as usize {
            return Err(PlannerError::PreconditionViolation(format!(
                "segment {} out of range for exported trajectory {}",
                segment, self.trajectory_id
            )));
        }
        if !(0.0..=1.0).contains(&tau) {
            return Err(PlannerError::PreconditionViolation(format!(
                "normalized time {} outside [0, 1]",
                tau
            )));
        }
        let n = self.num_order as usize + 1;
        let expected = self.num_segment as usize * n;
        for (axis, coef) in [("x", &self.coef_x), ("y", &self.coef_y), ("z", &self.coef_z)] {
            if coef.len() != expected {
                return Err(PlannerError::PreconditionViolation(format!(
                    "coef_{} holds {} values, {} segments of order {} need {}",
                    axis,
                    coef.len(),
                    self.num_segment,
                    self.num_order,
                    expected
                )));
            }
        }
        let range = segment * n..(segment + 1) * n;
        Ok(Vector3::new(
            evaluate_poly(&self.coef_x[range.clone()], tau, 0),
            evaluate_poly(&self.coef_y[range.clone()], tau, 0),
            evaluate_poly(&self.coef_z[range], tau, 0),
        ))
    }

    pub fn total_duration(&self) -> f64 {
        self.time.iter().sum()
    }

    pub fn to_json(&self) -> PlannerResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Stamps trajectories with a frame and a monotonically increasing id
pub struct TrajectoryExporter {
    frame_id: String,
    next_id: u32,
}

impl TrajectoryExporter {
    pub fn new(frame_id: &str) -> Self {
        // ids start at 1; 0 is reserved by trajectory servers
        TrajectoryExporter { frame_id: frame_id.to_string(), next_id: 1 }
    }

    /// Id the next export will carry
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn export(
        &mut self,
        trajectory: &PolynomialTrajectory,
        action: TrajectoryAction,
        stamp: f64,
    ) -> TrajectoryMsg {
        let num_segment = trajectory.num_segments();
        let n = trajectory.num_coeffs();
        let num_order = trajectory.order() as u32;

        let mut coef = [
            Vec::with_capacity(num_segment * n),
            Vec::with_capacity(num_segment * n),
            Vec::with_capacity(num_segment * n),
        ];
        for (segment, &duration) in trajectory.durations().iter().enumerate() {
            let row = trajectory.coefficients().row(segment);
            for (dim, out) in coef.iter_mut().enumerate() {
                let mut scale = 1.0;
                for j in 0..n {
                    out.push(row[dim * n + j] * scale);
                    scale *= duration;
                }
            }
        }

        let initial_vel = trajectory.velocity_at(0.0);
        let final_vel = trajectory.velocity_at(trajectory.total_duration());
        let [coef_x, coef_y, coef_z] = coef;

        let msg = TrajectoryMsg {
            stamp,
            frame_id: self.frame_id.clone(),
            trajectory_id: self.next_id,
            action,
            num_order,
            num_segment: num_segment as u32,
            start_yaw: initial_vel.y.atan2(initial_vel.x),
            final_yaw: final_vel.y.atan2(final_vel.x),
            coef_x,
            coef_y,
            coef_z,
            time: trajectory.durations().iter().copied().collect(),
            order: vec![num_order; num_segment],
            mag_coeff: 1.0,
        };
        info!(
            "[Export]: trajectory {} ({:?}), {} segments over {:.2} s",
            msg.trajectory_id,
            action,
            num_segment,
            msg.total_duration()
        );
        self.next_id += 1;
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BoundaryConditions;
    use crate::path_planning::min_snap::{MinSnapConfig, Solver, TrajectoryOptimizer};
    use nalgebra::DVector;

    fn curved_trajectory() -> PolynomialTrajectory {
        let optimizer = TrajectoryOptimizer::new(MinSnapConfig::default()).unwrap();
        let waypoints = vec![
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(2.0, 1.0, 1.5),
            Vector3::new(3.0, 3.0, 1.0),
        ];
        let bc = BoundaryConditions::from_start_velocity(Vector3::new(0.5, 0.5, 0.0));
        let times = DVector::from_vec(vec![2.5, 3.0]);
        optimizer.generate_trajectory(&waypoints, &bc, &times, Solver::Analytic).unwrap()
    }

    #[test]
    fn test_ids_increase_from_one() {
        let traj = curved_trajectory();
        let mut exporter = TrajectoryExporter::new("world");
        let first = exporter.export(&traj, TrajectoryAction::Add, 0.0);
        let second = exporter.export(&traj, TrajectoryAction::Replace, 1.0);
        assert_eq!(first.trajectory_id, 1);
        assert_eq!(second.trajectory_id, 2);
        assert_eq!(second.action, TrajectoryAction::Replace);
        assert_eq!(exporter.next_id(), 3);
    }

    #[test]
    fn test_message_layout() {
        let traj = curved_trajectory();
        let msg = TrajectoryExporter::new("map").export(&traj, TrajectoryAction::Add, 0.0);
        assert_eq!(msg.frame_id, "map");
        assert_eq!(msg.num_order, 7);
        assert_eq!(msg.num_segment, 2);
        assert_eq!(msg.coef_x.len(), 16);
        assert_eq!(msg.order, vec![7, 7]);
        assert_eq!(msg.time, vec![2.5, 3.0]);
        assert_eq!(msg.mag_coeff, 1.0);
        assert!((msg.start_yaw - std::f64::consts::FRAC_PI_4).abs() < 1e-9);
    }

    #[test]
    fn test_export_round_trip() {
        let traj = curved_trajectory();
        let msg = TrajectoryExporter::new("world").export(&traj, TrajectoryAction::Add, 0.0);
        for segment in 0..2 {
            let duration = traj.durations()[segment];
            for step in 0..=10 {
                let t = duration * step as f64 / 10.0;
                let internal = traj.position(segment, t).unwrap();
                let exported = msg.evaluate(segment, t / duration).unwrap();
                assert!((internal - exported).norm() < 1e-9);
            }
        }
        assert!(msg.evaluate(2, 0.0).is_err());
        assert!(msg.evaluate(0, 1.5).is_err());
    }

    #[test]
    fn test_evaluate_rejects_truncated_coefficients() {
        let traj = curved_trajectory();
        let mut msg = TrajectoryExporter::new("world").export(&traj, TrajectoryAction::Add, 0.0);
        msg.coef_y.truncate(10);
        assert!(matches!(msg.evaluate(1, 0.5), Err(PlannerError::PreconditionViolation(_))));
        assert!(matches!(msg.evaluate(0, 0.5), Err(PlannerError::PreconditionViolation(_))));

        let mut msg = TrajectoryExporter::new("world").export(&traj, TrajectoryAction::Add, 0.0);
        msg.num_order = 9;
        assert!(msg.evaluate(0, 0.0).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let traj = curved_trajectory();
        let msg = TrajectoryExporter::new("world").export(&traj, TrajectoryAction::Replace, 4.2);
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"action\":\"replace\""));
        let back: TrajectoryMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back.trajectory_id, msg.trajectory_id);
        assert_eq!(back.action, TrajectoryAction::Replace);
        assert_eq!(back.coef_z.len(), msg.coef_z.len());
        for (a, b) in back.coef_x.iter().zip(&msg.coef_x) {
            assert!((a - b).abs() <= 1e-12 * (1.0 + b.abs()));
        }
    }
}
