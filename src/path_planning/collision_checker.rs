//! Trajectory-level collision detection
//!
//! Samples each segment at a fixed step of local time and reports the first
//! segment with a sample inside an occupied voxel.

use log::debug;

use crate::common::{OccupancyQuery, PlannerError, PlannerResult};
use crate::path_planning::min_snap::PolynomialTrajectory;

pub struct CollisionChecker {
    resolution: f64,
}

impl CollisionChecker {
    /// `resolution` is the sampling step in seconds
    pub fn new(resolution: f64) -> PlannerResult<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(PlannerError::InvalidParameter(format!(
                "collision sampling step must be positive, got {}",
                resolution
            )));
        }
        Ok(CollisionChecker { resolution })
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Index of the first unsafe segment, `None` when every sample is free
    pub fn detect_collision<M: OccupancyQuery + ?Sized>(
        &self,
        map: &M,
        trajectory: &PolynomialTrajectory,
    ) -> PlannerResult<Option<usize>> {
        for (segment, &duration) in trajectory.durations().iter().enumerate() {
            let steps = (duration / self.resolution).ceil() as usize;
            for k in 0..steps {
                let t = k as f64 * self.resolution;
                if t >= duration {
                    break;
                }
                let position = trajectory.position(segment, t)?;
                if map.is_occupied_at(&position) {
                    debug!("segment {} hits an obstacle at t = {:.3} ({:?})", segment, t, position);
                    return Ok(Some(segment));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BoundaryConditions;
    use crate::mapping::GridMap;
    use crate::path_planning::min_snap::{MinSnapConfig, Solver, TrajectoryOptimizer};
    use nalgebra::Vector3;

    fn create_test_map() -> GridMap {
        GridMap::new(1.0, Vector3::new(-0.5, -5.5, -5.5), Vector3::new(20.5, 5.5, 5.5)).unwrap()
    }

    fn three_segment_trajectory() -> PolynomialTrajectory {
        let optimizer = TrajectoryOptimizer::new(MinSnapConfig::default()).unwrap();
        let waypoints = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(4.0, 4.0, 0.0),
            Vector3::new(8.0, 4.0, 0.0),
        ];
        let bc = BoundaryConditions::at_rest();
        let times = optimizer.allocate_times(&waypoints, &bc).unwrap();
        optimizer.generate_trajectory(&waypoints, &bc, &times, Solver::Analytic).unwrap()
    }

    #[test]
    fn test_free_space_has_no_collision() {
        let map = create_test_map();
        let checker = CollisionChecker::new(0.05).unwrap();
        assert_eq!(checker.detect_collision(&map, &three_segment_trajectory()).unwrap(), None);
    }

    #[test]
    fn test_first_unsafe_segment_reported() {
        let checker = CollisionChecker::new(0.05).unwrap();
        let traj = three_segment_trajectory();

        // on the straight middle of segment 2 only
        let mut map = create_test_map();
        map.mark_occupied(&Vector3::new(6.0, 4.0, 0.0));
        assert_eq!(checker.detect_collision(&map, &traj).unwrap(), Some(2));

        // segment 0 wins over the later hit
        map.mark_occupied(&Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(checker.detect_collision(&map, &traj).unwrap(), Some(0));
    }

    #[test]
    fn test_rejects_bad_resolution() {
        assert!(CollisionChecker::new(0.0).is_err());
        assert!(CollisionChecker::new(f64::NAN).is_err());
    }
}
