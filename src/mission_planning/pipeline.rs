//! Search, simplify, then optimize/check/refine until the trajectory is safe
//!
//! The loop reintroduces dense-path detail only where an optimized segment
//! cut through an obstacle, so the optimization stays as small as possible.
//! It is bounded by `max_refinements` so a single call always terminates.

use log::{debug, info, warn};
use nalgebra::Vector3;

use crate::common::{BoundaryConditions, Path3D, PathSearch, PlannerConfig, PlannerError, PlannerResult};
use crate::mapping::GridMap;
use crate::path_planning::{
    AStarPlanner, CollisionChecker, PathSimplifier, PolynomialTrajectory, Solver, TrajectoryOptimizer,
};

/// Everything one successful planning call produced
#[derive(Debug, Clone)]
pub struct PlanResult {
    pub dense_path: Path3D,
    pub critical_indices: Vec<usize>,
    pub trajectory: PolynomialTrajectory,
    /// Unsafe segment reported by every optimize attempt; the last is always `None`
    pub attempts: Vec<Option<usize>>,
}

impl PlanResult {
    pub fn critical_waypoints(&self) -> PlannerResult<Vec<Vector3<f64>>> {
        self.dense_path.select(&self.critical_indices)
    }

    pub fn refinements(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }
}

pub struct TrajectoryPipeline<S: PathSearch = AStarPlanner> {
    search: S,
    simplifier: PathSimplifier,
    optimizer: TrajectoryOptimizer,
    checker: CollisionChecker,
    solver: Solver,
    max_refinements: usize,
}

impl TrajectoryPipeline<AStarPlanner> {
    pub fn from_config(config: &PlannerConfig) -> PlannerResult<Self> {
        Ok(Self::new(
            AStarPlanner::new(config.astar_config()),
            PathSimplifier::new(config.path.resolution),
            TrajectoryOptimizer::new(config.min_snap_config())?,
            CollisionChecker::new(config.collision_detection.resolution)?,
            config.planning.solver,
            config.replanning.max_refinements,
        ))
    }
}

impl<S: PathSearch> TrajectoryPipeline<S> {
    pub fn new(
        search: S,
        simplifier: PathSimplifier,
        optimizer: TrajectoryOptimizer,
        checker: CollisionChecker,
        solver: Solver,
        max_refinements: usize,
    ) -> Self {
        TrajectoryPipeline { search, simplifier, optimizer, checker, solver, max_refinements }
    }

    pub fn solver(&self) -> Solver {
        self.solver
    }

    pub fn set_solver(&mut self, solver: Solver) {
        self.solver = solver;
    }

    /// Refinements allowed per `generate` call
    pub fn max_refinements(&self) -> usize {
        self.max_refinements
    }

    /// Plan from `source` (moving at `start_vel`) to `target`, arriving at rest
    pub fn generate(
        &self,
        map: &mut GridMap,
        source: &Vector3<f64>,
        target: &Vector3<f64>,
        start_vel: &Vector3<f64>,
    ) -> PlannerResult<PlanResult> {
        if let (Some(a), Some(b)) = (map.coord_to_voxel(source), map.coord_to_voxel(target)) {
            if a == b {
                return Err(PlannerError::AlreadyAtGoal);
            }
        }

        let dense_path = self.search.find_path(map, source, target)?;
        if dense_path.len() < 2 {
            return Err(PlannerError::AlreadyAtGoal);
        }
        let mut critical_indices = self.simplifier.simplify(&dense_path.points);
        debug!(
            "dense path of {} points reduced to {} critical waypoints",
            dense_path.len(),
            critical_indices.len()
        );

        let boundary = BoundaryConditions::from_start_velocity(*start_vel);
        let mut attempts = Vec::new();
        loop {
            let waypoints = dense_path.select(&critical_indices)?;
            let times = self.optimizer.allocate_times(&waypoints, &boundary)?;
            let trajectory = self.optimizer.generate_trajectory(&waypoints, &boundary, &times, self.solver)?;

            let unsafe_segment = self.checker.detect_collision(map, &trajectory)?;
            attempts.push(unsafe_segment);

            let segment = match unsafe_segment {
                None => {
                    info!(
                        "[Plan]: {} segments, {:.2} s, {} refinements",
                        trajectory.num_segments(),
                        trajectory.total_duration(),
                        attempts.len() - 1
                    );
                    return Ok(PlanResult { dense_path, critical_indices, trajectory, attempts });
                }
                Some(segment) => segment,
            };

            if attempts.len() > self.max_refinements {
                return Err(PlannerError::PlanningError(format!(
                    "segment {} still unsafe after {} refinements",
                    segment, self.max_refinements
                )));
            }
            critical_indices = self.simplifier.refine(&critical_indices, segment)?;
            let inserted = dense_path.points[critical_indices[segment + 1]];
            warn!(
                "[Refine]: segment {} unsafe, {} critical waypoints, inserted ({:.2}, {:.2}, {:.2})",
                segment,
                critical_indices.len(),
                inserted.x,
                inserted.y,
                inserted.z
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::OccupancyQuery;
    use crate::path_planning::MinSnapConfig;

    fn create_test_map() -> GridMap {
        GridMap::new(1.0, Vector3::new(-0.5, -5.5, -5.5), Vector3::new(20.5, 5.5, 5.5)).unwrap()
    }

    fn pipeline(tolerance: f64, max_refinements: usize) -> TrajectoryPipeline {
        TrajectoryPipeline::new(
            AStarPlanner::default(),
            PathSimplifier::new(tolerance),
            TrajectoryOptimizer::new(MinSnapConfig::default()).unwrap(),
            CollisionChecker::new(0.05).unwrap(),
            Solver::Analytic,
            max_refinements,
        )
    }

    #[test]
    fn test_straight_corridor_single_segment() {
        let mut map = create_test_map();
        let result = pipeline(0.05, 10)
            .generate(&mut map, &Vector3::zeros(), &Vector3::new(10.0, 0.0, 0.0), &Vector3::zeros())
            .unwrap();
        assert_eq!(result.dense_path.len(), 11);
        assert_eq!(result.critical_indices, vec![0, 10]);
        assert_eq!(result.trajectory.num_segments(), 1);
        assert_eq!(result.attempts, vec![None]);
        assert_eq!(result.refinements(), 0);
    }

    #[test]
    fn test_refines_around_obstacle() {
        let mut map = create_test_map();
        map.mark_occupied(&Vector3::new(5.0, 0.0, 0.0));
        let result = pipeline(1.5, 10)
            .generate(&mut map, &Vector3::zeros(), &Vector3::new(10.0, 0.0, 0.0), &Vector3::zeros())
            .unwrap();
        assert_eq!(result.attempts, vec![Some(0), None]);
        assert_eq!(result.critical_indices, vec![0, 5, 10]);
        assert_eq!(result.trajectory.num_segments(), 2);
        let bypass = result.critical_waypoints().unwrap()[1];
        assert!(!map.is_occupied_at(&bypass));
    }

    #[test]
    fn test_refinement_bound() {
        let mut map = create_test_map();
        map.mark_occupied(&Vector3::new(5.0, 0.0, 0.0));
        let result = pipeline(1.5, 0).generate(
            &mut map,
            &Vector3::zeros(),
            &Vector3::new(10.0, 0.0, 0.0),
            &Vector3::zeros(),
        );
        assert!(matches!(result, Err(PlannerError::PlanningError(_))));
    }

    #[test]
    fn test_refinement_bound_from_config() {
        let config = PlannerConfig::from_toml_str("[replanning]\nmax_refinements = 3\n").unwrap();
        assert_eq!(TrajectoryPipeline::from_config(&config).unwrap().max_refinements(), 3);
    }

    #[test]
    fn test_same_voxel_is_already_at_goal() {
        let mut map = create_test_map();
        let result = pipeline(0.05, 10).generate(
            &mut map,
            &Vector3::new(3.1, 0.0, 0.0),
            &Vector3::new(3.2, 0.1, 0.0),
            &Vector3::zeros(),
        );
        assert!(matches!(result, Err(PlannerError::AlreadyAtGoal)));
    }

    #[test]
    fn test_unreachable_goal() {
        let mut map = create_test_map();
        map.mark_occupied(&Vector3::new(10.0, 0.0, 0.0));
        let result = pipeline(0.05, 10).generate(
            &mut map,
            &Vector3::zeros(),
            &Vector3::new(10.0, 0.0, 0.0),
            &Vector3::zeros(),
        );
        assert!(matches!(result, Err(PlannerError::NoPathFound(_))));
        assert!(result.unwrap_err().is_recoverable());
    }
}
