//! Common traits defining the seams between planning stages

use nalgebra::Vector3;

use crate::common::error::PlannerResult;
use crate::common::types::Path3D;
use crate::mapping::GridMap;

/// Read-only occupancy lookups against continuous coordinates
pub trait OccupancyQuery {
    /// True if the voxel containing `point` holds an obstacle
    fn is_occupied_at(&self, point: &Vector3<f64>) -> bool;
}

/// Discrete obstacle-aware search over the voxel grid
pub trait PathSearch {
    /// Dense path from the cell containing `start` to the cell containing `goal`.
    ///
    /// The map is mutable because searches keep their bookkeeping in the grid arena.
    fn find_path(
        &self,
        map: &mut GridMap,
        start: &Vector3<f64>,
        goal: &Vector3<f64>,
    ) -> PlannerResult<Path3D>;
}
