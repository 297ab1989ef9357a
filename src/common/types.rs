//! Common types used throughout quad_planner

use nalgebra::Vector3;

use crate::common::error::{PlannerError, PlannerResult};

/// Integer voxel coordinate inside a bounded grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelIndex {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, z: self.z + dz }
    }
}

/// Path represented as a sequence of 3D points
#[derive(Debug, Clone, PartialEq)]
pub struct Path3D {
    pub points: Vec<Vector3<f64>>,
}

impl Path3D {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_points(points: Vec<Vector3<f64>>) -> Self {
        Self { points }
    }

    pub fn push(&mut self, point: Vector3<f64>) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Gather the points selected by `indices`, in order
    pub fn select(&self, indices: &[usize]) -> PlannerResult<Vec<Vector3<f64>>> {
        indices
            .iter()
            .map(|&i| {
                self.points.get(i).copied().ok_or_else(|| {
                    PlannerError::PreconditionViolation(format!(
                        "index {} out of range for a {}-point path",
                        i,
                        self.points.len()
                    ))
                })
            })
            .collect()
    }

    pub fn total_length(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        self.points.windows(2)
            .map(|w| (w[1] - w[0]).norm())
            .sum()
    }
}

impl Default for Path3D {
    fn default() -> Self {
        Self::new()
    }
}

/// Velocity and acceleration pinned at the first and last waypoint.
///
/// Interior waypoints carry no boundary values; they are only bound by continuity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryConditions {
    pub start_velocity: Vector3<f64>,
    pub end_velocity: Vector3<f64>,
    pub start_acceleration: Vector3<f64>,
    pub end_acceleration: Vector3<f64>,
}

impl BoundaryConditions {
    /// Start and stop at rest
    pub fn at_rest() -> Self {
        Self {
            start_velocity: Vector3::zeros(),
            end_velocity: Vector3::zeros(),
            start_acceleration: Vector3::zeros(),
            end_acceleration: Vector3::zeros(),
        }
    }

    /// Leave with `velocity`, arrive at rest
    pub fn from_start_velocity(velocity: Vector3<f64>) -> Self {
        Self { start_velocity: velocity, ..Self::at_rest() }
    }

    /// Boundary value of derivative `order` at the start (`at_end == false`) or end.
    ///
    /// Position is not a boundary value; derivatives above acceleration are pinned to zero.
    pub fn derivative(&self, order: usize, at_end: bool) -> Vector3<f64> {
        match (order, at_end) {
            (1, false) => self.start_velocity,
            (1, true) => self.end_velocity,
            (2, false) => self.start_acceleration,
            (2, true) => self.end_acceleration,
            _ => Vector3::zeros(),
        }
    }
}

impl Default for BoundaryConditions {
    fn default() -> Self {
        Self::at_rest()
    }
}
