//! Voxel occupancy grid
//!
//! Occupancy is append-only: obstacles are assumed persistent once observed.
//! Alongside occupancy the grid carries an arena of per-cell search records
//! that path searches write into; `reset_search_state` clears only those.

use log::debug;
use nalgebra::Vector3;

use crate::common::{OccupancyQuery, PlannerError, PlannerResult, VoxelIndex};

/// Search status of a voxel within the current query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTag {
    Unvisited,
    Open,
    Closed,
}

/// Per-query bookkeeping stored for every voxel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchCell {
    pub tag: SearchTag,
    pub g_score: f64,
    pub f_score: f64,
    /// Arena index of the predecessor on the best known path
    pub parent: Option<usize>,
}

impl Default for SearchCell {
    fn default() -> Self {
        Self {
            tag: SearchTag::Unvisited,
            g_score: f64::INFINITY,
            f_score: f64::INFINITY,
            parent: None,
        }
    }
}

pub struct GridMap {
    resolution: f64,
    inv_resolution: f64,
    lower: Vector3<f64>,
    upper: Vector3<f64>,
    x_size: usize,
    y_size: usize,
    z_size: usize,
    occupancy: Vec<bool>,
    occupied_count: usize,
    search: Vec<SearchCell>,
    touched: Vec<usize>,
}

impl GridMap {
    /// Allocate an empty grid covering `[lower, upper)` with cubic voxels
    pub fn new(resolution: f64, lower: Vector3<f64>, upper: Vector3<f64>) -> PlannerResult<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(PlannerError::InvalidParameter(format!(
                "grid resolution must be positive, got {}",
                resolution
            )));
        }

        let extent = upper - lower;
        let cells = extent.map(|e| ((e / resolution) + 1e-9).floor());
        if cells.iter().any(|&c| !(c >= 1.0)) {
            return Err(PlannerError::InvalidParameter(format!(
                "grid bounds {:?}..{:?} hold no voxel at resolution {}",
                lower, upper, resolution
            )));
        }

        let (x_size, y_size, z_size) = (cells.x as usize, cells.y as usize, cells.z as usize);
        let total = x_size * y_size * z_size;
        debug!("grid map {}x{}x{} voxels at {} m", x_size, y_size, z_size, resolution);

        Ok(GridMap {
            resolution,
            inv_resolution: 1.0 / resolution,
            lower,
            upper,
            x_size,
            y_size,
            z_size,
            occupancy: vec![false; total],
            occupied_count: 0,
            search: vec![SearchCell::default(); total],
            touched: Vec::new(),
        })
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn lower(&self) -> Vector3<f64> {
        self.lower
    }

    pub fn upper(&self) -> Vector3<f64> {
        self.upper
    }

    /// Number of voxels along x, y and z
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.x_size, self.y_size, self.z_size)
    }

    pub fn num_cells(&self) -> usize {
        self.occupancy.len()
    }

    pub fn contains_point(&self, point: &Vector3<f64>) -> bool {
        (0..3).all(|i| point[i] >= self.lower[i] && point[i] < self.upper[i])
    }

    pub fn contains_voxel(&self, voxel: &VoxelIndex) -> bool {
        voxel.x >= 0
            && voxel.y >= 0
            && voxel.z >= 0
            && (voxel.x as usize) < self.x_size
            && (voxel.y as usize) < self.y_size
            && (voxel.z as usize) < self.z_size
    }

    /// Voxel containing `point`, or `None` outside the map
    pub fn coord_to_voxel(&self, point: &Vector3<f64>) -> Option<VoxelIndex> {
        if !self.contains_point(point) {
            return None;
        }
        Some(self.clamp_to_voxel(point))
    }

    /// Voxel containing `point`, clamped to the grid
    pub fn clamp_to_voxel(&self, point: &Vector3<f64>) -> VoxelIndex {
        let rel = (point - self.lower) * self.inv_resolution;
        let clamp = |v: f64, size: usize| -> i32 { (v.floor() as i64).clamp(0, size as i64 - 1) as i32 };
        VoxelIndex::new(
            clamp(rel.x, self.x_size),
            clamp(rel.y, self.y_size),
            clamp(rel.z, self.z_size),
        )
    }

    /// Centre of a voxel in world coordinates
    pub fn voxel_to_coord(&self, voxel: &VoxelIndex) -> Vector3<f64> {
        Vector3::new(
            (voxel.x as f64 + 0.5) * self.resolution + self.lower.x,
            (voxel.y as f64 + 0.5) * self.resolution + self.lower.y,
            (voxel.z as f64 + 0.5) * self.resolution + self.lower.z,
        )
    }

    /// Arena index of an in-bounds voxel
    pub fn linear_index(&self, voxel: &VoxelIndex) -> usize {
        (voxel.x as usize * self.y_size + voxel.y as usize) * self.z_size + voxel.z as usize
    }

    pub fn voxel_from_linear(&self, index: usize) -> VoxelIndex {
        let z = index % self.z_size;
        let y = (index / self.z_size) % self.y_size;
        let x = index / (self.z_size * self.y_size);
        VoxelIndex::new(x as i32, y as i32, z as i32)
    }

    /// Mark the voxel containing `point` as occupied.
    ///
    /// Out-of-bounds points are ignored. Returns whether the point landed in the map.
    pub fn mark_occupied(&mut self, point: &Vector3<f64>) -> bool {
        let voxel = match self.coord_to_voxel(point) {
            Some(v) => v,
            None => return false,
        };
        let index = self.linear_index(&voxel);
        if !self.occupancy[index] {
            self.occupancy[index] = true;
            self.occupied_count += 1;
        }
        true
    }

    /// Obstacle ingestion: mark every point, returning how many were inside the map
    pub fn mark_occupied_points<'a, I>(&mut self, points: I) -> usize
    where
        I: IntoIterator<Item = &'a Vector3<f64>>,
    {
        let mut accepted = 0;
        let mut rejected = 0;
        for point in points {
            if self.mark_occupied(point) {
                accepted += 1;
            } else {
                rejected += 1;
            }
        }
        if rejected > 0 {
            debug!("ignored {} obstacle points outside the map", rejected);
        }
        accepted
    }

    /// Occupancy of an in-bounds voxel; voxels outside the map read as free
    pub fn is_occupied(&self, voxel: &VoxelIndex) -> bool {
        self.contains_voxel(voxel) && self.occupancy[self.linear_index(voxel)]
    }

    pub fn is_occupied_index(&self, index: usize) -> bool {
        self.occupancy[index]
    }

    pub fn occupied_voxel_count(&self) -> usize {
        self.occupied_count
    }

    /// Centres of all occupied voxels
    pub fn occupied_points(&self) -> Vec<Vector3<f64>> {
        self.occupancy
            .iter()
            .enumerate()
            .filter(|(_, &occupied)| occupied)
            .map(|(i, _)| self.voxel_to_coord(&self.voxel_from_linear(i)))
            .collect()
    }

    pub fn search_cell(&self, index: usize) -> &SearchCell {
        &self.search[index]
    }

    /// Mutable search record; the cell is remembered for the next reset
    pub fn search_cell_mut(&mut self, index: usize) -> &mut SearchCell {
        if self.search[index] == SearchCell::default() {
            self.touched.push(index);
        }
        &mut self.search[index]
    }

    /// Clear the transient search records written since the last reset
    pub fn reset_search_state(&mut self) {
        for index in self.touched.drain(..) {
            self.search[index] = SearchCell::default();
        }
    }
}

impl OccupancyQuery for GridMap {
    fn is_occupied_at(&self, point: &Vector3<f64>) -> bool {
        match self.coord_to_voxel(point) {
            Some(voxel) => self.occupancy[self.linear_index(&voxel)],
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_map() -> GridMap {
        GridMap::new(1.0, Vector3::new(-0.5, -5.5, -5.5), Vector3::new(20.5, 5.5, 5.5)).unwrap()
    }

    #[test]
    fn test_dimensions_from_bounds() {
        let map = GridMap::new(0.2, Vector3::new(-25.0, -25.0, 0.0), Vector3::new(25.0, 25.0, 5.0)).unwrap();
        assert_eq!(map.dimensions(), (250, 250, 25));
        assert_eq!(map.num_cells(), 250 * 250 * 25);
    }

    #[test]
    fn test_rejects_degenerate_bounds() {
        assert!(GridMap::new(0.0, Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0)).is_err());
        assert!(GridMap::new(1.0, Vector3::zeros(), Vector3::new(1.0, 0.5, 1.0)).is_err());
    }

    #[test]
    fn test_voxel_round_trip() {
        let map = unit_map();
        let voxel = map.coord_to_voxel(&Vector3::new(5.2, -0.3, 0.4)).unwrap();
        assert_eq!(map.voxel_to_coord(&voxel), Vector3::new(5.0, 0.0, 0.0));
        let index = map.linear_index(&voxel);
        assert_eq!(map.voxel_from_linear(index), voxel);
    }

    #[test]
    fn test_mark_occupied_is_idempotent() {
        let mut map = unit_map();
        let p = Vector3::new(5.0, 0.0, 0.0);
        assert!(map.mark_occupied(&p));
        assert!(map.mark_occupied(&p));
        assert_eq!(map.occupied_voxel_count(), 1);
        assert!(map.is_occupied_at(&Vector3::new(5.4, 0.4, -0.4)));
        assert!(!map.is_occupied_at(&Vector3::new(5.6, 0.0, 0.0)));
    }

    #[test]
    fn test_out_of_bounds_points_ignored() {
        let mut map = unit_map();
        let points = vec![Vector3::new(-3.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0), Vector3::new(1.0, 9.0, 0.0)];
        assert_eq!(map.mark_occupied_points(&points), 1);
        assert_eq!(map.occupied_voxel_count(), 1);
        assert!(!map.is_occupied_at(&Vector3::new(-3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_clamp_to_voxel() {
        let map = unit_map();
        assert_eq!(map.clamp_to_voxel(&Vector3::new(-10.0, 0.0, 0.0)), VoxelIndex::new(0, 5, 5));
        assert_eq!(map.clamp_to_voxel(&Vector3::new(100.0, 100.0, 100.0)), VoxelIndex::new(20, 10, 10));
    }

    #[test]
    fn test_reset_search_state_keeps_occupancy() {
        let mut map = unit_map();
        map.mark_occupied(&Vector3::new(3.0, 0.0, 0.0));
        let voxel = map.coord_to_voxel(&Vector3::new(2.0, 0.0, 0.0)).unwrap();
        let index = map.linear_index(&voxel);
        {
            let cell = map.search_cell_mut(index);
            cell.tag = SearchTag::Closed;
            cell.g_score = 2.0;
            cell.parent = Some(0);
        }
        map.reset_search_state();
        assert_eq!(*map.search_cell(index), SearchCell::default());
        assert!(map.is_occupied_at(&Vector3::new(3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_occupied_points_are_centres() {
        let mut map = unit_map();
        map.mark_occupied(&Vector3::new(2.3, 1.2, -0.2));
        assert_eq!(map.occupied_points(), vec![Vector3::new(2.0, 1.0, 0.0)]);
    }
}
