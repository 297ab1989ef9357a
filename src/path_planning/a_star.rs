//! A* path search over the 3-D voxel grid
//!
//! Classic A* with a Euclidean heuristic. Occupied voxels are never expanded.
//! The per-voxel search records live in the grid's arena, so a query only
//! touches the cells it actually reaches and the reset afterwards is cheap.
//!
//! The open set is a binary heap keyed on `(f, insertion sequence)`: equal
//! f-scores pop in the order they were pushed, which keeps results
//! reproducible for the same map and endpoints.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::{debug, trace};
use nalgebra::Vector3;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::common::{Path3D, PathSearch, PlannerError, PlannerResult, VoxelIndex};
use crate::mapping::{GridMap, SearchTag};

/// Neighbourhood used when expanding a voxel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Face neighbours only
    Six,
    /// Faces and edges
    Eighteen,
    /// Faces, edges and corners
    TwentySix,
}

/// Configuration for the A* planner
#[derive(Debug, Clone, PartialEq)]
pub struct AStarConfig {
    /// Heuristic weight (1.0 = optimal, >1.0 = faster but suboptimal)
    pub heuristic_weight: f64,
    /// Maximum number of voxel expansions before giving up
    pub max_iterations: usize,
    pub connectivity: Connectivity,
}

impl Default for AStarConfig {
    fn default() -> Self {
        Self {
            heuristic_weight: 1.0,
            max_iterations: 1_000_000,
            connectivity: Connectivity::TwentySix,
        }
    }
}

/// Open set entry (min-heap on f, then insertion order)
#[derive(Debug)]
struct PriorityNode {
    f_score: OrderedFloat<f64>,
    sequence: u64,
    index: usize,
}

impl Eq for PriorityNode {}

impl PartialEq for PriorityNode {
    fn eq(&self, other: &Self) -> bool {
        self.f_score == other.f_score && self.sequence == other.sequence
    }
}

impl Ord for PriorityNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        (other.f_score, other.sequence).cmp(&(self.f_score, self.sequence))
    }
}

impl PartialOrd for PriorityNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct AStarPlanner {
    config: AStarConfig,
    motion: Vec<(i32, i32, i32, f64)>,
}

impl AStarPlanner {
    pub fn new(config: AStarConfig) -> Self {
        let motion = Self::get_motion_model(config.connectivity);
        AStarPlanner { config, motion }
    }

    pub fn config(&self) -> &AStarConfig {
        &self.config
    }

    fn calc_heuristic(&self, a: &VoxelIndex, b: &VoxelIndex) -> f64 {
        let dx = (a.x - b.x) as f64;
        let dy = (a.y - b.y) as f64;
        let dz = (a.z - b.z) as f64;
        self.config.heuristic_weight * (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// dx, dy, dz, cost in cell units
    fn get_motion_model(connectivity: Connectivity) -> Vec<(i32, i32, i32, f64)> {
        let max_axes = match connectivity {
            Connectivity::Six => 1,
            Connectivity::Eighteen => 2,
            Connectivity::TwentySix => 3,
        };
        let mut motion = Vec::with_capacity(26);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let axes = (dx != 0) as i32 + (dy != 0) as i32 + (dz != 0) as i32;
                    if axes == 0 || axes > max_axes {
                        continue;
                    }
                    motion.push((dx, dy, dz, (axes as f64).sqrt()));
                }
            }
        }
        motion
    }

    fn endpoint_voxel(map: &GridMap, point: &Vector3<f64>, role: &str) -> PlannerResult<VoxelIndex> {
        let voxel = map.coord_to_voxel(point).ok_or_else(|| {
            PlannerError::NoPathFound(format!("{} {:?} is outside the map", role, point))
        })?;
        if map.is_occupied(&voxel) {
            return Err(PlannerError::NoPathFound(format!(
                "{} {:?} lies in an occupied voxel",
                role, point
            )));
        }
        Ok(voxel)
    }

    fn search(
        &self,
        map: &mut GridMap,
        start: VoxelIndex,
        goal: VoxelIndex,
    ) -> PlannerResult<Path3D> {
        let start_index = map.linear_index(&start);
        let goal_index = map.linear_index(&goal);

        let mut open_set = BinaryHeap::new();
        let mut sequence = 0u64;

        let h = self.calc_heuristic(&start, &goal);
        {
            let cell = map.search_cell_mut(start_index);
            cell.tag = SearchTag::Open;
            cell.g_score = 0.0;
            cell.f_score = h;
        }
        open_set.push(PriorityNode { f_score: OrderedFloat(h), sequence, index: start_index });

        let mut iteration = 0usize;
        while let Some(current) = open_set.pop() {
            if map.search_cell(current.index).tag == SearchTag::Closed {
                // stale entry
                continue;
            }

            iteration += 1;
            if iteration > self.config.max_iterations {
                return Err(PlannerError::NoPathFound(format!(
                    "search budget of {} expansions exhausted",
                    self.config.max_iterations
                )));
            }

            if current.index == goal_index {
                debug!("A* reached goal after {} expansions", iteration);
                return Ok(self.calc_final_path(map, goal_index));
            }

            let current_g = {
                let cell = map.search_cell_mut(current.index);
                cell.tag = SearchTag::Closed;
                cell.g_score
            };
            let current_voxel = map.voxel_from_linear(current.index);

            for &(dx, dy, dz, cost) in &self.motion {
                let next = current_voxel.offset(dx, dy, dz);
                if !map.contains_voxel(&next) || map.is_occupied(&next) {
                    continue;
                }
                let next_index = map.linear_index(&next);
                let tentative_g = current_g + cost;

                let cell = map.search_cell(next_index);
                if cell.tag == SearchTag::Closed || tentative_g >= cell.g_score {
                    continue;
                }

                let f = tentative_g + self.calc_heuristic(&next, &goal);
                let cell = map.search_cell_mut(next_index);
                cell.tag = SearchTag::Open;
                cell.g_score = tentative_g;
                cell.f_score = f;
                cell.parent = Some(current.index);

                sequence += 1;
                open_set.push(PriorityNode { f_score: OrderedFloat(f), sequence, index: next_index });
            }
        }

        trace!("A* open set exhausted after {} expansions", iteration);
        Err(PlannerError::NoPathFound("goal is unreachable".to_string()))
    }

    fn calc_final_path(&self, map: &GridMap, goal_index: usize) -> Path3D {
        let mut points = Vec::new();
        let mut current = Some(goal_index);
        while let Some(index) = current {
            points.push(map.voxel_to_coord(&map.voxel_from_linear(index)));
            current = map.search_cell(index).parent;
        }
        points.reverse();
        Path3D::from_points(points)
    }
}

impl Default for AStarPlanner {
    fn default() -> Self {
        Self::new(AStarConfig::default())
    }
}

impl PathSearch for AStarPlanner {
    fn find_path(
        &self,
        map: &mut GridMap,
        start: &Vector3<f64>,
        goal: &Vector3<f64>,
    ) -> PlannerResult<Path3D> {
        map.reset_search_state();
        let start_voxel = Self::endpoint_voxel(map, start, "start")?;
        let goal_voxel = Self::endpoint_voxel(map, goal, "goal")?;

        let result = self.search(map, start_voxel, goal_voxel);
        map.reset_search_state();
        result
    }
}
