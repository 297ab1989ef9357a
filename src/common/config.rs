//! Planner parameters
//!
//! Read once at startup from a TOML file. Every section falls back to the
//! defaults below, so a parameter file only needs the keys it overrides.

use std::fs::read_to_string;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::common::error::{PlannerError, PlannerResult};
use crate::mapping::GridMap;
use crate::mission_planning::ReplanConfig;
use crate::path_planning::a_star::{AStarConfig, Connectivity};
use crate::path_planning::min_snap::{MinSnapConfig, Solver};

/// Voxel map extents, centred on the origin in x/y and starting at the ground in z
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MapParams {
    pub resolution: f64,
    pub x_size: f64,
    pub y_size: f64,
    pub z_size: f64,
}

impl Default for MapParams {
    fn default() -> Self {
        Self { resolution: 0.2, x_size: 50.0, y_size: 50.0, z_size: 5.0 }
    }
}

/// Kinematic limits, polynomial orders and search options
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlanningParams {
    pub vel: f64,
    pub acc: f64,
    pub min_order: usize,
    pub t_order: usize,
    /// Continuity order; `t_order - 1` when absent
    pub c_order: Option<usize>,
    pub solver: Solver,
    pub max_search_iterations: usize,
    pub connectivity: Connectivity,
}

impl Default for PlanningParams {
    fn default() -> Self {
        Self {
            vel: 1.0,
            acc: 1.0,
            min_order: 3,
            t_order: 4,
            c_order: None,
            solver: Solver::Analytic,
            max_search_iterations: 1_000_000,
            connectivity: Connectivity::TwentySix,
        }
    }
}

/// Path simplification tolerance [m]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathParams {
    pub resolution: f64,
}

impl Default for PathParams {
    fn default() -> Self {
        Self { resolution: 0.05 }
    }
}

/// Trajectory sampling step for collision detection [s]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CollisionParams {
    pub resolution: f64,
}

impl Default for CollisionParams {
    fn default() -> Self {
        Self { resolution: 0.05 }
    }
}

/// Replanning hysteresis and timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplanningParams {
    pub thresh_replan: f64,
    pub thresh_no_replan: f64,
    pub cooldown: f64,
    pub lookahead: f64,
    pub max_refinements: usize,
    pub tick_rate_hz: f64,
    pub status_period_ticks: u64,
}

impl Default for ReplanningParams {
    fn default() -> Self {
        Self {
            thresh_replan: -1.0,
            thresh_no_replan: -1.0,
            cooldown: 1.0,
            lookahead: 0.05,
            max_refinements: 10,
            tick_rate_hz: 100.0,
            status_period_ticks: 100,
        }
    }
}

/// Marker styling for the visualization export
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VisParams {
    pub traj_width: f64,
    pub sample_dt: f64,
}

impl Default for VisParams {
    fn default() -> Self {
        Self { traj_width: 0.15, sample_dt: 0.01 }
    }
}

/// Complete planner configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub map_frame_name: String,
    pub map: MapParams,
    pub planning: PlanningParams,
    pub path: PathParams,
    pub collision_detection: CollisionParams,
    pub replanning: ReplanningParams,
    pub vis: VisParams,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            map_frame_name: "world".to_string(),
            map: MapParams::default(),
            planning: PlanningParams::default(),
            path: PathParams::default(),
            collision_detection: CollisionParams::default(),
            replanning: ReplanningParams::default(),
            vis: VisParams::default(),
        }
    }
}

impl PlannerConfig {
    /// Load and validate a parameter file
    pub fn load<P: AsRef<Path>>(path: P) -> PlannerResult<Self> {
        let params_str = read_to_string(path.as_ref())?;
        Self::from_toml_str(&params_str)
    }

    /// Parse and validate parameters from a TOML string
    pub fn from_toml_str(params_str: &str) -> PlannerResult<Self> {
        let config: PlannerConfig = toml::from_str(params_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Objective derivative order, never below `min_order`
    pub fn t_order(&self) -> usize {
        self.planning.t_order.max(self.planning.min_order)
    }

    /// Continuity order at interior waypoints
    pub fn c_order(&self) -> usize {
        self.planning
            .c_order
            .unwrap_or_else(|| self.t_order().saturating_sub(1))
    }

    pub fn validate(&self) -> PlannerResult<()> {
        let positive = [
            ("map.resolution", self.map.resolution),
            ("map.x_size", self.map.x_size),
            ("map.y_size", self.map.y_size),
            ("map.z_size", self.map.z_size),
            ("planning.vel", self.planning.vel),
            ("planning.acc", self.planning.acc),
            ("path.resolution", self.path.resolution),
            ("collision_detection.resolution", self.collision_detection.resolution),
            ("replanning.tick_rate_hz", self.replanning.tick_rate_hz),
            ("vis.sample_dt", self.vis.sample_dt),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PlannerError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.replanning.cooldown < 0.0 || self.replanning.lookahead < 0.0 {
            return Err(PlannerError::InvalidParameter(
                "replanning.cooldown and replanning.lookahead must not be negative".to_string(),
            ));
        }
        self.min_snap_config().validate()
    }

    /// Lower and upper corners of the voxel map
    pub fn map_bounds(&self) -> (Vector3<f64>, Vector3<f64>) {
        let lower = Vector3::new(-self.map.x_size / 2.0, -self.map.y_size / 2.0, 0.0);
        let upper = Vector3::new(self.map.x_size / 2.0, self.map.y_size / 2.0, self.map.z_size);
        (lower, upper)
    }

    pub fn build_grid_map(&self) -> PlannerResult<GridMap> {
        let (lower, upper) = self.map_bounds();
        GridMap::new(self.map.resolution, lower, upper)
    }

    pub fn astar_config(&self) -> AStarConfig {
        AStarConfig {
            max_iterations: self.planning.max_search_iterations,
            connectivity: self.planning.connectivity,
            ..Default::default()
        }
    }

    pub fn min_snap_config(&self) -> MinSnapConfig {
        MinSnapConfig {
            t_order: self.t_order(),
            c_order: self.c_order(),
            max_vel: self.planning.vel,
            max_acc: self.planning.acc,
        }
    }

    pub fn replan_config(&self) -> ReplanConfig {
        ReplanConfig {
            thresh_replan: self.replanning.thresh_replan,
            thresh_no_replan: self.replanning.thresh_no_replan,
            cooldown: self.replanning.cooldown,
            lookahead: self.replanning.lookahead,
            status_period_ticks: self.replanning.status_period_ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_derive_orders() {
        let config = PlannerConfig::default();
        assert_eq!(config.t_order(), 4);
        assert_eq!(config.c_order(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_order_clamps_objective() {
        let config = PlannerConfig::from_toml_str(
            r#"
            [planning]
            t_order = 2
            min_order = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.t_order(), 3);
        assert_eq!(config.c_order(), 2);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = PlannerConfig::from_toml_str(
            r#"
            map_frame_name = "map"

            [map]
            resolution = 0.5

            [planning]
            solver = "numeric"
            connectivity = "six"

            [replanning]
            thresh_replan = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(config.map_frame_name, "map");
        assert_eq!(config.map.resolution, 0.5);
        assert_eq!(config.map.x_size, 50.0);
        assert_eq!(config.planning.solver, Solver::Numeric);
        assert_eq!(config.planning.connectivity, Connectivity::Six);
        assert_eq!(config.replanning.thresh_replan, 1.5);
        assert_eq!(config.replanning.thresh_no_replan, -1.0);
    }

    #[test]
    fn test_empty_file_uses_world_frame() {
        let config = PlannerConfig::from_toml_str("").unwrap();
        assert_eq!(config.map_frame_name, "world");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            PlannerConfig::from_toml_str("[planning]\nvel = 0.0\n"),
            Err(PlannerError::InvalidParameter(_))
        ));
        assert!(matches!(
            PlannerConfig::from_toml_str("[planning]\nc_order = 1\nt_order = 4\n"),
            Err(PlannerError::InvalidParameter(_))
        ));
        assert!(matches!(
            PlannerConfig::from_toml_str("[map]\nresolution = \"fine\"\n"),
            Err(PlannerError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_map_bounds() {
        let config = PlannerConfig::default();
        let (lower, upper) = config.map_bounds();
        assert_eq!(lower, Vector3::new(-25.0, -25.0, 0.0));
        assert_eq!(upper, Vector3::new(25.0, 25.0, 5.0));
        let map = config.build_grid_map().unwrap();
        assert_eq!(map.dimensions(), (250, 250, 25));
    }
}
