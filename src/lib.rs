//! quad_planner - online trajectory replanning for quadrotors
//!
//! This crate searches a voxel map for a collision-free path, reduces it to a
//! few critical waypoints, fits a minimum-snap polynomial trajectory through
//! them and refines the waypoint set until the trajectory clears every
//! obstacle. A periodically ticked state machine decides when to replan.

// Core modules
pub mod common;
pub mod utils;

// Planning stages
pub mod mapping;
pub mod path_planning;
pub mod mission_planning;

// Re-export common types for convenience
pub use common::{BoundaryConditions, Path3D, VoxelIndex};
pub use common::{OccupancyQuery, PathSearch};
pub use common::{PlannerConfig, PlannerError, PlannerResult};
pub use mapping::GridMap;
pub use mission_planning::{PlannerEvent, ReplanController, TrajectoryPipeline};
pub use path_planning::{PolynomialTrajectory, Solver};
