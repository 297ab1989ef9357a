//! Utility modules for quad_planner

pub mod markers;
pub mod visualization;

pub use markers::*;
pub use visualization::{colors, Visualizer};
