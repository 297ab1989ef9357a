// Mapping module

pub mod grid_map;

pub use grid_map::*;
