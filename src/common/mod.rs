//! Common types, traits, configuration and error definitions for quad_planner
//!
//! This module provides the foundational building blocks used across
//! all planning stages in this crate.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
