// Path Planning algorithms module

pub mod a_star;
pub mod path_simplifier;
pub mod min_snap;
pub mod collision_checker;

pub use a_star::*;
pub use path_simplifier::*;
pub use min_snap::*;
pub use collision_checker::*;
