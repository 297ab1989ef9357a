// Mission planning: replanning controller and its inputs/outputs

pub mod events;
pub mod pipeline;
pub mod replan_fsm;
pub mod trajectory_export;

pub use events::*;
pub use pipeline::*;
pub use replan_fsm::*;
pub use trajectory_export::*;
