//! Asynchronous planner inputs
//!
//! Producers (odometry, goal and obstacle feeds) may live on any thread; the
//! controller owns the single receiver and drains it at the start of a tick.

use crossbeam_channel::{unbounded, Receiver, Sender};
use nalgebra::Vector3;

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerEvent {
    /// Latest pose estimate
    Odometry {
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    },
    /// New navigation target
    Goal(Vector3<f64>),
    /// Points observed on obstacles
    Obstacles(Vec<Vector3<f64>>),
}

impl PlannerEvent {
    pub fn odometry(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        PlannerEvent::Odometry { position, velocity }
    }
}

pub fn event_channel() -> (Sender<PlannerEvent>, Receiver<PlannerEvent>) {
    unbounded()
}
