//! Replanning state machine
//!
//! A periodically ticked controller sequencing search, optimization and
//! collision checking, and deciding when to replan from a new state.
//!
//! Inputs arrive as [`PlannerEvent`]s on a channel and are applied at the start
//! of each tick, so every mutation of the planner context is serialized with
//! the state machine itself. Time is passed into [`ReplanController::tick`],
//! which keeps the machine deterministic and lets callers drive it from a
//! wall clock or a simulation clock alike.

use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use nalgebra::Vector3;

use crate::common::{PlannerConfig, PlannerError, PlannerResult, VisParams};
use crate::mapping::GridMap;
use crate::mission_planning::events::{event_channel, PlannerEvent};
use crate::mission_planning::pipeline::TrajectoryPipeline;
use crate::mission_planning::trajectory_export::{TrajectoryAction, TrajectoryExporter, TrajectoryMsg};
use crate::path_planning::PolynomialTrajectory;
use crate::utils::markers::{critical_waypoint_markers, raw_path_markers, trajectory_marker, VisualizationFrame};

/// Remaining time below which the goal counts as reached [s]
const GOAL_REACHED_MARGIN: f64 = 1e-2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlannerState {
    Init,
    WaitTarget,
    GenNewTraj,
    ExecTraj,
    ReplanTraj,
}

impl fmt::Display for PlannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlannerState::Init => "INIT",
            PlannerState::WaitTarget => "WAIT_TARGET",
            PlannerState::GenNewTraj => "GEN_NEW_TRAJ",
            PlannerState::ExecTraj => "EXEC_TRAJ",
            PlannerState::ReplanTraj => "REPLAN_TRAJ",
        };
        write!(f, "{}", name)
    }
}

/// Replanning hysteresis and timing
#[derive(Debug, Clone, PartialEq)]
pub struct ReplanConfig {
    /// No replanning while the vehicle is this close to the last replan source [m]
    pub thresh_replan: f64,
    /// No replanning while the vehicle is this close to the goal [m]
    pub thresh_no_replan: f64,
    /// Minimum time on a trajectory before replanning [s]
    pub cooldown: f64,
    /// How far ahead of now a replan is seeded [s]
    pub lookahead: f64,
    pub status_period_ticks: u64,
}

impl Default for ReplanConfig {
    fn default() -> Self {
        Self {
            thresh_replan: -1.0,
            thresh_no_replan: -1.0,
            cooldown: 1.0,
            lookahead: 0.05,
            status_period_ticks: 100,
        }
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: PlannerState,
    pub to: PlannerState,
    pub call_site: &'static str,
    pub time: f64,
}

/// Mutable planner state owned by the controller
pub struct PlannerContext {
    pub has_odom: bool,
    pub has_target: bool,
    pub odom_pos: Vector3<f64>,
    pub odom_vel: Vector3<f64>,
    /// Start of the current plan
    pub source_pos: Vector3<f64>,
    pub target_pos: Vector3<f64>,
    pub start_vel: Vector3<f64>,
    pub map: GridMap,
    /// Committed trajectory, replaced wholesale on every successful plan
    pub trajectory: Option<PolynomialTrajectory>,
    pub trajectory_start: f64,
}

impl PlannerContext {
    pub fn new(map: GridMap) -> Self {
        Self {
            has_odom: false,
            has_target: false,
            odom_pos: Vector3::zeros(),
            odom_vel: Vector3::zeros(),
            source_pos: Vector3::zeros(),
            target_pos: Vector3::zeros(),
            start_vel: Vector3::zeros(),
            map,
            trajectory: None,
            trajectory_start: 0.0,
        }
    }
}

/// What a tick hands to the outside world
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub trajectory: Option<TrajectoryMsg>,
    pub visualization: Option<VisualizationFrame>,
}

pub struct ReplanController {
    state: PlannerState,
    context: PlannerContext,
    pipeline: TrajectoryPipeline,
    exporter: TrajectoryExporter,
    config: ReplanConfig,
    vis: VisParams,
    sender: Sender<PlannerEvent>,
    receiver: Receiver<PlannerEvent>,
    history: Vec<Transition>,
    tick_count: u64,
    consecutive_failures: usize,
}

impl ReplanController {
    pub fn new(
        config: ReplanConfig,
        map: GridMap,
        pipeline: TrajectoryPipeline,
        exporter: TrajectoryExporter,
        vis: VisParams,
    ) -> Self {
        let (sender, receiver) = event_channel();
        Self {
            state: PlannerState::Init,
            context: PlannerContext::new(map),
            pipeline,
            exporter,
            config,
            vis,
            sender,
            receiver,
            history: Vec::new(),
            tick_count: 0,
            consecutive_failures: 0,
        }
    }

    pub fn from_config(config: &PlannerConfig) -> PlannerResult<Self> {
        config.validate()?;
        Ok(Self::new(
            config.replan_config(),
            config.build_grid_map()?,
            TrajectoryPipeline::from_config(config)?,
            TrajectoryExporter::new(&config.map_frame_name),
            config.vis.clone(),
        ))
    }

    /// Handle for event producers; may be cloned and sent across threads
    pub fn event_sender(&self) -> Sender<PlannerEvent> {
        self.sender.clone()
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn context(&self) -> &PlannerContext {
        &self.context
    }

    pub fn trajectory(&self) -> Option<&PolynomialTrajectory> {
        self.context.trajectory.as_ref()
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Drain pending events, then advance the state machine by one step
    pub fn tick(&mut self, now: f64) -> TickOutput {
        self.tick_count += 1;
        if self.config.status_period_ticks > 0 && self.tick_count % self.config.status_period_ticks == 0 {
            self.print_status();
        }

        let events: Vec<PlannerEvent> = self.receiver.try_iter().collect();
        for event in events {
            self.apply_event(event, now);
        }

        match self.state {
            PlannerState::Init => {
                if self.context.has_odom && self.context.has_target {
                    // a goal may have arrived before the first pose
                    self.context.source_pos = self.context.odom_pos;
                    self.context.start_vel = self.context.odom_vel;
                    self.change_state(PlannerState::WaitTarget, "STATE", now);
                }
                TickOutput::default()
            }
            PlannerState::WaitTarget => {
                if self.context.has_target {
                    self.change_state(PlannerState::GenNewTraj, "STATE", now);
                }
                TickOutput::default()
            }
            PlannerState::GenNewTraj => match self.generate(now, TrajectoryAction::Add) {
                Ok(output) => {
                    self.change_state(PlannerState::ExecTraj, "STATE", now);
                    output
                }
                Err(e) => {
                    let next = self.on_failure(e);
                    self.change_state(next, "STATE", now);
                    TickOutput::default()
                }
            },
            PlannerState::ExecTraj => {
                if let Some(next) = self.exec_step(now) {
                    self.change_state(next, "STATE", now);
                }
                TickOutput::default()
            }
            PlannerState::ReplanTraj => {
                self.seed_from_trajectory(now);
                match self.generate(now, TrajectoryAction::Replace) {
                    Ok(output) => {
                        self.change_state(PlannerState::ExecTraj, "STATE", now);
                        output
                    }
                    Err(e) => {
                        let next = self.on_failure(e);
                        self.change_state(next, "STATE", now);
                        TickOutput::default()
                    }
                }
            }
        }
    }

    fn apply_event(&mut self, event: PlannerEvent, now: f64) {
        match event {
            PlannerEvent::Odometry { position, velocity } => {
                self.context.odom_pos = position;
                self.context.odom_vel = velocity;
                self.context.has_odom = true;
            }
            PlannerEvent::Goal(goal) => self.on_goal(goal, now),
            PlannerEvent::Obstacles(points) => {
                let accepted = self.context.map.mark_occupied_points(&points);
                debug!("ingested {} of {} obstacle points", accepted, points.len());
            }
        }
    }

    fn on_goal(&mut self, goal: Vector3<f64>, now: f64) {
        if goal.z < 0.0 {
            warn!("ignoring goal {:?} below ground", goal);
            return;
        }

        self.context.source_pos = self.context.odom_pos;
        self.context.start_vel = self.context.odom_vel;
        self.context.target_pos = goal;
        self.context.has_target = true;
        info!("[Goal]: ({:.2}, {:.2}, {:.2})", goal.x, goal.y, goal.z);

        match self.state {
            PlannerState::WaitTarget => self.change_state(PlannerState::GenNewTraj, "TRIG", now),
            PlannerState::ExecTraj => self.change_state(PlannerState::ReplanTraj, "TRIG", now),
            _ => {}
        }
    }

    /// Next state while executing, `None` to keep following the trajectory
    fn exec_step(&mut self, now: f64) -> Option<PlannerState> {
        let total = match &self.context.trajectory {
            Some(trajectory) => trajectory.total_duration(),
            None => return Some(PlannerState::GenNewTraj),
        };
        let t_cur = (now - self.context.trajectory_start).min(total);

        if t_cur > total - GOAL_REACHED_MARGIN {
            self.context.has_target = false;
            return Some(PlannerState::WaitTarget);
        }
        if (self.context.target_pos - self.context.odom_pos).norm() < self.config.thresh_no_replan {
            return None;
        }
        if (self.context.source_pos - self.context.odom_pos).norm() < self.config.thresh_replan {
            return None;
        }
        if t_cur < self.config.cooldown {
            return None;
        }
        Some(PlannerState::ReplanTraj)
    }

    /// Start the next plan slightly ahead on the trajectory being executed
    fn seed_from_trajectory(&mut self, now: f64) {
        if let Some(trajectory) = &self.context.trajectory {
            let t = now - self.context.trajectory_start + self.config.lookahead;
            self.context.source_pos = trajectory.position_at(t);
            self.context.start_vel = trajectory.velocity_at(t);
        }
    }

    fn generate(&mut self, now: f64, action: TrajectoryAction) -> PlannerResult<TickOutput> {
        let result = self.pipeline.generate(
            &mut self.context.map,
            &self.context.source_pos,
            &self.context.target_pos,
            &self.context.start_vel,
        )?;

        let mut frame = VisualizationFrame::new();
        frame.extend(raw_path_markers(&result.dense_path.points));
        frame.extend(critical_waypoint_markers(&result.critical_waypoints()?));
        frame.push(trajectory_marker(&result.trajectory, self.vis.sample_dt, self.vis.traj_width));

        let msg = self.exporter.export(&result.trajectory, action, now);
        self.context.trajectory = Some(result.trajectory);
        self.context.trajectory_start = now;
        self.consecutive_failures = 0;

        Ok(TickOutput { trajectory: Some(msg), visualization: Some(frame) })
    }

    /// Classify a failed planning attempt and pick the state to retry from
    fn on_failure(&mut self, err: PlannerError) -> PlannerState {
        if let PlannerError::AlreadyAtGoal = err {
            info!("already at goal ({:?})", self.context.target_pos);
            self.context.has_target = false;
            return PlannerState::WaitTarget;
        }

        self.consecutive_failures += 1;
        if err.is_recoverable() {
            warn!("planning failed ({} in a row): {}", self.consecutive_failures, err);
        } else {
            error!("planning attempt aborted ({} in a row): {}", self.consecutive_failures, err);
        }
        PlannerState::GenNewTraj
    }

    fn change_state(&mut self, to: PlannerState, call_site: &'static str, now: f64) {
        info!("[{}]: from {} to {}", call_site, self.state, to);
        self.history.push(Transition { from: self.state, to, call_site, time: now });
        self.state = to;
    }

    fn print_status(&self) {
        debug!("[Clock]: state: {}", self.state);
        if !self.context.has_odom {
            debug!("no odom.");
        }
        if !self.context.has_target {
            debug!("wait for goal.");
        }
    }
}
