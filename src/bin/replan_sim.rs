//! Closed-loop replanning simulation
//!
//! Drives the replanning controller with a simulated vehicle that tracks the
//! committed trajectory, random pillar obstacles and a list of goals. Every
//! exported trajectory is written as one JSON line.
//!
//! Usage:
//!   cargo run --bin replan_sim -- --config params/planner.toml --goal 8,6,1.5 --goal -5,4,2
//!   RUST_LOG=debug cargo run --bin replan_sim -- --plot sim.png

use std::fs::File;
use std::io::{self, BufWriter, Write};

use clap::Parser;
use log::{error, info};
use nalgebra::Vector3;
use rand::prelude::*;
use rand_distr::{Normal, Uniform};

use quad_planner::mission_planning::{PlannerEvent, PlannerState, ReplanController};
use quad_planner::utils::Visualizer;
use quad_planner::{PlannerConfig, PlannerError, PlannerResult};

/// Replanning simulation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Parameter file; built-in defaults when absent
    #[arg(short, long)]
    config: Option<String>,

    /// Goal as x,y,z; repeat for a sequence of goals
    #[arg(short, long = "goal", value_parser = parse_goal, allow_hyphen_values = true)]
    goals: Vec<Vector3<f64>>,

    /// Simulated time [s]
    #[arg(short, long, default_value = "60.0")]
    duration: f64,

    /// Seed for obstacles and odometry noise
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of random pillar obstacles
    #[arg(long, default_value = "20")]
    obstacles: usize,

    /// Standard deviation of the position noise on odometry [m]
    #[arg(long, default_value = "0.0")]
    odom_noise: f64,

    /// Trajectory output file (JSON lines); stdout when absent
    #[arg(short, long)]
    output: Option<String>,

    /// Save the final scene to this PNG
    #[arg(long)]
    plot: Option<String>,
}

fn parse_goal(s: &str) -> Result<Vector3<f64>, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{}: {}", v, e)))
        .collect::<Result<_, _>>()?;
    match values.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got {}", s)),
    }
}

/// Vertical columns of obstacle points, kept clear of the start and the goals
fn pillar_obstacles(
    config: &PlannerConfig,
    count: usize,
    keep_clear: &[Vector3<f64>],
    rng: &mut StdRng,
) -> Vec<Vector3<f64>> {
    let (lower, upper) = config.map_bounds();
    let resolution = config.map.resolution;
    let x_dist = Uniform::new(lower.x, upper.x);
    let y_dist = Uniform::new(lower.y, upper.y);
    let mut points = Vec::new();
    let mut placed = 0;
    while placed < count {
        let x = x_dist.sample(rng);
        let y = y_dist.sample(rng);
        let too_close = keep_clear
            .iter()
            .any(|p| (Vector3::new(x, y, p.z) - p).norm() < 1.5);
        if too_close {
            continue;
        }
        let mut z = lower.z + resolution / 2.0;
        while z < upper.z {
            points.push(Vector3::new(x, y, z));
            z += resolution;
        }
        placed += 1;
    }
    points
}

fn open_output(path: &Option<String>) -> PlannerResult<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

fn run(args: Args) -> PlannerResult<()> {
    let config = match &args.config {
        Some(path) => PlannerConfig::load(path)?,
        None => PlannerConfig::default(),
    };
    let mut controller = ReplanController::from_config(&config)?;
    let events = controller.event_sender();
    let mut rng = StdRng::seed_from_u64(args.seed);
    let noise = Normal::new(0.0, args.odom_noise)
        .map_err(|e| PlannerError::InvalidParameter(format!("odom_noise: {}", e)))?;

    let start = Vector3::new(0.0, 0.0, 1.0);
    let goals = if args.goals.is_empty() {
        vec![Vector3::new(8.0, 6.0, 1.5)]
    } else {
        args.goals.clone()
    };
    let mut keep_clear = goals.clone();
    keep_clear.push(start);

    let obstacles = pillar_obstacles(&config, args.obstacles, &keep_clear, &mut rng);
    info!("{} pillars, {} obstacle points", args.obstacles, obstacles.len());
    let _ = events.send(PlannerEvent::Obstacles(obstacles));

    let mut output = open_output(&args.output)?;
    let dt = 1.0 / config.replanning.tick_rate_hz;
    let mut pending_goals = goals.iter();
    let mut vehicle = start;
    let mut last_frame = None;
    let mut exported = 0;

    let steps = (args.duration / dt).ceil() as usize;
    for step in 0..steps {
        let now = step as f64 * dt;

        let (position, velocity) = match controller.trajectory() {
            Some(trajectory) => {
                let t = now - controller.context().trajectory_start;
                (trajectory.position_at(t), trajectory.velocity_at(t))
            }
            None => (vehicle, Vector3::zeros()),
        };
        vehicle = position;
        let measured = position.map(|v| v + noise.sample(&mut rng));
        let _ = events.send(PlannerEvent::odometry(measured, velocity));

        let idle = matches!(controller.state(), PlannerState::Init | PlannerState::WaitTarget);
        if idle && !controller.context().has_target {
            match pending_goals.next() {
                Some(goal) => {
                    let _ = events.send(PlannerEvent::Goal(*goal));
                }
                None if controller.state() == PlannerState::WaitTarget => {
                    info!("all goals reached at {:.2} s", now);
                    break;
                }
                None => {}
            }
        }

        let tick = controller.tick(now);
        if let Some(msg) = tick.trajectory {
            writeln!(output, "{}", msg.to_json()?)?;
            exported += 1;
        }
        if tick.visualization.is_some() {
            last_frame = tick.visualization;
        }
    }
    output.flush()?;
    info!(
        "exported {} trajectories, final state {}, vehicle at ({:.2}, {:.2}, {:.2})",
        exported,
        controller.state(),
        vehicle.x,
        vehicle.y,
        vehicle.z
    );

    if let Some(path) = &args.plot {
        let mut vis = Visualizer::new();
        vis.set_title("Replanning simulation")
            .set_z_range(0.0, config.map.z_size)
            .plot_obstacles(&controller.context().map.occupied_points())
            .plot_start(start)
            .plot_vehicle(vehicle);
        for goal in &goals {
            vis.plot_goal(*goal);
        }
        if let Some(frame) = &last_frame {
            vis.plot_frame(frame);
        }
        vis.save_png(path, 1200, 900)?;
        info!("scene saved to {}", path);
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
