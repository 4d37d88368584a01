//! Closed-loop localization simulator.
//!
//! Drives a simulated robot around a synthetic walled room with a pillar,
//! generates noisy range readings by ray casting from the true pose, and
//! runs the particle filter on them. Pose error is logged as it goes.
//!
//! Usage:
//!   cargo run --release --bin mcl_sim
//!   cargo run --release --bin mcl_sim -- --config mcl.toml --steps 400
//!   cargo run --release --bin mcl_sim -- --kidnap-at 150
//!
//! Enable per-step diagnostics:
//!   RUST_LOG=debug cargo run --release --bin mcl_sim

use std::f32::consts::TAU;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use dhruva_mcl::math::{angle_diff, normalize_angle};
use dhruva_mcl::{
    InitStrategy, LaserScan, MclConfig, MotionModel, OccupancyGrid, ParticleFilter, Pose2D,
    RayCast, ResamplingMode, Twist2D, UpdateSummary,
};

/// Room size in world units.
const ROOM_WIDTH: f32 = 6.0;
const ROOM_HEIGHT: f32 = 4.0;

/// Seconds per simulation step.
const DT: f32 = 0.1;

/// Monte Carlo localization simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (defaults used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of simulation steps
    #[arg(long, default_value = "300")]
    steps: usize,

    /// Random seed for the robot and the filter
    #[arg(long, default_value = "7")]
    seed: u64,

    /// Teleport the robot to a random free cell at this step
    #[arg(long)]
    kidnap_at: Option<usize>,

    /// Number of range readings per scan
    #[arg(long, default_value = "180")]
    beams: usize,

    /// Use every n-th reading of a scan in the filter
    #[arg(long, default_value = "5")]
    subsample: usize,

    /// Forward speed in world units per second
    #[arg(long, default_value = "0.4")]
    speed: f32,

    /// Range reading noise (standard deviation, world units)
    #[arg(long, default_value = "0.02")]
    range_noise: f32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        log::error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => MclConfig::load(path)?,
        None => MclConfig::default(),
    };

    log::info!("mcl_sim starting");
    log::info!(
        "  Particles: {} ({:?} resampling)",
        config.filter.num_particles,
        config.filter.resampling
    );
    log::info!("  Motion model: {:?}", config.motion.model);
    log::info!(
        "  Steps: {}, beams: {} (every {} used)",
        args.steps,
        args.beams,
        args.subsample.max(1)
    );

    let mut grid = build_room(&config)?;
    grid.build_cache(config.map.angle_resolution())?;
    let grid = Arc::new(grid);

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let mut world_rng = SmallRng::seed_from_u64(args.seed.wrapping_mul(31).wrapping_add(1));

    let mut robot = Pose2D::new(1.0, 1.0, 0.3);
    let mut odom = Pose2D::identity();

    let strategy = match config.filter.resampling {
        ResamplingMode::Augmented => InitStrategy::FreeMapRandomHeading,
        ResamplingMode::Plain => InitStrategy::DiskGaussianHeading {
            radius: 0.2,
            heading_variance: 0.02,
        },
    };

    let mut filter = ParticleFilter::new(config.clone(), Arc::clone(&grid))?;
    filter.initialize(&strategy, robot, &mut rng)?;

    let drift = Normal::new(0.0f32, 0.01)?;
    let range_noise = Normal::new(0.0f32, args.range_noise.max(0.0))?;
    let max_range = config.measurement.max_range as f32;

    let mut last: Option<UpdateSummary> = None;
    for step in 1..=args.steps {
        if args.kidnap_at == Some(step) {
            let p = grid.sample_free_cell(0.0, 1000, &mut world_rng)?;
            robot = Pose2D::from_point(p, world_rng.random_range(-TAU / 2.0..TAU / 2.0));
            log::warn!(
                "Step {}: robot kidnapped to ({:.2}, {:.2})",
                step,
                robot.x,
                robot.y
            );
        }

        let control = steer(&grid, &robot, args.speed);
        let next = clamp_to_free(&grid, &robot, robot.compose(&motion_delta(&control)));
        let mut delta = robot.inverse().compose(&next);
        delta.theta = normalize_angle(delta.theta);
        robot = next;

        let noisy = Pose2D::new(
            delta.x + drift.sample(&mut world_rng) * delta.x.abs(),
            delta.y,
            delta.theta + drift.sample(&mut world_rng) * delta.theta.abs(),
        );
        odom = odom.compose(&noisy);

        let mut laser = scan(&grid, &robot, args.beams, max_range, &range_noise, &mut world_rng);
        laser.preprocess(&config.scan);
        let readings = laser.subsample(args.subsample);

        let summary = match config.motion.model {
            MotionModel::Odometry => filter.update_with_odometry(odom, &readings, &mut rng)?,
            MotionModel::Velocity => {
                filter.update_with_velocity(control, DT, &readings, &mut rng)?
            }
        };

        if let Some(estimate) = filter.estimate() {
            let position_error = estimate.distance_to(&robot);
            let heading_error = angle_diff(robot.theta, estimate.theta).abs();
            log::debug!(
                "Step {}: N_eff {:.1}, resampled {}, injected {}, error {:.3} / {:.3} rad",
                step,
                summary.neff,
                summary.resampled,
                summary.injected,
                position_error,
                heading_error
            );
            if step % 20 == 0 || step == args.steps {
                log::info!(
                    "Step {}: true ({:.2}, {:.2}, {:.2}) est ({:.2}, {:.2}, {:.2}) error {:.3}",
                    step,
                    robot.x,
                    robot.y,
                    robot.theta,
                    estimate.x,
                    estimate.y,
                    estimate.theta,
                    position_error
                );
            }
        }
        if let Some(anomaly) = summary.anomaly {
            log::warn!("Step {}: {}", step, anomaly);
        }
        last = Some(summary);
    }

    if let (Some(summary), Some(estimate)) = (last, filter.estimate()) {
        log::info!(
            "Finished after {} updates: position error {:.3}, N_eff {:.1}",
            summary.iteration,
            estimate.distance_to(&robot),
            summary.neff
        );
        if let Some(cov) = filter.covariance() {
            log::info!(
                "  Spread: σx {:.3}, σy {:.3}, σθ {:.3}",
                cov.var_x().sqrt(),
                cov.var_y().sqrt(),
                cov.var_theta().sqrt()
            );
        }
    }
    Ok(())
}

/// Walled room with a square pillar left of centre.
fn build_room(config: &MclConfig) -> dhruva_mcl::Result<OccupancyGrid> {
    let geometry = config.map.geometry();
    let res = geometry.resolution;
    let width = (ROOM_WIDTH / res).round() as usize + 1;
    let height = (ROOM_HEIGHT / res).round() as usize + 1;

    let pillar_x = (2.2 / res) as usize..(2.8 / res) as usize;
    let pillar_y = (1.6 / res) as usize..(2.4 / res) as usize;

    let mut cells = vec![0.0f32; width * height];
    for y in 0..height {
        for x in 0..width {
            let wall = x == 0 || y == 0 || x == width - 1 || y == height - 1;
            let pillar = pillar_x.contains(&x) && pillar_y.contains(&y);
            if wall || pillar {
                cells[y * width + x] = 1.0;
            }
        }
    }

    log::info!(
        "Room: {}x{} cells at {:.3} per cell",
        width,
        height,
        res
    );
    OccupancyGrid::from_probabilities(width, height, cells, geometry)
}

/// Drive forward, turning in place while an obstacle is close ahead.
fn steer(grid: &OccupancyGrid, pose: &Pose2D, speed: f32) -> Twist2D {
    let clearance = grid
        .world_to_grid(pose.x, pose.y)
        .and_then(|(gx, gy)| grid.cast_ray(gx, gy, pose.theta).distance())
        .unwrap_or(0.0);
    if clearance < 0.6 {
        Twist2D::new(0.0, 1.2)
    } else {
        Twist2D::new(speed, 0.15)
    }
}

/// Robot-frame pose change of one step under `control`.
fn motion_delta(control: &Twist2D) -> Pose2D {
    let dtheta = control.angular * DT;
    let arc = control.linear * DT;
    // Chord of the arc, at the mean heading
    let chord = if dtheta.abs() > 1e-6 {
        2.0 * arc / dtheta * (dtheta / 2.0).sin()
    } else {
        arc
    };
    Pose2D::new(
        chord * (dtheta / 2.0).cos(),
        chord * (dtheta / 2.0).sin(),
        dtheta,
    )
}

/// Keep the robot in free space; blocked moves only rotate.
fn clamp_to_free(grid: &OccupancyGrid, prev: &Pose2D, next: Pose2D) -> Pose2D {
    let free = grid
        .world_to_grid(next.x, next.y)
        .is_some_and(|(gx, gy)| !grid.is_occupied(gx, gy));
    if free {
        Pose2D::new(next.x, next.y, normalize_angle(next.theta))
    } else {
        Pose2D::new(prev.x, prev.y, normalize_angle(next.theta))
    }
}

/// Full-turn noisy scan seen from the true pose.
fn scan<R: Rng + ?Sized>(
    grid: &OccupancyGrid,
    pose: &Pose2D,
    beams: usize,
    max_range: f32,
    noise: &Normal<f32>,
    rng: &mut R,
) -> LaserScan {
    let beams = beams.max(1);
    let increment = TAU / beams as f32;

    let ranges = match grid.world_to_grid(pose.x, pose.y) {
        Some((gx, gy)) => (0..beams)
            .map(|k| match grid.cast_ray(gx, gy, pose.theta + k as f32 * increment) {
                RayCast::Hit { distance, .. } => {
                    (distance + noise.sample(rng)).clamp(0.0, max_range)
                }
                _ => max_range,
            })
            .collect(),
        None => Vec::new(),
    };
    LaserScan::new(0.0, increment, 0.05, max_range, ranges)
}
