//! End-to-end localization tests.
//!
//! Full predict/weight/resample cycles against synthetic maps with scans
//! generated by ray casting from the true pose.

mod common;

use approx::assert_relative_eq;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use dhruva_mcl::algorithms::localization::beam_likelihood;
use dhruva_mcl::math::angle_diff;
use dhruva_mcl::{
    InitStrategy, MclConfig, MotionNoise, ParticleFilter, Pose2D, RangeReading, ResamplingMode,
    UpdateSummary,
};

// ============================================================================
// Single cycle on a free grid
// ============================================================================

#[test]
fn test_matching_reading_keeps_weights_equal() {
    let grid = common::free_grid(10, 10, 1.0, 1.0);
    let mut config = MclConfig::default();
    config.filter.num_particles = 1000;
    config.motion.noise = MotionNoise::zero();
    let params = config.measurement;

    let mut filter = ParticleFilter::new(config, grid).unwrap();
    let mut rng = SmallRng::seed_from_u64(1);
    filter
        .initialize(&InitStrategy::AtPose, Pose2D::new(2.0, 5.0, 0.0), &mut rng)
        .unwrap();

    filter
        .predict_odometry(Pose2D::new(1.0, 0.0, 0.0), &mut rng)
        .unwrap();
    for p in filter.particles() {
        assert_relative_eq!(p.pose.x, 3.0, epsilon = 1e-5);
        assert_relative_eq!(p.pose.y, 5.0, epsilon = 1e-5);
        assert_relative_eq!(p.pose.theta, 0.0, epsilon = 1e-6);
    }

    // Nothing to hit on a free grid: the expected reading is max range
    let reading = RangeReading::new(0.0, params.max_range as f32);
    filter.weight(&[reading]).unwrap();

    // Weights are stored relative to the best particle
    let peak = beam_likelihood(params.max_range, params.max_range, &params);
    for p in filter.particles() {
        assert_eq!(p.weight, 1.0);
    }
    assert_relative_eq!(
        filter.state().unwrap().log_scale(),
        peak.ln(),
        max_relative = 1e-12
    );
    for i in 1..80 {
        let observed = i as f64 * 0.1;
        assert!(beam_likelihood(observed, params.max_range, &params) <= peak);
    }

    let outcome = filter.resample(&mut rng).unwrap();
    assert!(outcome.anomaly.is_none());
    assert_relative_eq!(outcome.neff, 1000.0, max_relative = 1e-9);
    assert!(!outcome.resampled);
    assert_eq!(outcome.injected, 0);
    assert_relative_eq!(filter.effective_sample_size(), 1000.0, max_relative = 1e-9);
}

// ============================================================================
// Tracking
// ============================================================================

#[test]
fn test_tracking_converges_on_true_pose() {
    let grid = common::cached_room(4.0, 3.0, 0.1, 2.0);
    let mut filter = ParticleFilter::new(common::room_config(500), grid.clone()).unwrap();
    let mut rng = SmallRng::seed_from_u64(17);

    let start = Pose2D::new(0.8, 0.5, 0.0);
    filter
        .initialize(
            &InitStrategy::DiskGaussianHeading {
                radius: 0.3,
                heading_variance: 0.02,
            },
            start,
            &mut rng,
        )
        .unwrap();

    let mut resampled = false;
    let mut truth = start;
    for k in 1..=15 {
        truth = Pose2D::new(start.x + 0.1 * k as f32, start.y, 0.0);
        let odom = Pose2D::new(0.1 * k as f32, 0.0, 0.0);
        let readings = common::scan(&grid, &truth, 36, 5.0);

        let summary = filter
            .update_with_odometry(odom, &readings, &mut rng)
            .unwrap();
        assert!(summary.anomaly.is_none());
        assert_eq!(summary.injected, 0);
        resampled |= summary.resampled;
    }

    assert!(resampled);
    assert_eq!(filter.iterations(), 15);
    assert_eq!(filter.num_particles(), 500);

    let estimate = filter.estimate().unwrap();
    let position_error = estimate.distance_to(&truth);
    let heading_error = angle_diff(truth.theta, estimate.theta).abs();
    assert!(position_error < 0.15, "position error {}", position_error);
    assert!(heading_error < 0.1, "heading error {}", heading_error);

    let cov = filter.covariance().unwrap();
    assert!(cov.var_x() < 0.05 && cov.var_y() < 0.05);
}

#[test]
fn test_dense_sharp_scan_keeps_evidence() {
    // Scan beams fall exactly on the 0.5 degree cache bins
    let grid = common::cached_room(3.0, 2.0, 0.05, 0.5);
    let mut config = common::room_config(200);
    config.measurement.hit_variance = 0.0025;
    config.motion.noise = MotionNoise::zero();

    let mut filter = ParticleFilter::new(config, grid.clone()).unwrap();
    let mut rng = SmallRng::seed_from_u64(31);
    let truth = Pose2D::new(2.0, 1.3, 0.0);
    filter
        .initialize(&InitStrategy::Disk { radius: 0.2 }, truth, &mut rng)
        .unwrap();

    let readings = common::scan(&grid, &truth, 720, 5.0);
    let summary = filter
        .update_with_odometry(Pose2D::identity(), &readings, &mut rng)
        .unwrap();

    assert!(summary.anomaly.is_none());
    assert!(filter.state().unwrap().log_scale() > f64::MAX.ln());
    assert!(summary.max_weight > 1.0 / 200.0);
    assert!(summary.resampled);
    assert!(summary.best_pose.distance_to(&truth) < 0.1);

    let estimate = filter.estimate().unwrap();
    assert!(estimate.distance_to(&truth) < 0.1, "estimate {:?}", estimate);
}

// ============================================================================
// Kidnapped robot
// ============================================================================

/// Track a stationary robot at `home`, then keep updating with scans from
/// `kidnapped` while odometry reports no motion.
fn run_kidnap(mode: ResamplingMode, steps_after: usize) -> (Vec<UpdateSummary>, Pose2D) {
    let grid = common::cached_room(3.0, 2.0, 0.1, 2.0);
    let mut config = common::room_config(1000);
    config.filter.resampling = mode;
    config.filter.alpha_slow = 0.05;
    config.filter.alpha_fast = 0.5;

    let mut filter = ParticleFilter::new(config, grid.clone()).unwrap();
    let mut rng = SmallRng::seed_from_u64(23);

    let home = Pose2D::new(2.2, 1.4, 0.0);
    let kidnapped = Pose2D::new(0.6, 1.5, 1.2);
    filter
        .initialize(&InitStrategy::AtPose, home, &mut rng)
        .unwrap();

    let home_scan = common::scan(&grid, &home, 36, 5.0);
    for _ in 0..10 {
        let summary = filter
            .update_with_odometry(Pose2D::identity(), &home_scan, &mut rng)
            .unwrap();
        assert_eq!(summary.injected, 0);
        assert!(!summary.resampled);
    }

    let kidnapped_scan = common::scan(&grid, &kidnapped, 36, 5.0);
    let summaries = (0..steps_after)
        .map(|_| {
            filter
                .update_with_odometry(Pose2D::identity(), &kidnapped_scan, &mut rng)
                .unwrap()
        })
        .collect();
    assert_eq!(filter.num_particles(), 1000);

    (summaries, kidnapped)
}

#[test]
fn test_augmented_recovers_from_kidnapping() {
    let (summaries, kidnapped) = run_kidnap(ResamplingMode::Augmented, 100);

    // Short-term average needs a couple of updates to fall below the long one
    assert_eq!(summaries[0].injected, 0);
    assert!(summaries.iter().any(|s| s.injected > 0));
    assert!(summaries.iter().all(|s| s.injected <= 1000));

    let found = summaries
        .iter()
        .any(|s| s.best_pose.position().distance(&kidnapped.position()) < 0.4);
    assert!(found, "no particle near the kidnapped pose");
}

#[test]
fn test_plain_never_injects() {
    let (summaries, _) = run_kidnap(ResamplingMode::Plain, 20);
    assert!(summaries.iter().all(|s| s.injected == 0));
    assert!(summaries.iter().all(|s| s.injection_fallbacks == 0));
}

// ============================================================================
// Determinism
// ============================================================================

fn drive(parallel: bool, seed: u64) -> ParticleFilter {
    let grid = common::cached_room(4.0, 3.0, 0.1, 2.0);
    let mut config = common::room_config(300);
    config.filter.parallel = parallel;
    config.filter.resampling = ResamplingMode::Augmented;
    config.motion.noise = MotionNoise::default();

    let mut filter = ParticleFilter::new(config, grid.clone()).unwrap();
    let mut rng = SmallRng::seed_from_u64(seed);
    let start = Pose2D::new(0.8, 0.5, 0.0);
    filter
        .initialize(&InitStrategy::FreeMapRandomHeading, start, &mut rng)
        .unwrap();

    for k in 1..=8 {
        let truth = Pose2D::new(start.x + 0.1 * k as f32, start.y, 0.0);
        let readings = common::scan(&grid, &truth, 24, 5.0);
        filter
            .update_with_odometry(Pose2D::new(0.1 * k as f32, 0.0, 0.0), &readings, &mut rng)
            .unwrap();
    }
    filter
}

#[test]
fn test_same_seed_same_particles() {
    let a = drive(true, 99);
    let b = drive(true, 99);
    assert_eq!(a.particles(), b.particles());

    let c = drive(true, 100);
    assert_ne!(a.particles(), c.particles());
}

#[test]
fn test_parallel_matches_sequential() {
    let parallel = drive(true, 5);
    let sequential = drive(false, 5);
    assert_eq!(parallel.particles(), sequential.particles());
    assert_eq!(parallel.estimate(), sequential.estimate());
}
