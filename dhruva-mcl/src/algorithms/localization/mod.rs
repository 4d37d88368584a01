//! Monte Carlo Localization on a known map.
//!
//! # Components
//!
//! - [`motion_model`]: odometry and velocity motion sampling
//! - [`sensor_model`]: beam range-finder likelihood
//! - [`resampler`]: weight normalization, N_eff, stratified resampling
//! - [`initialization`]: particle seeding strategies
//! - [`ParticleFilter`]: the predict → weight → resample loop
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dhruva_mcl::{InitStrategy, MclConfig, OccupancyGrid, ParticleFilter, Pose2D, RangeReading};
//! use rand::SeedableRng;
//! use rand::rngs::SmallRng;
//!
//! # fn run(mut grid: OccupancyGrid) -> dhruva_mcl::Result<()> {
//! let config = MclConfig::default();
//! grid.build_cache(config.map.angle_resolution())?;
//!
//! let mut rng = SmallRng::seed_from_u64(1);
//! let mut filter = ParticleFilter::new(config, Arc::new(grid))?;
//! filter.initialize(&InitStrategy::FreeMapRandomHeading, Pose2D::identity(), &mut rng)?;
//!
//! let odom = Pose2D::new(0.1, 0.0, 0.0);
//! let readings = [RangeReading::new(0.0, 2.5)];
//! let summary = filter.update_with_odometry(odom, &readings, &mut rng)?;
//! println!("N_eff = {:.1}, estimate = {:?}", summary.neff, filter.estimate());
//! # Ok(())
//! # }
//! ```

pub mod initialization;
pub mod motion_model;
pub mod particle_filter;
pub mod resampler;
pub mod sensor_model;

pub use initialization::{InitStrategy, seed_particles};
pub use motion_model::{
    MotionModel, MotionNoise, odometry_motion_probability, sample_odometry_motion,
    sample_velocity_motion,
};
pub use particle_filter::{
    Particle, ParticleFilter, ParticleFilterState, ResampleOutcome, UpdateSummary,
};
pub use resampler::{
    Resampler, WeightAnomaly, WeightTrackers, effective_sample_size, normalize_weights,
    stratified_indices,
};
pub use sensor_model::{BeamModelParams, beam_likelihood};
