//! Particle filter (Monte Carlo Localization) implementation.
//!
//! Each update runs predict → weight → (maybe) resample:
//!
//! 1. **Predict**: every particle samples a successor pose from the motion
//!    model.
//! 2. **Weight**: every particle is scored with the beam model against the
//!    ray-casting cache of the map.
//! 3. **Resample**: stratified resampling when the effective sample size
//!    drops, optionally with random-particle injection (augmented MCL).
//!
//! Predict and weight are independent per particle and run on rayon when
//! `filter.parallel` is set. Each particle draws from its own `SmallRng`
//! seeded from one value of the caller's generator, so results do not
//! depend on the thread count.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::initialization::{FREE_CELL_RETRIES, InitStrategy, random_heading, seed_particles};
use super::motion_model::{MotionModel, sample_odometry_motion, sample_velocity_motion};
use super::resampler::{
    Resampler, WeightAnomaly, WeightTrackers, effective_sample_size, injection_count,
    normalize_weights, stratified_indices,
};
use super::sensor_model::{BeamModelParams, beam_likelihood};
use crate::algorithms::mapping::{OccupancyGrid, RayCastCache};
use crate::config::{MclConfig, ResamplingMode};
use crate::core::math::angle_diff;
use crate::core::types::{Covariance2D, Pose2D, RangeReading, Twist2D};
use crate::error::{MclError, Result};

/// A single particle representing a possible robot pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Hypothesized robot pose.
    pub pose: Pose2D,
    /// Importance weight.
    pub weight: f64,
}

impl Particle {
    /// Create a new particle with unit weight.
    pub fn new(pose: Pose2D) -> Self {
        Self { pose, weight: 1.0 }
    }

    /// Create a new particle with specified weight.
    pub fn with_weight(pose: Pose2D, weight: f64) -> Self {
        Self { pose, weight }
    }
}

/// Mutable filter state, present once the population has been seeded.
#[derive(Debug, Clone)]
pub struct ParticleFilterState {
    particles: Vec<Particle>,
    /// Second buffer; holds the previous generation after a swap.
    scratch: Vec<Particle>,
    last_odom: Pose2D,
    trackers: WeightTrackers,
    /// `ln` of the factor divided out of the last weighting pass.
    log_scale: f64,
}

impl ParticleFilterState {
    /// Current particle set.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Odometry pose of the last prediction.
    pub fn last_odom(&self) -> Pose2D {
        self.last_odom
    }

    /// Adaptive weight averages.
    pub fn trackers(&self) -> &WeightTrackers {
        &self.trackers
    }

    /// Log-likelihood of the best particle in the last weighting pass.
    ///
    /// Stored weights are likelihoods divided by `exp(log_scale)`.
    pub fn log_scale(&self) -> f64 {
        self.log_scale
    }
}

/// Result of one resampling step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResampleOutcome {
    /// Effective sample size before resampling.
    pub neff: f64,
    /// Whether the particle set was replaced.
    pub resampled: bool,
    /// Particles redrawn from free space.
    pub injected: usize,
    /// Injections that fell back to a weighted draw.
    pub injection_fallbacks: usize,
    /// Degenerate weights detected before resampling.
    pub anomaly: Option<WeightAnomaly>,
}

/// Diagnostics of one full update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateSummary {
    /// Update counter, starting at 1.
    pub iteration: u64,
    /// Effective sample size before resampling.
    pub neff: f64,
    /// Whether resampling occurred this iteration.
    pub resampled: bool,
    /// Particles redrawn from free space.
    pub injected: usize,
    /// Injections that fell back to a weighted draw.
    pub injection_fallbacks: usize,
    /// Largest normalized weight before resampling.
    pub max_weight: f64,
    /// Pose of the heaviest particle before resampling.
    pub best_pose: Pose2D,
    /// Degenerate weights detected this iteration.
    pub anomaly: Option<WeightAnomaly>,
}

/// Monte Carlo Localization particle filter.
#[derive(Debug)]
pub struct ParticleFilter {
    config: MclConfig,
    grid: Arc<OccupancyGrid>,
    state: Option<ParticleFilterState>,
    iterations: u64,
}

impl ParticleFilter {
    /// Create an uninitialized filter over `grid`.
    ///
    /// The grid's ray-casting cache must already be built.
    pub fn new(config: MclConfig, grid: Arc<OccupancyGrid>) -> Result<Self> {
        config.validate()?;
        if !grid.has_cache() {
            return Err(MclError::CacheNotBuilt);
        }
        Ok(Self {
            config,
            grid,
            state: None,
            iterations: 0,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &MclConfig {
        &self.config
    }

    /// Shared map.
    pub fn grid(&self) -> &Arc<OccupancyGrid> {
        &self.grid
    }

    /// Filter state, `None` before [`Self::initialize`].
    pub fn state(&self) -> Option<&ParticleFilterState> {
        self.state.as_ref()
    }

    /// Check whether particles have been seeded.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Current particles (empty before initialization).
    pub fn particles(&self) -> &[Particle] {
        match &self.state {
            Some(state) => &state.particles,
            None => &[],
        }
    }

    /// Get the number of particles.
    pub fn num_particles(&self) -> usize {
        self.particles().len()
    }

    /// Number of completed updates.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Seed the population and reset odometry and weight history.
    ///
    /// Odometry starts at the identity pose; call [`Self::reset_odometry`]
    /// if the odometry frame starts elsewhere.
    pub fn initialize<R: Rng + ?Sized>(
        &mut self,
        strategy: &InitStrategy,
        start: Pose2D,
        rng: &mut R,
    ) -> Result<()> {
        let n = self.config.filter.num_particles;
        let particles = seed_particles(strategy, &start, n, &self.grid, rng)?;

        log::info!("Seeded {} particles ({:?})", particles.len(), strategy);
        match &mut self.state {
            Some(state) => {
                state.particles = particles;
                state.scratch.clear();
                state.last_odom = Pose2D::identity();
                state.trackers.reset();
                state.log_scale = 0.0;
            }
            None => {
                self.state = Some(ParticleFilterState {
                    particles,
                    scratch: Vec::with_capacity(n),
                    last_odom: Pose2D::identity(),
                    trackers: WeightTrackers::default(),
                    log_scale: 0.0,
                });
            }
        }
        self.iterations = 0;
        Ok(())
    }

    /// Set the odometry reference for the next prediction.
    pub fn reset_odometry(&mut self, odom: Pose2D) -> Result<()> {
        let state = self.state.as_mut().ok_or(MclError::NotInitialized)?;
        state.last_odom = odom;
        Ok(())
    }

    /// Propagate particles by the odometry change since the last call.
    ///
    /// Fails with [`MclError::MotionModelMismatch`] unless the filter is
    /// configured for odometry.
    pub fn predict_odometry<R: Rng + ?Sized>(&mut self, odom: Pose2D, rng: &mut R) -> Result<()> {
        self.check_motion_model(MotionModel::Odometry)?;
        let parallel = self.config.filter.parallel;
        let noise = self.config.motion.noise;
        let state = self.state.as_mut().ok_or(MclError::NotInitialized)?;
        let seed = rng.next_u64();
        let prev = state.last_odom;

        propagate(state, parallel, seed, |pose, stream| {
            sample_odometry_motion(&prev, &odom, pose, &noise, stream)
        });
        state.last_odom = odom;
        Ok(())
    }

    /// Propagate particles by a velocity command held for `dt` seconds.
    ///
    /// Fails with [`MclError::MotionModelMismatch`] unless the filter is
    /// configured for velocity commands.
    pub fn predict_velocity<R: Rng + ?Sized>(
        &mut self,
        control: Twist2D,
        dt: f32,
        rng: &mut R,
    ) -> Result<()> {
        self.check_motion_model(MotionModel::Velocity)?;
        let parallel = self.config.filter.parallel;
        let noise = self.config.motion.noise;
        let state = self.state.as_mut().ok_or(MclError::NotInitialized)?;
        let seed = rng.next_u64();

        propagate(state, parallel, seed, |pose, stream| {
            sample_velocity_motion(&control, dt, pose, &noise, stream)
        });
        Ok(())
    }

    fn check_motion_model(&self, requested: MotionModel) -> Result<()> {
        let configured = self.config.motion.model;
        if configured != requested {
            return Err(MclError::MotionModelMismatch {
                configured,
                requested,
            });
        }
        Ok(())
    }

    /// Replace every particle weight with the likelihood of `observations`.
    ///
    /// Likelihoods are accumulated in log space and stored relative to the
    /// best particle, so the heaviest weight is 1 and the scale goes to
    /// [`ParticleFilterState::log_scale`]. Particles outside the map or on
    /// occupied cells get weight 0.
    pub fn weight(&mut self, observations: &[RangeReading]) -> Result<()> {
        let cache = self.grid.cache().ok_or(MclError::CacheNotBuilt)?;
        let state = self.state.as_mut().ok_or(MclError::NotInitialized)?;
        let grid = self.grid.as_ref();
        let params = &self.config.measurement;

        let score = |p: &mut Particle| {
            p.weight = particle_log_likelihood(grid, cache, &p.pose, observations, params);
        };
        if self.config.filter.parallel {
            state.particles.par_iter_mut().for_each(score);
        } else {
            state.particles.iter_mut().for_each(score);
        }

        let best = state
            .particles
            .iter()
            .map(|p| p.weight)
            .filter(|l| l.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        let log_scale = if best.is_finite() { best } else { 0.0 };

        // NaN stays NaN and is caught as an anomaly when resampling
        for p in &mut state.particles {
            p.weight = (p.weight - log_scale).exp();
        }
        state.log_scale = log_scale;
        Ok(())
    }

    /// Normalize weights and resample per the configured mode.
    ///
    /// Augmented mode resamples whenever particles are injected, even when
    /// N_eff is above the threshold.
    ///
    /// A zero or non-finite weight sum keeps the current poses, resets the
    /// weights to 1/N and skips resampling and the adaptive trackers.
    pub fn resample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<ResampleOutcome> {
        let filter = &self.config.filter;
        let state = self.state.as_mut().ok_or(MclError::NotInitialized)?;
        let n = state.particles.len();

        let raw_sum = match normalize_weights(&mut state.particles) {
            Ok(sum) => sum,
            Err(anomaly) => {
                log::warn!(
                    "Weight anomaly ({}), keeping {} predicted particles",
                    anomaly,
                    n
                );
                let uniform = 1.0 / n.max(1) as f64;
                for p in &mut state.particles {
                    p.weight = uniform;
                }
                return Ok(ResampleOutcome {
                    neff: n as f64,
                    anomaly: Some(anomaly),
                    ..Default::default()
                });
            }
        };

        let neff = effective_sample_size(&state.particles);
        let neff_low = neff < filter.min_particles_ratio * n as f64;

        let mut outcome = ResampleOutcome {
            neff,
            ..Default::default()
        };

        match filter.resampling {
            ResamplingMode::Plain => {
                if neff_low {
                    outcome.resampled =
                        Resampler::stratified(&mut state.particles, &mut state.scratch, rng);
                }
            }
            ResamplingMode::Augmented => {
                let log_w_avg = state.log_scale + (raw_sum / n as f64).ln();
                state
                    .trackers
                    .update(log_w_avg, filter.alpha_slow, filter.alpha_fast);
                let ratio = state.trackers.injection_ratio(filter.v_factor);
                let injected = injection_count(ratio, n);

                if (neff_low || injected > 0) && n >= 2 {
                    outcome.injection_fallbacks =
                        resample_with_injection(state, &self.grid, injected, rng);
                    outcome.injected = injected;
                    outcome.resampled = true;
                }
                log::debug!(
                    "ln w_slow={:.3} ln w_fast={:.3} injection ratio {:.3}",
                    state.trackers.log_w_slow,
                    state.trackers.log_w_fast,
                    ratio
                );
            }
        }

        log::debug!(
            "N_eff {:.1}/{} -> resampled: {}, injected: {}",
            neff,
            n,
            outcome.resampled,
            outcome.injected
        );
        if outcome.injection_fallbacks > 0 {
            log::warn!(
                "{} of {} injected particles fell back to weighted draws",
                outcome.injection_fallbacks,
                outcome.injected
            );
        }

        Ok(outcome)
    }

    /// Full update from an odometry pose and range readings.
    pub fn update_with_odometry<R: Rng + ?Sized>(
        &mut self,
        odom: Pose2D,
        observations: &[RangeReading],
        rng: &mut R,
    ) -> Result<UpdateSummary> {
        self.predict_odometry(odom, rng)?;
        self.correct(observations, rng)
    }

    /// Full update from a velocity command and range readings.
    pub fn update_with_velocity<R: Rng + ?Sized>(
        &mut self,
        control: Twist2D,
        dt: f32,
        observations: &[RangeReading],
        rng: &mut R,
    ) -> Result<UpdateSummary> {
        self.predict_velocity(control, dt, rng)?;
        self.correct(observations, rng)
    }

    /// Weight and resample after a prediction.
    fn correct<R: Rng + ?Sized>(
        &mut self,
        observations: &[RangeReading],
        rng: &mut R,
    ) -> Result<UpdateSummary> {
        self.weight(observations)?;
        let (max_weight, best_pose) = self.peak();
        let outcome = self.resample(rng)?;
        self.iterations += 1;

        Ok(UpdateSummary {
            iteration: self.iterations,
            neff: outcome.neff,
            resampled: outcome.resampled,
            injected: outcome.injected,
            injection_fallbacks: outcome.injection_fallbacks,
            max_weight,
            best_pose,
            anomaly: outcome.anomaly,
        })
    }

    /// Largest normalized weight and its pose.
    fn peak(&self) -> (f64, Pose2D) {
        let particles = self.particles();
        let sum: f64 = particles.iter().map(|p| p.weight).sum();
        match self.best_particle() {
            Some(best) if sum.is_finite() && sum > 0.0 => (best.weight / sum, best.pose),
            Some(best) => (0.0, best.pose),
            None => (0.0, Pose2D::identity()),
        }
    }

    /// Heaviest particle.
    pub fn best_particle(&self) -> Option<&Particle> {
        self.particles()
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }

    /// Effective sample size `(Σw)² / Σw²` of the current weights.
    pub fn effective_sample_size(&self) -> f64 {
        let particles = self.particles();
        let sum: f64 = particles.iter().map(|p| p.weight).sum();
        let sum_sq: f64 = particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_sq > 0.0 && sum.is_finite() {
            sum * sum / sum_sq
        } else {
            0.0
        }
    }

    /// Get the estimated pose (weighted mean of particles).
    ///
    /// Heading is the circular mean. Falls back to the unweighted mean when
    /// all weights are zero.
    pub fn estimate(&self) -> Option<Pose2D> {
        let particles = self.particles();
        if particles.is_empty() {
            return None;
        }

        let total: f64 = particles.iter().map(|p| p.weight).sum();
        let uniform = !(total.is_finite() && total > 0.0);

        let mut sum_x = 0.0f64;
        let mut sum_y = 0.0f64;
        let mut sum_sin = 0.0f64;
        let mut sum_cos = 0.0f64;
        let mut sum_w = 0.0f64;

        for p in particles {
            let w = if uniform { 1.0 } else { p.weight };
            sum_x += w * p.pose.x as f64;
            sum_y += w * p.pose.y as f64;
            sum_sin += w * (p.pose.theta as f64).sin();
            sum_cos += w * (p.pose.theta as f64).cos();
            sum_w += w;
        }

        Some(Pose2D::new(
            (sum_x / sum_w) as f32,
            (sum_y / sum_w) as f32,
            sum_sin.atan2(sum_cos) as f32,
        ))
    }

    /// Get the estimated covariance of the pose.
    pub fn covariance(&self) -> Option<Covariance2D> {
        let mean = self.estimate()?;
        let mut cov_xx = 0.0f64;
        let mut cov_xy = 0.0f64;
        let mut cov_yy = 0.0f64;
        let mut cov_tt = 0.0f64;
        let mut total_weight = 0.0f64;

        for p in self.particles() {
            let dx = (p.pose.x - mean.x) as f64;
            let dy = (p.pose.y - mean.y) as f64;
            let dtheta = angle_diff(mean.theta, p.pose.theta) as f64;

            cov_xx += p.weight * dx * dx;
            cov_xy += p.weight * dx * dy;
            cov_yy += p.weight * dy * dy;
            cov_tt += p.weight * dtheta * dtheta;
            total_weight += p.weight;
        }

        if total_weight > 1e-10 && total_weight.is_finite() {
            // Row-major: [xx, xy, xt, yx, yy, yt, tx, ty, tt]
            let cov_xy = (cov_xy / total_weight) as f32;
            Some(Covariance2D::from_array([
                (cov_xx / total_weight) as f32,
                cov_xy,
                0.0,
                cov_xy,
                (cov_yy / total_weight) as f32,
                0.0,
                0.0,
                0.0,
                (cov_tt / total_weight) as f32,
            ]))
        } else {
            None
        }
    }
}

/// Write `step(pose)` of every particle into the scratch buffer and swap.
///
/// Particle `i` draws from `SmallRng::seed_from_u64(seed + i)`.
fn propagate<F>(state: &mut ParticleFilterState, parallel: bool, seed: u64, step: F)
where
    F: Fn(&Pose2D, &mut SmallRng) -> Pose2D + Sync,
{
    let advance = |(i, p): (usize, &Particle)| {
        let mut stream = SmallRng::seed_from_u64(seed.wrapping_add(i as u64));
        Particle::with_weight(step(&p.pose, &mut stream), p.weight)
    };

    state.scratch.clear();
    if parallel {
        state
            .scratch
            .par_extend(state.particles.par_iter().enumerate().map(advance));
    } else {
        state
            .scratch
            .extend(state.particles.iter().enumerate().map(advance));
    }
    std::mem::swap(&mut state.particles, &mut state.scratch);
}

/// Sum of beam log-likelihoods of `observations` seen from `pose`.
///
/// −∞ when the pose is off the map, on an occupied cell, or a reading has
/// zero likelihood.
fn particle_log_likelihood(
    grid: &OccupancyGrid,
    cache: &RayCastCache,
    pose: &Pose2D,
    observations: &[RangeReading],
    params: &BeamModelParams,
) -> f64 {
    let Some((gx, gy)) = grid.world_to_grid(pose.x, pose.y) else {
        return f64::NEG_INFINITY;
    };

    let mut log_likelihood = 0.0;
    for reading in observations {
        let bin = cache.bin_for_angle(reading.angle + pose.theta);
        let Some(expected) = cache.expected_range(gx, gy, bin) else {
            return f64::NEG_INFINITY;
        };
        let expected = if expected == RayCastCache::NO_HIT {
            params.max_range
        } else {
            expected as f64
        };
        log_likelihood += beam_likelihood(reading.range as f64, expected, params).ln();
    }
    log_likelihood
}

/// Stratified resample of `N - injected` particles plus `injected` particles
/// drawn uniformly from free space. Returns the number of fallbacks.
fn resample_with_injection<R: Rng + ?Sized>(
    state: &mut ParticleFilterState,
    grid: &OccupancyGrid,
    injected: usize,
    rng: &mut R,
) -> usize {
    let n = state.particles.len();
    let uniform = 1.0 / n as f64;
    let weights: Vec<f64> = state.particles.iter().map(|p| p.weight).collect();

    state.scratch.clear();
    state.scratch.extend(
        stratified_indices(&weights, n - injected, rng)
            .into_iter()
            .map(|i| Particle::with_weight(state.particles[i].pose, uniform)),
    );

    let mut fallbacks = 0;
    for slot in 0..injected {
        let pose = match grid.sample_free_cell(0.0, FREE_CELL_RETRIES, rng) {
            Ok(p) => Pose2D::from_point(p, random_heading(rng)),
            Err(_) => {
                fallbacks += 1;
                stratified_indices(&weights, 1, rng)
                    .first()
                    .map_or(state.particles[slot].pose, |&i| state.particles[i].pose)
            }
        };
        state.scratch.push(Particle::with_weight(pose, uniform));
    }

    std::mem::swap(&mut state.particles, &mut state.scratch);
    fallbacks
}
