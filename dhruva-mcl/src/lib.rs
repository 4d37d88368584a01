//! DhruvaMCL - Monte Carlo localization on static occupancy grid maps
//!
//! # Architecture
//!
//! The crate is organized into 3 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 bin/, config                        │  ← Executables, settings
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   algorithms/                       │  ← Algorithms
//! │   mapping (grid, ray casting, ray-cast cache)       │
//! │   localization (motion, beam model, filter)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      core/                          │  ← Foundation
//! │            (types, math)                            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Filter cycle
//!
//! Each update runs the classic MCL loop over a fixed-size particle set:
//!
//! 1. **Predict**: every particle is moved by a noisy sample of the motion
//!    model (odometry or velocity).
//! 2. **Weight**: every particle is scored against the range readings using
//!    the beam model and precomputed ray casts.
//! 3. **Resample**: when the effective sample size drops (or augmented MCL
//!    decides to inject random particles), the set is resampled by
//!    stratified sampling.
//!
//! The map must have its ray-cast cache built before a filter can be
//! created: [`OccupancyGrid::build_cache`].

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Algorithms (depends on core)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 3: Configuration and errors
// ============================================================================
pub mod config;
pub mod error;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use core::math;
pub use core::types::{
    Covariance2D, LaserScan, Point2D, Pose2D, RangeReading, ScanFilterConfig, Twist2D,
};

// Configuration and errors
pub use config::{FilterConfig, MapConfig, MclConfig, MotionConfig, ResamplingMode};
pub use error::{MclError, Result};

// Algorithms - Mapping
pub use algorithms::mapping::{GridGeometry, OccupancyGrid, RayCast, RayCastCache};

// Algorithms - Localization
pub use algorithms::localization::{
    BeamModelParams, InitStrategy, MotionModel, MotionNoise, Particle, ParticleFilter,
    ParticleFilterState, ResampleOutcome, Resampler, UpdateSummary, WeightAnomaly,
    WeightTrackers,
};
