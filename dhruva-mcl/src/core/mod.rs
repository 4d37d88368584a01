//! Core foundation layer.
//!
//! This is the bottom layer of the localization stack with no internal
//! dependencies. All other layers depend on core.
//!
//! # Contents
//!
//! - [`types`]: Core data types (poses, covariance, range readings)
//! - [`math`]: Mathematical primitives (angle normalization, interpolation)

pub mod math;
pub mod types;
