//! Core localization algorithms layer.
//!
//! # Contents
//!
//! - [`mapping`]: Occupancy grid, ray casting and the ray-casting cache
//! - [`localization`]: Particle filter localization (Monte Carlo Localization)

pub mod localization;
pub mod mapping;
