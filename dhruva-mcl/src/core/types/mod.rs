//! Core data types for localization.
//!
//! - [`Point2D`]: 2D point in world units
//! - [`Pose2D`]: Robot pose (x, y, theta)
//! - [`Twist2D`]: Velocity control (linear, angular)
//! - [`Covariance2D`]: 3x3 covariance matrix for pose uncertainty
//! - [`RangeReading`]: Single range-bearing observation in the sensor frame
//! - [`LaserScan`]: Uniformly spaced scan of range readings
//! - [`ScanFilterConfig`]: Range gate, glitch and median filtering of scans

mod covariance;
mod pose;
mod scan;

pub use covariance::Covariance2D;
pub use pose::{Point2D, Pose2D, Twist2D};
pub use scan::{LaserScan, RangeReading, ScanFilterConfig};
