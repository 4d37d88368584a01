//! Error types for DhruvaMCL

use std::path::PathBuf;

use crate::algorithms::localization::MotionModel;

/// Result type alias
pub type Result<T> = std::result::Result<T, MclError>;

/// Localization error types.
///
/// Runtime degeneracies during an update (zero weight sums, starved
/// particles) are not errors; they are reported in the update summary.
#[derive(Debug, thiserror::Error)]
pub enum MclError {
    /// Configuration file could not be read
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML or has wrong field types
    #[error("Failed to parse config {path}: {message}")]
    ConfigParse {
        /// Path of the configuration file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Parameter outside its valid range
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Cell data does not match the declared grid size
    #[error("Grid data has {actual} cells, expected {width}x{height}")]
    GridDimensions {
        /// Declared width in cells
        width: usize,
        /// Declared height in cells
        height: usize,
        /// Number of cells supplied
        actual: usize,
    },

    /// Filter created on a grid whose ray-casting cache was never built
    #[error("Ray-casting cache has not been built for this grid")]
    CacheNotBuilt,

    /// Update requested before particles were seeded
    #[error("Particle filter is not initialized")]
    NotInitialized,

    /// Prediction called for a motion model other than the configured one
    #[error("Filter is configured for {configured:?} motion, got a {requested:?} update")]
    MotionModelMismatch {
        /// Model selected in `[motion]`
        configured: MotionModel,
        /// Model of the rejected call
        requested: MotionModel,
    },

    /// Legacy seeding code with no matching strategy
    #[error("Initialization strategy {0} is not implemented")]
    UnimplementedStrategy(u8),

    /// No free cell found within the retry budget
    #[error("No free cell found after {attempts} attempts")]
    FreeCellSampling {
        /// Number of cells tried
        attempts: usize,
    },
}

impl MclError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        MclError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
