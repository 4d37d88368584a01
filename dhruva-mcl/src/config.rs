//! Localization configuration.
//!
//! Loaded once at startup from TOML. Every section and field is optional;
//! missing values take the defaults below.
//!
//! ```toml
//! [map]
//! resolution = 0.05
//! angle_resolution_deg = 1.0
//!
//! [filter]
//! num_particles = 1000
//! resampling = "augmented"
//!
//! [motion]
//! model = "odometry"
//! noise = [0.05, 0.01, 0.05, 0.01, 0.01, 0.01]
//!
//! [measurement]
//! max_range = 8.0
//! weights = [0.85, 0.05, 0.05, 0.05]
//!
//! [scan]
//! min_range = 0.05
//! median_half_window = 2
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::algorithms::localization::{BeamModelParams, MotionModel, MotionNoise};
use crate::algorithms::mapping::GridGeometry;
use crate::core::types::{Point2D, ScanFilterConfig};
use crate::error::{MclError, Result};

/// Tolerance on the sum of the measurement mixture weights.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MclConfig {
    /// Map geometry and cache resolution
    #[serde(default)]
    pub map: MapConfig,
    /// Population size and resampling
    #[serde(default)]
    pub filter: FilterConfig,
    /// Motion model
    #[serde(default)]
    pub motion: MotionConfig,
    /// Beam measurement model
    #[serde(default)]
    pub measurement: BeamModelParams,
    /// Scan preprocessing before weighting
    #[serde(default)]
    pub scan: ScanFilterConfig,
}

/// Map placement and ray-casting cache resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Map image, for callers that load maps from disk.
    pub path: Option<PathBuf>,
    /// World position of the reference cell `[x, y]`.
    pub offset: [f32; 2],
    /// Reference cell position from cell (0, 0), in world units `[x, y]`.
    pub center: [f32; 2],
    /// World units per cell.
    pub resolution: f32,
    /// Angular width of one cache bin, in degrees.
    pub angle_resolution_deg: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            path: None,
            offset: [0.0, 0.0],
            center: [0.0, 0.0],
            resolution: 0.05,
            angle_resolution_deg: 1.0,
        }
    }
}

impl MapConfig {
    /// Grid geometry described by this section.
    pub fn geometry(&self) -> GridGeometry {
        GridGeometry {
            resolution: self.resolution,
            offset: Point2D::new(self.offset[0], self.offset[1]),
            center: Point2D::new(self.center[0], self.center[1]),
        }
    }

    /// Cache bin width in radians.
    pub fn angle_resolution(&self) -> f32 {
        self.angle_resolution_deg.to_radians()
    }
}

/// Resampling variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMode {
    /// Stratified resampling when the effective sample size drops.
    Plain,
    /// Plain resampling plus random-particle injection (augmented MCL).
    #[default]
    Augmented,
}

/// Particle filter parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of particles.
    pub num_particles: usize,

    /// Resample when N_eff < this fraction of the population.
    pub min_particles_ratio: f64,

    /// Smoothing rate of the long-term average weight.
    pub alpha_slow: f64,

    /// Smoothing rate of the short-term average weight.
    pub alpha_fast: f64,

    /// Scale on `w_fast / w_slow` in the injection ratio.
    pub v_factor: f64,

    /// Resampling variant.
    pub resampling: ResamplingMode,

    /// Run per-particle predict/weight on the rayon pool.
    pub parallel: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            num_particles: 1000,
            min_particles_ratio: 0.5,
            alpha_slow: 0.001,
            alpha_fast: 0.1,
            v_factor: 1.0,
            resampling: ResamplingMode::Augmented,
            parallel: true,
        }
    }
}

/// Motion model selection and noise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Which sampler drives prediction.
    pub model: MotionModel,
    /// Noise coefficients α₁..α₆.
    pub noise: MotionNoise,
}

impl MclConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| MclError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MclConfig =
            basic_toml::from_str(&contents).map_err(|e| MclError::ConfigParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Configuration for global localization (many particles, injection on).
    pub fn global_localization() -> Self {
        Self {
            filter: FilterConfig {
                num_particles: 2000,
                resampling: ResamplingMode::Augmented,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Configuration for tracking a known pose (few particles, no injection).
    pub fn tracking() -> Self {
        Self {
            filter: FilterConfig {
                num_particles: 200,
                resampling: ResamplingMode::Plain,
                ..Default::default()
            },
            motion: MotionConfig {
                noise: MotionNoise::low_noise(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check every parameter range.
    pub fn validate(&self) -> Result<()> {
        let map = &self.map;
        if !map.resolution.is_finite() || map.resolution <= 0.0 {
            return Err(MclError::invalid(
                "map.resolution",
                format!("must be > 0, got {}", map.resolution),
            ));
        }
        if !map.angle_resolution_deg.is_finite() || map.angle_resolution_deg <= 0.0 {
            return Err(MclError::invalid(
                "map.angle_resolution_deg",
                format!("must be > 0, got {}", map.angle_resolution_deg),
            ));
        }

        let filter = &self.filter;
        if filter.num_particles == 0 {
            return Err(MclError::invalid("filter.num_particles", "must be >= 1"));
        }
        for (name, value) in [
            ("filter.min_particles_ratio", filter.min_particles_ratio),
            ("filter.alpha_slow", filter.alpha_slow),
            ("filter.alpha_fast", filter.alpha_fast),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MclError::invalid(
                    name,
                    format!("must be in [0, 1], got {}", value),
                ));
            }
        }
        if !filter.v_factor.is_finite() || filter.v_factor < 0.0 {
            return Err(MclError::invalid(
                "filter.v_factor",
                format!("must be >= 0, got {}", filter.v_factor),
            ));
        }

        if !self.motion.noise.is_valid() {
            return Err(MclError::invalid(
                "motion.noise",
                format!("coefficients must be >= 0, got {:?}", self.motion.noise.0),
            ));
        }

        let m = &self.measurement;
        if !m.max_range.is_finite() || m.max_range <= 0.0 {
            return Err(MclError::invalid(
                "measurement.max_range",
                format!("must be > 0, got {}", m.max_range),
            ));
        }
        if !m.hit_variance.is_finite() || m.hit_variance <= 0.0 {
            return Err(MclError::invalid(
                "measurement.hit_variance",
                format!("must be > 0, got {}", m.hit_variance),
            ));
        }
        if !m.short_rate.is_finite() || m.short_rate < 0.0 {
            return Err(MclError::invalid(
                "measurement.short_rate",
                format!("must be >= 0, got {}", m.short_rate),
            ));
        }
        if m.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(MclError::invalid(
                "measurement.weights",
                format!("must be >= 0, got {:?}", m.weights),
            ));
        }
        let sum = m.weights_sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(MclError::invalid(
                "measurement.weights",
                format!("must sum to 1, got {}", sum),
            ));
        }

        let scan = &self.scan;
        if !scan.min_range.is_finite() || scan.min_range < 0.0 {
            return Err(MclError::invalid(
                "scan.min_range",
                format!("must be >= 0, got {}", scan.min_range),
            ));
        }
        if let Some(max) = scan.max_range
            && !(max.is_finite() && max > scan.min_range)
        {
            return Err(MclError::invalid(
                "scan.max_range",
                format!("must be > scan.min_range ({}), got {}", scan.min_range, max),
            ));
        }

        Ok(())
    }
}
