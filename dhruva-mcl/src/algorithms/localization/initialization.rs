//! Particle seeding strategies.
//!
//! Every strategy places N particles with weight 1/N around a start pose or
//! over the free space of the map. Legacy numeric codes map onto the
//! variants through [`InitStrategy::from_code`].

use std::f32::consts::PI;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::particle_filter::Particle;
use crate::algorithms::mapping::OccupancyGrid;
use crate::core::types::{Point2D, Pose2D};
use crate::error::{MclError, Result};

/// Retries per free-map particle before seeding fails.
pub const FREE_CELL_RETRIES: usize = 100;

/// How to seed the particle population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitStrategy {
    /// All particles at the start pose.
    AtPose,
    /// Start position, uniformly random heading.
    AtPositionRandomHeading,
    /// Uniform over a disk around the start position, start heading.
    Disk {
        /// Disk radius in world units
        radius: f32,
    },
    /// Uniform over a disk, uniformly random heading.
    DiskRandomHeading {
        /// Disk radius in world units
        radius: f32,
    },
    /// Uniform over a disk, start heading plus Gaussian noise.
    DiskGaussianHeading {
        /// Disk radius in world units
        radius: f32,
        /// Heading noise variance (rad²)
        heading_variance: f32,
    },
    /// Uniform over free map cells, start heading.
    FreeMap,
    /// Uniform over free map cells, uniformly random heading.
    #[default]
    FreeMapRandomHeading,
    /// Uniform over free map cells, start heading plus Gaussian noise.
    FreeMapGaussianHeading {
        /// Heading noise variance (rad²)
        heading_variance: f32,
    },
}

impl InitStrategy {
    /// Map a legacy strategy code (0-7) and its two parameters to a strategy.
    ///
    /// `param0` is the disk radius, `param1` the heading variance.
    pub fn from_code(code: u8, param0: f32, param1: f32) -> Result<Self> {
        Ok(match code {
            0 => InitStrategy::AtPose,
            1 => InitStrategy::AtPositionRandomHeading,
            2 => InitStrategy::Disk { radius: param0 },
            3 => InitStrategy::DiskRandomHeading { radius: param0 },
            4 => InitStrategy::DiskGaussianHeading {
                radius: param0,
                heading_variance: param1,
            },
            5 => InitStrategy::FreeMap,
            6 => InitStrategy::FreeMapRandomHeading,
            7 => InitStrategy::FreeMapGaussianHeading {
                heading_variance: param1,
            },
            other => return Err(MclError::UnimplementedStrategy(other)),
        })
    }

    /// Check strategy parameters.
    pub fn validate(&self) -> Result<()> {
        let radius = match self {
            InitStrategy::Disk { radius }
            | InitStrategy::DiskRandomHeading { radius }
            | InitStrategy::DiskGaussianHeading { radius, .. } => Some(*radius),
            _ => None,
        };
        if let Some(r) = radius
            && (!r.is_finite() || r < 0.0)
        {
            return Err(MclError::invalid("radius", format!("must be >= 0, got {}", r)));
        }

        let variance = match self {
            InitStrategy::DiskGaussianHeading {
                heading_variance, ..
            }
            | InitStrategy::FreeMapGaussianHeading { heading_variance } => Some(*heading_variance),
            _ => None,
        };
        if let Some(v) = variance
            && (!v.is_finite() || v < 0.0)
        {
            return Err(MclError::invalid(
                "heading_variance",
                format!("must be >= 0, got {}", v),
            ));
        }
        Ok(())
    }

    /// Whether this strategy samples positions from the whole map.
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            InitStrategy::FreeMap
                | InitStrategy::FreeMapRandomHeading
                | InitStrategy::FreeMapGaussianHeading { .. }
        )
    }
}

/// Uniform heading in [-π, π).
#[inline]
pub(crate) fn random_heading<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.random_range(-PI..PI)
}

#[inline]
fn gaussian_heading<R: Rng + ?Sized>(rng: &mut R, theta: f32, variance: f32) -> f32 {
    if variance > 0.0 {
        let z: f32 = rng.sample(StandardNormal);
        theta + z * variance.sqrt()
    } else {
        theta
    }
}

/// Uniform point in a disk of `radius` around `center`.
#[inline]
fn disk_point<R: Rng + ?Sized>(rng: &mut R, center: &Pose2D, radius: f32) -> Point2D {
    let a = rng.random_range(-PI..PI);
    let r = rng.random_range(0.0f32..1.0).sqrt() * radius;
    Point2D::new(center.x + r * a.cos(), center.y + r * a.sin())
}

/// Seed `count` particles with weight `1/count`.
///
/// Free-map strategies fail with [`MclError::FreeCellSampling`] when a
/// free cell cannot be found within [`FREE_CELL_RETRIES`] retries.
pub fn seed_particles<R: Rng + ?Sized>(
    strategy: &InitStrategy,
    start: &Pose2D,
    count: usize,
    grid: &OccupancyGrid,
    rng: &mut R,
) -> Result<Vec<Particle>> {
    strategy.validate()?;

    let weight = 1.0 / count.max(1) as f64;
    let mut particles = Vec::with_capacity(count);

    for _ in 0..count {
        let pose = match *strategy {
            InitStrategy::AtPose => *start,
            InitStrategy::AtPositionRandomHeading => {
                Pose2D::new(start.x, start.y, random_heading(rng))
            }
            InitStrategy::Disk { radius } => {
                Pose2D::from_point(disk_point(rng, start, radius), start.theta)
            }
            InitStrategy::DiskRandomHeading { radius } => {
                let p = disk_point(rng, start, radius);
                Pose2D::from_point(p, random_heading(rng))
            }
            InitStrategy::DiskGaussianHeading {
                radius,
                heading_variance,
            } => {
                let p = disk_point(rng, start, radius);
                Pose2D::from_point(p, gaussian_heading(rng, start.theta, heading_variance))
            }
            InitStrategy::FreeMap => {
                let p = grid.sample_free_cell(0.0, FREE_CELL_RETRIES, rng)?;
                Pose2D::from_point(p, start.theta)
            }
            InitStrategy::FreeMapRandomHeading => {
                let p = grid.sample_free_cell(0.0, FREE_CELL_RETRIES, rng)?;
                Pose2D::from_point(p, random_heading(rng))
            }
            InitStrategy::FreeMapGaussianHeading { heading_variance } => {
                let p = grid.sample_free_cell(0.0, FREE_CELL_RETRIES, rng)?;
                Pose2D::from_point(p, gaussian_heading(rng, start.theta, heading_variance))
            }
        };
        particles.push(Particle::with_weight(pose, weight));
    }

    Ok(particles)
}
