//! Precomputed expected ranges per free cell and angle bin.
//!
//! Layout: one contiguous block of `angle_step` ranges per free cell, in
//! row-major cell order. Occupied cells have no block; `slots` maps a cell
//! index to its block (or `NO_SLOT`).

use rayon::prelude::*;

use super::occupancy_grid::OccupancyGrid;
use super::ray_caster::RayCast;
use crate::core::math::wrap_two_pi;
use crate::error::{MclError, Result};

const NO_SLOT: u32 = u32::MAX;

/// Ray-casting lookup table for one grid.
#[derive(Debug, Clone)]
pub struct RayCastCache {
    angle_resolution: f32,
    angle_step: usize,
    width: usize,
    height: usize,
    slots: Vec<u32>,
    ranges: Vec<f32>,
}

impl RayCastCache {
    /// Sentinel range for a ray that leaves the map without a hit.
    pub const NO_HIT: f32 = -1.0;

    /// Cast every bin from every free cell of `grid`.
    pub(crate) fn build(grid: &OccupancyGrid, angle_resolution: f32) -> Result<Self> {
        if !angle_resolution.is_finite() || angle_resolution <= 0.0 {
            return Err(MclError::invalid(
                "angle_resolution",
                format!("must be > 0, got {}", angle_resolution),
            ));
        }

        let angle_step = Self::step_count(angle_resolution);
        let (width, height) = grid.dimensions();

        let mut slots = vec![NO_SLOT; width * height];
        let mut free_cells = Vec::new();
        for (index, slot) in slots.iter_mut().enumerate() {
            if grid.cells()[index] <= 0.0 {
                let next = u32::try_from(free_cells.len()).map_err(|_| {
                    MclError::invalid("grid", "too many free cells for the ray-casting cache")
                })?;
                *slot = next;
                free_cells.push((index % width, index / width));
            }
        }

        let mut ranges = vec![Self::NO_HIT; free_cells.len() * angle_step];
        ranges
            .par_chunks_mut(angle_step)
            .zip(free_cells.par_iter())
            .for_each(|(block, &(gx, gy))| {
                for (bin, range) in block.iter_mut().enumerate() {
                    let angle = Self::bin_angle(angle_resolution, bin);
                    *range = match grid.cast_ray(gx, gy, angle) {
                        RayCast::Hit { distance, .. } => distance,
                        _ => Self::NO_HIT,
                    };
                }
            });

        Ok(Self {
            angle_resolution,
            angle_step,
            width,
            height,
            slots,
            ranges,
        })
    }

    /// Number of bins covering a full turn.
    ///
    /// The relative slack absorbs f32 rounding of resolutions that divide a
    /// full turn exactly (1 degree must give 360 bins, not 361).
    fn step_count(angle_resolution: f32) -> usize {
        let exact = std::f64::consts::TAU / angle_resolution as f64;
        ((exact * (1.0 - 1e-6)).ceil() as usize).max(1)
    }

    #[inline]
    fn bin_angle(angle_resolution: f32, bin: usize) -> f32 {
        (bin as f64 * angle_resolution as f64) as f32
    }

    /// Angular width of one bin in radians.
    pub fn angle_resolution(&self) -> f32 {
        self.angle_resolution
    }

    /// Number of angle bins per cell.
    pub fn angle_step(&self) -> usize {
        self.angle_step
    }

    /// Total number of cached ranges (`free_cells * angle_step`).
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if the cache holds no ranges (map without free cells).
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of free cells with a cache block.
    pub fn free_cells(&self) -> usize {
        self.ranges.len() / self.angle_step
    }

    /// World-frame direction of bin `bin`.
    pub fn angle_of_bin(&self, bin: usize) -> f32 {
        Self::bin_angle(self.angle_resolution, bin)
    }

    /// Nearest bin for a world-frame angle. Any angle is accepted.
    #[inline]
    pub fn bin_for_angle(&self, angle: f32) -> usize {
        let bin = (wrap_two_pi(angle) / self.angle_resolution).round() as usize;
        bin % self.angle_step
    }

    /// Cached range from `(gx, gy)` along bin `bin`.
    ///
    /// Returns `None` for out-of-bounds or occupied cells and out-of-range
    /// bins. A ray that leaves the map yields [`Self::NO_HIT`].
    #[inline]
    pub fn expected_range(&self, gx: usize, gy: usize, bin: usize) -> Option<f32> {
        if gx >= self.width || gy >= self.height || bin >= self.angle_step {
            return None;
        }
        let slot = self.slots[gy * self.width + gx];
        if slot == NO_SLOT {
            return None;
        }
        Some(self.ranges[slot as usize * self.angle_step + bin])
    }
}
