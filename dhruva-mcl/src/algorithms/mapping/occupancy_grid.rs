//! Static occupancy grid map.
//!
//! Cells hold occupancy probabilities in [0, 1]. A cell is occupied iff its
//! probability is greater than zero.
//!
//! # Coordinate Conversion
//!
//! ```text
//! grid  = center_cells + round((world - offset) / resolution)
//! world = (grid - center_cells) * resolution + offset
//! ```
//!
//! `center` is given in world units and stored in cells.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ray_cast_cache::RayCastCache;
use crate::core::types::Point2D;
use crate::error::{MclError, Result};

/// Placement of a grid in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// World units per cell.
    pub resolution: f32,

    /// World position of the reference cell.
    pub offset: Point2D,

    /// Distance of the reference cell from cell (0, 0), in world units.
    pub center: Point2D,
}

impl GridGeometry {
    /// Geometry with cell (0, 0) at the world origin.
    pub fn new(resolution: f32) -> Self {
        Self {
            resolution,
            offset: Point2D::default(),
            center: Point2D::default(),
        }
    }

    /// Set the world offset.
    pub fn with_offset(mut self, x: f32, y: f32) -> Self {
        self.offset = Point2D::new(x, y);
        self
    }

    /// Set the map center.
    pub fn with_center(mut self, x: f32, y: f32) -> Self {
        self.center = Point2D::new(x, y);
        self
    }
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// 2D occupancy grid map.
///
/// Immutable after construction apart from the one-shot cache build.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    /// Row-major storage: index = y * width + x
    cells: Vec<f32>,

    width: usize,
    height: usize,

    resolution: f32,
    offset: Point2D,

    /// Map center in cells.
    center_cells: Point2D,

    cache: Option<RayCastCache>,
}

impl OccupancyGrid {
    /// Create a grid from per-cell occupancy probabilities.
    ///
    /// `cells` is row-major (`index = y * width + x`).
    pub fn from_probabilities(
        width: usize,
        height: usize,
        cells: Vec<f32>,
        geometry: GridGeometry,
    ) -> Result<Self> {
        if width == 0 || height == 0 || cells.len() != width * height {
            return Err(MclError::GridDimensions {
                width,
                height,
                actual: cells.len(),
            });
        }
        if !geometry.resolution.is_finite() || geometry.resolution <= 0.0 {
            return Err(MclError::invalid(
                "resolution",
                format!("must be > 0, got {}", geometry.resolution),
            ));
        }
        if let Some(bad) = cells
            .iter()
            .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
        {
            return Err(MclError::invalid(
                "cells",
                format!("occupancy {} outside [0, 1]", bad),
            ));
        }

        let center_cells = Point2D::new(
            geometry.center.x / geometry.resolution,
            geometry.center.y / geometry.resolution,
        );

        Ok(Self {
            cells,
            width,
            height,
            resolution: geometry.resolution,
            offset: geometry.offset,
            center_cells,
            cache: None,
        })
    }

    /// Create a grid from 8-bit grayscale pixels (row-major).
    ///
    /// Darker pixels are more likely occupied: `p = (255 - pixel) / 255`.
    /// Probabilities below 0.5 are clamped to 0 (free).
    pub fn from_luma(
        width: usize,
        height: usize,
        pixels: &[u8],
        geometry: GridGeometry,
    ) -> Result<Self> {
        let cells = pixels
            .iter()
            .map(|&px| {
                let p = (255 - px) as f32 / 255.0;
                if p < 0.5 { 0.0 } else { p }
            })
            .collect();
        Self::from_probabilities(width, height, cells, geometry)
    }

    /// Get grid width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Get grid height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Get grid dimensions.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Get the resolution in world units per cell.
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// World placement of this grid.
    pub fn geometry(&self) -> GridGeometry {
        GridGeometry {
            resolution: self.resolution,
            offset: self.offset,
            center: Point2D::new(
                self.center_cells.x * self.resolution,
                self.center_cells.y * self.resolution,
            ),
        }
    }

    /// Raw row-major cell probabilities.
    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    /// Check signed cell indices against the map bounds.
    #[inline]
    pub fn contains(&self, gx: i64, gy: i64) -> bool {
        gx >= 0 && gy >= 0 && (gx as usize) < self.width && (gy as usize) < self.height
    }

    /// Convert world coordinates to cell indices.
    ///
    /// Returns `None` if outside grid bounds.
    #[inline]
    pub fn world_to_grid(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let gx = (self.center_cells.x + ((x - self.offset.x) / self.resolution).round()).floor();
        let gy = (self.center_cells.y + ((y - self.offset.y) / self.resolution).round()).floor();
        if !gx.is_finite() || !gy.is_finite() {
            return None;
        }
        let (gx, gy) = (gx as i64, gy as i64);
        self.contains(gx, gy).then_some((gx as usize, gy as usize))
    }

    /// Convert cell indices to world coordinates.
    ///
    /// Returns `None` if the cell is outside the grid.
    #[inline]
    pub fn grid_to_world(&self, gx: usize, gy: usize) -> Option<Point2D> {
        if gx >= self.width || gy >= self.height {
            return None;
        }
        Some(Point2D::new(
            (gx as f32 - self.center_cells.x) * self.resolution + self.offset.x,
            (gy as f32 - self.center_cells.y) * self.resolution + self.offset.y,
        ))
    }

    /// Occupancy probability of a cell, `None` if out of bounds.
    #[inline]
    pub fn occupancy(&self, gx: usize, gy: usize) -> Option<f32> {
        if gx < self.width && gy < self.height {
            Some(self.cells[gy * self.width + gx])
        } else {
            None
        }
    }

    /// Occupancy probability at world coordinates, `None` if out of bounds.
    pub fn occupancy_at(&self, x: f32, y: f32) -> Option<f32> {
        let (gx, gy) = self.world_to_grid(x, y)?;
        self.occupancy(gx, gy)
    }

    /// Check if an in-bounds cell is occupied.
    #[inline]
    pub fn is_occupied(&self, gx: usize, gy: usize) -> bool {
        self.occupancy(gx, gy).is_some_and(|p| p > 0.0)
    }

    /// Number of unoccupied cells.
    pub fn free_cell_count(&self) -> usize {
        self.cells.iter().filter(|&&p| p <= 0.0).count()
    }

    /// Draw a uniformly random cell whose occupancy is at most `max_probability`.
    ///
    /// Tries at most `retries + 1` cells. Returns the world position of the
    /// accepted cell or [`MclError::FreeCellSampling`] when every attempt hit
    /// an occupied cell.
    pub fn sample_free_cell<R: Rng + ?Sized>(
        &self,
        max_probability: f32,
        retries: usize,
        rng: &mut R,
    ) -> Result<Point2D> {
        let attempts = retries + 1;
        for _ in 0..attempts {
            let gx = rng.random_range(0..self.width);
            let gy = rng.random_range(0..self.height);
            if self.cells[gy * self.width + gx] <= max_probability {
                // In-bounds by construction
                if let Some(p) = self.grid_to_world(gx, gy) {
                    return Ok(p);
                }
            }
        }
        Err(MclError::FreeCellSampling { attempts })
    }

    /// Precompute the ray-casting cache.
    ///
    /// Casts one ray per free cell per angle bin. This is the dominant
    /// one-time cost of a localization session; calling it again rebuilds
    /// the cache from scratch.
    pub fn build_cache(&mut self, angle_resolution: f32) -> Result<()> {
        let cache = RayCastCache::build(self, angle_resolution)?;
        log::info!(
            "Ray-casting cache built: {} free cells x {} angle bins ({} ray casts)",
            cache.free_cells(),
            cache.angle_step(),
            cache.len()
        );
        self.cache = Some(cache);
        Ok(())
    }

    /// The ray-casting cache, if built.
    pub fn cache(&self) -> Option<&RayCastCache> {
        self.cache.as_ref()
    }

    /// Check whether the ray-casting cache has been built.
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }
}
