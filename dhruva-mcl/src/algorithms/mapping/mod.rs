//! Mapping module.
//!
//! Static occupancy grid with a precomputed ray-casting cache.
//!
//! # Components
//!
//! - [`OccupancyGrid`]: 2D grid of occupancy probabilities
//! - [`RayCast`]: Outcome of a grid-traversal ray cast
//! - [`RayCastCache`]: Expected range per free cell per angle bin
//!
//! # Example
//!
//! ```ignore
//! use dhruva_mcl::algorithms::mapping::{GridGeometry, OccupancyGrid};
//!
//! let mut grid = OccupancyGrid::from_probabilities(width, height, cells, geometry)?;
//! grid.build_cache(1.0_f32.to_radians())?;
//!
//! let expected = grid.cache().unwrap().expected_range(gx, gy, bin);
//! ```

mod occupancy_grid;
mod ray_cast_cache;
mod ray_caster;

pub use occupancy_grid::{GridGeometry, OccupancyGrid};
pub use ray_cast_cache::RayCastCache;
pub use ray_caster::RayCast;
