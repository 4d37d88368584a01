//! Grid ray casting.
//!
//! Walks the cells crossed by a ray using a DDA (digital differential
//! analyzer) traversal, starting at the center of the origin cell. Every
//! cell whose interior the ray crosses is visited exactly once, so thin
//! walls cannot be skipped.

use super::occupancy_grid::OccupancyGrid;

/// Result of casting a single ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayCast {
    /// Ray reached an occupied cell.
    Hit {
        /// First occupied cell along the ray
        cell: (usize, usize),
        /// Euclidean distance between cell indices, in world units
        distance: f32,
    },
    /// Ray left the map without hitting anything.
    NoHit,
    /// Origin cell is outside the map.
    OutOfBounds,
    /// Origin cell is itself occupied.
    AlreadyOccupied,
}

impl RayCast {
    /// Hit distance, if any.
    #[inline]
    pub fn distance(&self) -> Option<f32> {
        match self {
            RayCast::Hit { distance, .. } => Some(*distance),
            _ => None,
        }
    }
}

impl OccupancyGrid {
    /// Cast a ray from cell `(gx, gy)` in direction `angle` (radians, world frame).
    pub fn cast_ray(&self, gx: usize, gy: usize, angle: f32) -> RayCast {
        let (width, height) = self.dimensions();
        if gx >= width || gy >= height {
            return RayCast::OutOfBounds;
        }
        if self.is_occupied(gx, gy) {
            return RayCast::AlreadyOccupied;
        }

        let angle = angle as f64;
        let (dir_y, dir_x) = angle.sin_cos();

        let step_x: i64 = if dir_x < 0.0 { -1 } else { 1 };
        let step_y: i64 = if dir_y < 0.0 { -1 } else { 1 };

        // Ray length needed to cross one cell along each axis
        let delta_x = if dir_x == 0.0 { f64::INFINITY } else { (1.0 / dir_x).abs() };
        let delta_y = if dir_y == 0.0 { f64::INFINITY } else { (1.0 / dir_y).abs() };

        // Starting from the cell center, the first boundary is half a cell away
        let mut side_x = 0.5 * delta_x;
        let mut side_y = 0.5 * delta_y;

        let (mut cx, mut cy) = (gx as i64, gy as i64);

        loop {
            if side_x < side_y {
                side_x += delta_x;
                cx += step_x;
            } else {
                side_y += delta_y;
                cy += step_y;
            }

            if !self.contains(cx, cy) {
                return RayCast::NoHit;
            }

            let (ux, uy) = (cx as usize, cy as usize);
            if self.is_occupied(ux, uy) {
                let dx = (cx - gx as i64) as f32;
                let dy = (cy - gy as i64) as f32;
                return RayCast::Hit {
                    cell: (ux, uy),
                    distance: dx.hypot(dy) * self.resolution(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::occupancy_grid::test_support::walled_grid;
    use super::super::occupancy_grid::GridGeometry;
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn test_axis_aligned_hits() {
        // 10x10 with walls on the border, free interior 1..=8
        let grid = walled_grid(10, 10, 1.0);

        assert_eq!(
            grid.cast_ray(5, 5, 0.0),
            RayCast::Hit {
                cell: (9, 5),
                distance: 4.0
            }
        );
        assert_eq!(grid.cast_ray(5, 5, PI).distance(), Some(5.0));
        assert_eq!(grid.cast_ray(5, 5, FRAC_PI_2).distance(), Some(4.0));
        assert_eq!(grid.cast_ray(5, 5, -FRAC_PI_2).distance(), Some(5.0));
    }

    #[test]
    fn test_distance_scales_with_resolution() {
        let grid = walled_grid(10, 10, 0.25);
        assert_relative_eq!(grid.cast_ray(5, 5, 0.0).distance().unwrap(), 1.0);
    }

    #[test]
    fn test_diagonal_hit_uses_cell_distance() {
        let grid = walled_grid(10, 10, 1.0);
        match grid.cast_ray(1, 1, FRAC_PI_4) {
            RayCast::Hit { cell, distance } => {
                let dx = cell.0 as f32 - 1.0;
                let dy = cell.1 as f32 - 1.0;
                assert_relative_eq!(distance, dx.hypot(dy));
                assert!(grid.is_occupied(cell.0, cell.1));
            }
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[test]
    fn test_thin_wall_is_not_skipped() {
        // Single-cell diagonal wall through an otherwise empty map
        let n = 20;
        let mut cells = vec![0.0; n * n];
        for i in 0..n {
            cells[i * n + (n - 1 - i)] = 1.0;
        }
        let grid = OccupancyGrid::from_probabilities(n, n, cells, GridGeometry::new(1.0)).unwrap();

        for k in 0..32 {
            let angle = 0.05 + k as f32 * (FRAC_PI_2 - 0.1) / 31.0;
            assert!(
                matches!(grid.cast_ray(2, 2, angle), RayCast::Hit { .. }),
                "ray at {} slipped through",
                angle
            );
        }
    }

    #[test]
    fn test_no_hit_and_degenerate_origins() {
        let grid = OccupancyGrid::from_probabilities(4, 4, vec![0.0; 16], GridGeometry::new(1.0))
            .unwrap();
        assert_eq!(grid.cast_ray(1, 1, 0.3), RayCast::NoHit);
        assert_eq!(grid.cast_ray(4, 0, 0.0), RayCast::OutOfBounds);

        let walled = walled_grid(4, 4, 1.0);
        assert_eq!(walled.cast_ray(0, 0, 0.0), RayCast::AlreadyOccupied);
        assert_eq!(walled.cast_ray(0, 0, 0.0).distance(), None);
    }
}
