//! Test utilities for DhruvaMCL integration tests.
//!
//! Synthetic maps and noiseless scans generated by ray casting.

#![allow(dead_code)]

use std::f32::consts::TAU;
use std::sync::Arc;

use dhruva_mcl::{GridGeometry, MclConfig, OccupancyGrid, Pose2D, RangeReading, RayCast};

/// Room with walls on the border and a pillar off centre.
///
/// `width`/`height` are in world units; the pillar covers
/// `[0.3w, 0.4w) x [0.3h, 0.45h)`.
pub fn room(width: f32, height: f32, resolution: f32) -> OccupancyGrid {
    let w = (width / resolution).round() as usize + 1;
    let h = (height / resolution).round() as usize + 1;
    let pillar_x = (0.3 * w as f32) as usize..(0.4 * w as f32) as usize;
    let pillar_y = (0.3 * h as f32) as usize..(0.45 * h as f32) as usize;

    let mut cells = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let wall = x == 0 || y == 0 || x == w - 1 || y == h - 1;
            if wall || (pillar_x.contains(&x) && pillar_y.contains(&y)) {
                cells[y * w + x] = 1.0;
            }
        }
    }
    OccupancyGrid::from_probabilities(w, h, cells, GridGeometry::new(resolution)).unwrap()
}

/// [`room`] with its ray-casting cache built.
pub fn cached_room(width: f32, height: f32, resolution: f32, angle_deg: f32) -> Arc<OccupancyGrid> {
    let mut grid = room(width, height, resolution);
    grid.build_cache(angle_deg.to_radians()).unwrap();
    Arc::new(grid)
}

/// Fully free grid with its cache built.
pub fn free_grid(width: usize, height: usize, resolution: f32, angle_deg: f32) -> Arc<OccupancyGrid> {
    let cells = vec![0.0; width * height];
    let mut grid =
        OccupancyGrid::from_probabilities(width, height, cells, GridGeometry::new(resolution))
            .unwrap();
    grid.build_cache(angle_deg.to_radians()).unwrap();
    Arc::new(grid)
}

/// `beams` evenly spaced noiseless readings from `pose`.
///
/// Rays that leave the map read `max_range`.
pub fn scan(grid: &OccupancyGrid, pose: &Pose2D, beams: usize, max_range: f32) -> Vec<RangeReading> {
    let (gx, gy) = grid
        .world_to_grid(pose.x, pose.y)
        .expect("pose must be inside the map");

    (0..beams)
        .map(|k| {
            let angle = k as f32 * TAU / beams as f32;
            let range = match grid.cast_ray(gx, gy, pose.theta + angle) {
                RayCast::Hit { distance, .. } => distance.min(max_range),
                _ => max_range,
            };
            RangeReading::new(angle, range)
        })
        .collect()
}

/// Configuration used by the room scenarios.
pub fn room_config(num_particles: usize) -> MclConfig {
    let mut config = MclConfig::tracking();
    config.filter.num_particles = num_particles;
    config.measurement.max_range = 5.0;
    config
}
