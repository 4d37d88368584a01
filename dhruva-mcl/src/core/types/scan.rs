//! Range observation types and scan preprocessing.
//!
//! Preprocessing works in place on [`LaserScan::ranges`] and keeps the
//! angular layout; rejected returns become 0, which [`LaserScan::readings`]
//! skips.

use serde::{Deserialize, Serialize};

/// Single range-bearing observation in the sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeReading {
    /// Bearing in radians relative to the robot heading
    pub angle: f32,
    /// Measured range in world units
    pub range: f32,
}

impl RangeReading {
    /// Create a new reading.
    #[inline]
    pub fn new(angle: f32, range: f32) -> Self {
        Self { angle, range }
    }

    /// Build a reading from a Cartesian point in the sensor frame.
    #[inline]
    pub fn from_point(x: f32, y: f32) -> Self {
        Self {
            angle: y.atan2(x),
            range: x.hypot(y),
        }
    }
}

/// Scan preprocessing applied before weighting.
///
/// The defaults leave a scan unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanFilterConfig {
    /// Ranges below this are dropped (self-reflections, dust).
    pub min_range: f32,

    /// Ranges above this are dropped. `None` keeps long returns, which the
    /// beam model scores as max-range readings.
    pub max_range: Option<f32>,

    /// Fill single dropouts and remove single isolated returns.
    pub glitch_filter: bool,

    /// Half width of the median window; 0 disables the median filter.
    pub median_half_window: usize,
}

impl Default for ScanFilterConfig {
    fn default() -> Self {
        Self {
            min_range: 0.0,
            max_range: None,
            glitch_filter: false,
            median_half_window: 0,
        }
    }
}

/// Range scan in polar coordinates with uniform angular spacing.
///
/// A zero or non-finite range marks an invalid return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    /// Start angle in radians
    pub angle_min: f32,
    /// Angular resolution (radians between consecutive readings)
    pub angle_increment: f32,
    /// Minimum valid range
    pub range_min: f32,
    /// Maximum valid range
    pub range_max: f32,
    /// Range measurements
    pub ranges: Vec<f32>,
}

impl LaserScan {
    /// Create a new laser scan with the given parameters.
    pub fn new(
        angle_min: f32,
        angle_increment: f32,
        range_min: f32,
        range_max: f32,
        ranges: Vec<f32>,
    ) -> Self {
        Self {
            angle_min,
            angle_increment,
            range_min,
            range_max,
            ranges,
        }
    }

    /// Number of range measurements.
    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if scan is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Get the angle for a given index.
    #[inline]
    pub fn angle_at(&self, index: usize) -> f32 {
        self.angle_min + index as f32 * self.angle_increment
    }

    /// Check if a range value is usable.
    ///
    /// Readings at or beyond `range_max` are kept: the beam model scores
    /// them as max-range returns.
    #[inline]
    pub fn is_valid_range(&self, range: f32) -> bool {
        range.is_finite() && range > 0.0 && range >= self.range_min
    }

    /// Valid readings as range-bearing observations.
    pub fn readings(&self) -> Vec<RangeReading> {
        self.ranges
            .iter()
            .enumerate()
            .filter(|&(_, &r)| self.is_valid_range(r))
            .map(|(i, &r)| RangeReading::new(self.angle_at(i), r.min(self.range_max)))
            .collect()
    }

    /// Every `step`-th valid reading. A step of 0 is treated as 1.
    pub fn subsample(&self, step: usize) -> Vec<RangeReading> {
        self.readings().into_iter().step_by(step.max(1)).collect()
    }

    /// Replace ranges below `min` with `below` and ranges above `max` with
    /// `above`.
    pub fn threshold(&mut self, min: f32, below: f32, max: f32, above: f32) {
        for r in &mut self.ranges {
            if *r < min {
                *r = below;
            } else if *r > max {
                *r = above;
            }
        }
    }

    /// Repair single-reading glitches, scanning left to right.
    ///
    /// An invalid return between two valid ones becomes their mean; a valid
    /// return between two invalid ones is dropped. Each decision sees the
    /// already repaired left neighbour.
    pub fn remove_glitches(&mut self) {
        let valid = |r: f32| r.is_finite() && r > 0.0;
        for i in 1..self.ranges.len().saturating_sub(1) {
            let (prev, cur, next) = (self.ranges[i - 1], self.ranges[i], self.ranges[i + 1]);
            if valid(prev) && !valid(cur) && valid(next) {
                self.ranges[i] = (prev + next) / 2.0;
            } else if !valid(prev) && valid(cur) && !valid(next) {
                self.ranges[i] = 0.0;
            }
        }
    }

    /// Replace each range with the median of its `2 * half_window + 1`
    /// neighbourhood.
    ///
    /// The window is clamped at both ends of the scan, repeating the first
    /// and last readings. Scans shorter than the window are left alone.
    pub fn median_filter(&mut self, half_window: usize) {
        let n = self.ranges.len();
        let size = 2 * half_window + 1;
        if half_window == 0 || n < size {
            return;
        }

        let source = self.ranges.clone();
        let mut window = Vec::with_capacity(size);
        for (i, r) in self.ranges.iter_mut().enumerate() {
            window.clear();
            window.extend((0..size).map(|k| {
                let j = (i + k).saturating_sub(half_window).min(n - 1);
                source[j]
            }));
            window.sort_by(f32::total_cmp);
            *r = window[half_window];
        }
    }

    /// Apply the configured range gate, glitch filter and median filter, in
    /// that order.
    pub fn preprocess(&mut self, config: &ScanFilterConfig) {
        let max = config.max_range.unwrap_or(f32::INFINITY);
        self.threshold(config.min_range, 0.0, max, 0.0);
        if config.glitch_filter {
            self.remove_glitches();
        }
        self.median_filter(config.median_half_window);
    }
}
