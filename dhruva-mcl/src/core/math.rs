//! Mathematical primitives for 2D localization.
//!
//! Functions for angle normalization, angular arithmetic and the normal
//! density used by the probabilistic models.

use std::f32::consts::{PI, TAU};

/// Normalize angle to (-π, π].
///
/// `-π` maps to `+π` so every heading has exactly one representation.
///
/// # Example
/// ```
/// use dhruva_mcl::core::math::normalize_angle;
/// use std::f32::consts::PI;
///
/// assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-6);
/// assert!((normalize_angle(-PI) - PI).abs() < 1e-6);
/// ```
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Shortest angular difference from angle `a` to angle `b`.
///
/// Returns the signed angle you need to add to `a` to reach `b`,
/// taking the shortest path around the circle.
///
/// # Example
/// ```
/// use dhruva_mcl::core::math::angle_diff;
/// use std::f32::consts::PI;
///
/// // From 0 to π/2 is +π/2
/// assert!((angle_diff(0.0, PI / 2.0) - PI / 2.0).abs() < 1e-6);
///
/// // Crossing the ±π boundary takes the short way
/// let diff = angle_diff(PI - 0.1, -PI + 0.1);
/// assert!((diff - 0.2).abs() < 1e-5);
/// ```
#[inline]
pub fn angle_diff(a: f32, b: f32) -> f32 {
    normalize_angle(b - a)
}

/// Map an angle onto [0, 2π).
#[inline]
pub fn wrap_two_pi(angle: f32) -> f32 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if a >= TAU { 0.0 } else { a }
}

/// Normal probability density with the given `variance` and `mean`,
/// evaluated at `x`.
///
/// A non-positive variance has no density and yields 0.
#[inline]
pub fn gaussian_pdf(variance: f64, mean: f64, x: f64) -> f64 {
    if variance <= 0.0 {
        return 0.0;
    }
    let d = x - mean;
    (-(d * d) / (2.0 * variance)).exp() / (std::f64::consts::TAU * variance).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_angle_zero() {
        assert_relative_eq!(normalize_angle(0.0), 0.0);
    }

    #[test]
    fn test_normalize_angle_pi() {
        assert_relative_eq!(normalize_angle(PI), PI);
        // Lower bound is exclusive
        assert_relative_eq!(normalize_angle(-PI), PI);
    }

    #[test]
    fn test_normalize_angle_wrap_positive() {
        assert_relative_eq!(normalize_angle(2.0 * PI), 0.0, epsilon = 1e-6);
        assert_relative_eq!(normalize_angle(3.0 * PI), PI, epsilon = 1e-6);
        assert_relative_eq!(normalize_angle(4.0 * PI), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_angle_wrap_negative() {
        assert_relative_eq!(normalize_angle(-2.0 * PI), 0.0, epsilon = 1e-6);
        assert_relative_eq!(normalize_angle(-3.0 * PI), PI, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_angle_stays_in_half_open_range() {
        let mut a = -20.0f32;
        while a < 20.0 {
            let n = normalize_angle(a);
            assert!(n > -PI && n <= PI, "{} normalized to {}", a, n);
            a += 0.013;
        }
    }

    #[test]
    fn test_normalize_angle_just_beyond_boundary() {
        let result = normalize_angle(PI + 0.001);
        assert!(result < 0.0, "Should wrap to negative: {}", result);
        assert_relative_eq!(result, -PI + 0.001, epsilon = 1e-5);

        let result = normalize_angle(-PI - 0.001);
        assert!(result > 0.0, "Should wrap to positive: {}", result);
        assert_relative_eq!(result, PI - 0.001, epsilon = 1e-5);
    }

    #[test]
    fn test_angle_diff_same_sign() {
        assert_relative_eq!(angle_diff(0.0, PI / 2.0), PI / 2.0);
        assert_relative_eq!(angle_diff(PI / 2.0, 0.0), -PI / 2.0);
    }

    #[test]
    fn test_angle_diff_crossing_pi() {
        assert_relative_eq!(angle_diff(PI - 0.1, -PI + 0.1), 0.2, epsilon = 1e-5);
        assert_relative_eq!(angle_diff(-PI + 0.1, PI - 0.1), -0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_wrap_two_pi() {
        assert_relative_eq!(wrap_two_pi(-PI / 2.0), 1.5 * PI, epsilon = 1e-6);
        assert_relative_eq!(wrap_two_pi(TAU + 0.5), 0.5, epsilon = 1e-5);
        assert!(wrap_two_pi(-1e-9) < TAU);
    }

    #[test]
    fn test_gaussian_pdf() {
        let peak = 1.0 / (std::f64::consts::TAU).sqrt();
        assert_relative_eq!(gaussian_pdf(1.0, 0.0, 0.0), peak, epsilon = 1e-12);
        assert_relative_eq!(gaussian_pdf(1.0, 2.0, 3.0), peak * (-0.5f64).exp(), epsilon = 1e-12);
        assert_eq!(gaussian_pdf(0.0, 0.0, 0.0), 0.0);
        assert_eq!(gaussian_pdf(-1.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_normalize_handles_nan_gracefully() {
        assert!(normalize_angle(f32::NAN).is_nan());
    }
}
