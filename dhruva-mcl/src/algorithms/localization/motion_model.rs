//! Probabilistic motion models for particle prediction.
//!
//! Two samplers from Probabilistic Robotics (Thrun et al.):
//!
//! - **Odometry**: the measured pose change is decomposed into
//!   rotation → translation → rotation, each perturbed with noise
//!   proportional to the motion.
//! - **Velocity**: a (v, ω) command integrated over `dt` along a circular
//!   arc, with an extra heading drift term.
//!
//! Noise coefficients are variances per squared motion unit. All sampled
//! headings are normalized to (-π, π].

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::core::math::{angle_diff, gaussian_pdf};
use crate::core::types::{Pose2D, Twist2D};

/// Which motion sampler drives prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionModel {
    /// Odometry pose deltas
    #[default]
    Odometry,
    /// Velocity commands integrated over a time step
    Velocity,
}

/// Motion noise coefficients α₁..α₆.
///
/// Odometry uses α₁..α₄:
/// - `α₁`: rotation variance from rotation
/// - `α₂`: rotation variance from translation
/// - `α₃`: translation variance from translation
/// - `α₄`: translation variance from rotation
///
/// Velocity uses all six: (α₁, α₂) perturb v, (α₃, α₄) perturb ω and
/// (α₅, α₆) drive the heading drift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MotionNoise(pub [f32; 6]);

impl Default for MotionNoise {
    fn default() -> Self {
        Self([0.05, 0.01, 0.05, 0.01, 0.01, 0.01])
    }
}

impl MotionNoise {
    /// Noise-free motion.
    pub fn zero() -> Self {
        Self([0.0; 6])
    }

    /// Low noise (good encoders, hard floors).
    pub fn low_noise() -> Self {
        Self([0.01, 0.002, 0.01, 0.002, 0.002, 0.002])
    }

    /// High noise (slippery floors, poor encoders).
    pub fn high_noise() -> Self {
        Self([0.2, 0.05, 0.2, 0.05, 0.05, 0.05])
    }

    /// Coefficient αᵢ (1-based, like the textbook).
    #[inline]
    pub fn alpha(&self, i: usize) -> f32 {
        self.0[i - 1]
    }

    /// Check every coefficient is finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|a| a.is_finite() && *a >= 0.0)
    }
}

/// Zero-mean Gaussian sample with the given variance.
#[inline]
fn sample_noise<R: Rng + ?Sized>(rng: &mut R, variance: f32) -> f32 {
    if variance > 0.0 {
        let z: f32 = rng.sample(StandardNormal);
        z * variance.sqrt()
    } else {
        0.0
    }
}

/// Rotation-translation-rotation decomposition of the motion `from → to`.
#[inline]
fn decompose(from: &Pose2D, to: &Pose2D) -> (f32, f32, f32) {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let trans = dx.hypot(dy);
    // Heading of an in-place rotation is undefined
    let rot1 = if trans < 1e-6 {
        0.0
    } else {
        angle_diff(from.theta, dy.atan2(dx))
    };
    let rot2 = angle_diff(rot1, angle_diff(from.theta, to.theta));
    (rot1, trans, rot2)
}

/// Sample a successor of `pose` given the odometry reading moved from
/// `prev_odom` to `odom`.
///
/// With zero noise and no odometry change the pose is returned unchanged.
pub fn sample_odometry_motion<R: Rng + ?Sized>(
    prev_odom: &Pose2D,
    odom: &Pose2D,
    pose: &Pose2D,
    noise: &MotionNoise,
    rng: &mut R,
) -> Pose2D {
    let (rot1, trans, rot2) = decompose(prev_odom, odom);

    let (rot1_sq, trans_sq, rot2_sq) = (rot1 * rot1, trans * trans, rot2 * rot2);
    let a = |i| noise.alpha(i);

    let noisy_rot1 = angle_diff(
        sample_noise(rng, a(1) * rot1_sq + a(2) * trans_sq),
        rot1,
    );
    let noisy_trans = trans - sample_noise(rng, a(3) * trans_sq + a(4) * (rot1_sq + rot2_sq));
    let noisy_rot2 = angle_diff(
        sample_noise(rng, a(1) * rot2_sq + a(2) * trans_sq),
        rot2,
    );

    let heading = pose.theta + noisy_rot1;
    Pose2D::new(
        pose.x + noisy_trans * heading.cos(),
        pose.y + noisy_trans * heading.sin(),
        heading + noisy_rot2,
    )
}

/// Sample a successor of `pose` after executing `control` for `dt` seconds.
///
/// Falls back to straight-line motion when the perturbed angular velocity
/// is exactly zero.
pub fn sample_velocity_motion<R: Rng + ?Sized>(
    control: &Twist2D,
    dt: f32,
    pose: &Pose2D,
    noise: &MotionNoise,
    rng: &mut R,
) -> Pose2D {
    let (v, w) = (control.linear, control.angular);
    let (v_sq, w_sq) = (v * v, w * w);
    let a = |i| noise.alpha(i);

    let v_hat = v + sample_noise(rng, a(1) * v_sq + a(2) * w_sq);
    let w_hat = w + sample_noise(rng, a(3) * v_sq + a(4) * w_sq);
    let drift = sample_noise(rng, a(5) * v_sq + a(6) * w_sq);

    let theta = pose.theta;
    if w_hat == 0.0 {
        return Pose2D::new(
            pose.x + v_hat * dt * theta.cos(),
            pose.y + v_hat * dt * theta.sin(),
            theta + drift * dt,
        );
    }

    let radius = v_hat / w_hat;
    let end = theta + w_hat * dt;
    Pose2D::new(
        pose.x - radius * theta.sin() + radius * end.sin(),
        pose.y + radius * theta.cos() - radius * end.cos(),
        end + drift * dt,
    )
}

/// Density of reaching `new_pose` from `prev_pose` given the odometry
/// reading moved from `prev_odom` to `odom`.
///
/// Product of three zero-mean normal densities over the rotation and
/// translation residuals. With all-zero noise the density is 0 everywhere.
pub fn odometry_motion_probability(
    new_pose: &Pose2D,
    prev_pose: &Pose2D,
    prev_odom: &Pose2D,
    odom: &Pose2D,
    noise: &MotionNoise,
) -> f64 {
    let (rot1, trans, rot2) = decompose(prev_odom, odom);
    let (hat_rot1, hat_trans, hat_rot2) = decompose(prev_pose, new_pose);

    let a = |i| noise.alpha(i) as f64;
    let (r1, t, r2) = (hat_rot1 as f64, hat_trans as f64, hat_rot2 as f64);

    let p1 = gaussian_pdf(
        a(1) * r1 * r1 + a(2) * t * t,
        0.0,
        angle_diff(rot1, hat_rot1) as f64,
    );
    let p2 = gaussian_pdf(
        a(3) * t * t + a(4) * (r1 * r1 + r2 * r2),
        0.0,
        (trans - hat_trans) as f64,
    );
    let p3 = gaussian_pdf(
        a(1) * r2 * r2 + a(2) * t * t,
        0.0,
        angle_diff(rot2, hat_rot2) as f64,
    );

    p1 * p2 * p3
}
