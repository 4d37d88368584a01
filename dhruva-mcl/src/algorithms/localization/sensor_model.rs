//! Beam measurement model for the particle filter weighting step.
//!
//! Implements the beam range finder model from Probabilistic Robotics: a
//! single range reading is scored against the range a ray cast from the
//! particle pose expects, as a mixture of four causes:
//!
//! | cause   | density                                          |
//! |---------|--------------------------------------------------|
//! | hit     | N(observed; expected, σ²) on (0, max]            |
//! | short   | λe^(−λ·observed) / (1 − e^(−λ·expected)) on (0, expected] |
//! | max     | 1 when observed ≤ 0 or observed ≥ max            |
//! | random  | 1 / max on (0, max)                              |

use serde::{Deserialize, Serialize};

use crate::core::math::gaussian_pdf;

/// Beam model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamModelParams {
    /// Maximum sensor range in world units.
    pub max_range: f64,

    /// Variance of the hit component (world units²).
    pub hit_variance: f64,

    /// Rate λ of the exponential short-reading component.
    pub short_rate: f64,

    /// Mixture weights `[z_hit, z_short, z_max, z_rand]`.
    ///
    /// Expected to sum to 1; [`crate::MclConfig::validate`] checks this.
    pub weights: [f64; 4],
}

impl Default for BeamModelParams {
    fn default() -> Self {
        Self {
            max_range: 8.0,
            hit_variance: 0.04,
            short_rate: 0.5,
            weights: [0.85, 0.05, 0.05, 0.05],
        }
    }
}

impl BeamModelParams {
    /// Sum of the four mixture weights.
    pub fn weights_sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// Likelihood of reading `observed` when the map predicts `expected`.
///
/// Always finite and non-negative for finite inputs.
pub fn beam_likelihood(observed: f64, expected: f64, params: &BeamModelParams) -> f64 {
    let [z_hit, z_short, z_max, z_rand] = params.weights;
    let max = params.max_range;

    let in_range = observed > 0.0 && observed < max;

    let p_hit = if observed > 0.0 && observed <= max {
        gaussian_pdf(params.hit_variance, expected, observed)
    } else {
        0.0
    };

    let p_short = if observed > 0.0 && observed <= expected {
        let rate = params.short_rate;
        let norm = 1.0 - (-rate * expected).exp();
        if norm > 0.0 {
            rate * (-rate * observed).exp() / norm
        } else {
            0.0
        }
    } else {
        0.0
    };

    let p_max = if observed <= 0.0 || observed >= max {
        1.0
    } else {
        0.0
    };

    let p_rand = if in_range { 1.0 / max } else { 0.0 };

    z_hit * p_hit + z_short * p_short + z_max * p_max + z_rand * p_rand
}
