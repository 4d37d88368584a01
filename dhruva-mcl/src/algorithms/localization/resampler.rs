//! Weight normalization, effective sample size and stratified resampling.
//!
//! Resampling draws one sample per equal-width stratum of the cumulative
//! weight axis (low-variance / stratified scheme), so a particle holding
//! weight `w` is copied either ⌊wN⌋ or ⌈wN⌉ times.

use rand::Rng;

use super::particle_filter::Particle;

/// Degenerate weight sets detected during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WeightAnomaly {
    /// No particles to normalize
    #[error("particle set is empty")]
    Empty,

    /// Every particle has zero weight
    #[error("particle weights sum to zero")]
    ZeroSum,

    /// A weight (or the sum) is NaN, infinite or negative
    #[error("particle weights are not finite")]
    NonFinite,
}

/// Scale weights to sum to 1.
///
/// Returns the raw weight sum. On error the weights are left untouched.
pub fn normalize_weights(particles: &mut [Particle]) -> Result<f64, WeightAnomaly> {
    if particles.is_empty() {
        return Err(WeightAnomaly::Empty);
    }
    if particles
        .iter()
        .any(|p| !p.weight.is_finite() || p.weight < 0.0)
    {
        return Err(WeightAnomaly::NonFinite);
    }

    let sum: f64 = particles.iter().map(|p| p.weight).sum();
    if !sum.is_finite() {
        return Err(WeightAnomaly::NonFinite);
    }
    if sum <= 0.0 {
        return Err(WeightAnomaly::ZeroSum);
    }

    for p in particles.iter_mut() {
        p.weight /= sum;
    }
    Ok(sum)
}

/// Effective sample size `1 / Σw²` of normalized weights.
///
/// Returns 0 for an empty or all-zero set.
pub fn effective_sample_size(particles: &[Particle]) -> f64 {
    let sum_sq: f64 = particles.iter().map(|p| p.weight * p.weight).sum();
    if sum_sq > 0.0 { 1.0 / sum_sq } else { 0.0 }
}

/// Draw `draws` particle indices by stratified sampling over `weights`.
///
/// Weights need not be normalized. Zero-weight particles are never
/// selected; samples that overrun the cumulative sum through rounding map
/// to the last particle with non-zero weight. Returns an empty vector when
/// no weight is positive.
pub fn stratified_indices<R: Rng + ?Sized>(
    weights: &[f64],
    draws: usize,
    rng: &mut R,
) -> Vec<usize> {
    let Some(last_nonzero) = weights.iter().rposition(|&w| w > 0.0) else {
        return Vec::new();
    };
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 || draws == 0 {
        return Vec::new();
    }

    let cumulative: Vec<f64> = weights
        .iter()
        .scan(0.0, |acc, &w| {
            *acc += w / total;
            Some(*acc)
        })
        .collect();

    let step = 1.0 / draws as f64;
    let mut indices = Vec::with_capacity(draws);
    let mut idx = 0;

    for i in 0..draws {
        let u = (i as f64 + rng.random_range(0.0..1.0)) * step;
        while idx < cumulative.len() && cumulative[idx] <= u {
            idx += 1;
        }
        indices.push(if idx < cumulative.len() {
            idx
        } else {
            last_nonzero
        });
    }

    indices
}

/// Stratified resampler over a double-buffered particle set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resampler;

impl Resampler {
    /// Resample `current` into `scratch` by weight, then swap the buffers.
    ///
    /// Afterwards `current` holds N particles of weight 1/N. Returns `false`
    /// without touching either buffer for fewer than two particles or an
    /// all-zero weight set.
    pub fn stratified<R: Rng + ?Sized>(
        current: &mut Vec<Particle>,
        scratch: &mut Vec<Particle>,
        rng: &mut R,
    ) -> bool {
        let n = current.len();
        if n < 2 {
            return false;
        }

        let weights: Vec<f64> = current.iter().map(|p| p.weight).collect();
        let indices = stratified_indices(&weights, n, rng);
        if indices.is_empty() {
            return false;
        }

        let uniform = 1.0 / n as f64;
        scratch.clear();
        scratch.extend(
            indices
                .into_iter()
                .map(|i| Particle::with_weight(current[i].pose, uniform)),
        );
        std::mem::swap(current, scratch);
        true
    }
}

/// Short- and long-term averages of the raw particle weight.
///
/// Drives random-particle injection in augmented MCL: when the short-term
/// average drops below the long-term one, the filter is likely lost.
///
/// Both averages are stored as natural logs. Raw weights are products of
/// hundreds of beam densities and leave the `f64` range long before the
/// filter is in trouble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightTrackers {
    /// `ln` of the long-term average weight (−∞ before the first sample).
    pub log_w_slow: f64,
    /// `ln` of the short-term average weight (−∞ before the first sample).
    pub log_w_fast: f64,
    /// Number of averages folded in.
    pub samples: u64,
}

impl Default for WeightTrackers {
    fn default() -> Self {
        Self {
            log_w_slow: f64::NEG_INFINITY,
            log_w_fast: f64::NEG_INFINITY,
            samples: 0,
        }
    }
}

impl WeightTrackers {
    /// Fold in `ln` of the mean raw weight of one update.
    ///
    /// Equivalent to `w += α(w_avg − w)` on both averages.
    pub fn update(&mut self, log_w_avg: f64, alpha_slow: f64, alpha_fast: f64) {
        self.log_w_slow = smooth_log(self.log_w_slow, log_w_avg, alpha_slow);
        self.log_w_fast = smooth_log(self.log_w_fast, log_w_avg, alpha_fast);
        self.samples += 1;
    }

    /// Fraction of particles to replace with random ones.
    ///
    /// 0 until the long-term average is positive.
    pub fn injection_ratio(&self, v_factor: f64) -> f64 {
        if self.log_w_slow == f64::NEG_INFINITY || self.log_w_slow.is_nan() {
            return 0.0;
        }
        injection_ratio((self.log_w_fast - self.log_w_slow).exp(), v_factor)
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// `ln((1 − α)·e^current + α·e^sample)` without leaving log space.
fn smooth_log(current: f64, sample: f64, alpha: f64) -> f64 {
    let keep = (1.0 - alpha).ln() + current;
    let add = alpha.ln() + sample;
    let hi = keep.max(add);
    if hi == f64::NEG_INFINITY {
        return hi;
    }
    hi + ((keep - hi).exp() + (add - hi).exp()).ln()
}

/// `max(0, 1 − v_factor · w_fast / w_slow)` from the tracker ratio.
pub fn injection_ratio(fast_over_slow: f64, v_factor: f64) -> f64 {
    if fast_over_slow.is_nan() {
        return 0.0;
    }
    (1.0 - v_factor * fast_over_slow).clamp(0.0, 1.0)
}

/// Number of particles to inject for `ratio` out of `n`.
pub fn injection_count(ratio: f64, n: usize) -> usize {
    if ratio.is_nan() || ratio <= 0.0 {
        return 0;
    }
    ((ratio * n as f64).floor() as usize).min(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Pose2D;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn particles(weights: &[f64]) -> Vec<Particle> {
        weights
            .iter()
            .enumerate()
            .map(|(i, &w)| Particle::with_weight(Pose2D::new(i as f32, 0.0, 0.0), w))
            .collect()
    }

    #[test]
    fn test_normalize_sums_to_one() {
        let mut rng = SmallRng::seed_from_u64(3);
        let weights: Vec<f64> = (0..500).map(|_| rng.random_range(0.0..1e-3)).collect();
        let mut set = particles(&weights);

        let raw = normalize_weights(&mut set).unwrap();
        assert!(raw > 0.0);

        let sum: f64 = set.iter().map(|p| p.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(set.iter().all(|p| p.weight >= 0.0));
    }

    #[test]
    fn test_normalize_anomalies_leave_weights() {
        assert_eq!(normalize_weights(&mut []), Err(WeightAnomaly::Empty));

        let mut zeros = particles(&[0.0, 0.0, 0.0]);
        assert_eq!(normalize_weights(&mut zeros), Err(WeightAnomaly::ZeroSum));

        let mut nan = particles(&[0.5, f64::NAN]);
        assert_eq!(normalize_weights(&mut nan), Err(WeightAnomaly::NonFinite));
        assert_eq!(nan[0].weight, 0.5);

        let mut overflow = particles(&[f64::MAX, f64::MAX]);
        assert_eq!(
            normalize_weights(&mut overflow),
            Err(WeightAnomaly::NonFinite)
        );
    }

    #[test]
    fn test_neff_uniform_is_n() {
        let n = 1000;
        let set = particles(&vec![1.0 / n as f64; n]);
        assert_relative_eq!(effective_sample_size(&set), n as f64, max_relative = 1e-9);
    }

    #[test]
    fn test_neff_concentrated_approaches_one() {
        let mut weights = vec![1e-6; 100];
        weights[42] = 1.0;
        let mut set = particles(&weights);
        normalize_weights(&mut set).unwrap();

        let neff = effective_sample_size(&set);
        assert!(neff >= 1.0 && neff < 1.001, "neff = {}", neff);
        assert_eq!(effective_sample_size(&[]), 0.0);
    }

    #[test]
    fn test_collapse_onto_single_particle() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut weights = vec![0.0; 200];
        weights[137] = 1.0;
        let mut current = particles(&weights);
        let mut scratch = Vec::new();

        assert!(Resampler::stratified(&mut current, &mut scratch, &mut rng));

        assert_eq!(current.len(), 200);
        for p in &current {
            assert_eq!(p.pose, Pose2D::new(137.0, 0.0, 0.0));
            assert_relative_eq!(p.weight, 1.0 / 200.0);
        }
    }

    #[test]
    fn test_stratified_copy_counts() {
        let mut rng = SmallRng::seed_from_u64(5);
        let weights = [0.5, 0.25, 0.0, 0.25];
        let indices = stratified_indices(&weights, 8, &mut rng);

        let count = |k| indices.iter().filter(|&&i| i == k).count();
        assert_eq!(count(0), 4);
        assert_eq!(count(1), 2);
        assert_eq!(count(2), 0);
        assert_eq!(count(3), 2);
    }

    #[test]
    fn test_stratified_never_picks_zero_weight() {
        let mut rng = SmallRng::seed_from_u64(9);
        let weights = [0.0, 0.3, 0.0, 0.0, 0.7, 0.0];
        for _ in 0..50 {
            for i in stratified_indices(&weights, 13, &mut rng) {
                assert!(weights[i] > 0.0);
            }
        }
        assert!(stratified_indices(&[0.0, 0.0], 4, &mut rng).is_empty());
    }

    #[test]
    fn test_resample_small_population_is_noop() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut current = particles(&[1.0]);
        let mut scratch = Vec::new();
        assert!(!Resampler::stratified(&mut current, &mut scratch, &mut rng));
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn test_injection_ratio_bounds() {
        // Equal trackers with v_factor 1: no injection
        assert_eq!(injection_ratio(1.0, 1.0), 0.0);
        // Short-term average collapsing: ratio approaches 1
        assert!(injection_ratio(1e-9 / 0.3, 1.0) > 0.999);
        assert_eq!(injection_ratio(0.0, 1.0), 1.0);
        assert_eq!(injection_ratio(f64::INFINITY, 1.0), 0.0);
        assert_eq!(injection_ratio(f64::NAN, 1.0), 0.0);

        assert_eq!(injection_count(1.0, 500), 500);
        assert_eq!(injection_count(0.0, 500), 0);
        assert_eq!(injection_count(0.25, 10), 2);
        assert_eq!(injection_count(f64::NAN, 10), 0);
    }

    #[test]
    fn test_trackers_follow_average() {
        let mut trackers = WeightTrackers::default();
        // Trackers not yet primed
        assert_eq!(trackers.injection_ratio(1.0), 0.0);

        trackers.update(0.0, 0.1, 0.5);
        assert_relative_eq!(trackers.log_w_slow.exp(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(trackers.log_w_fast.exp(), 0.5, epsilon = 1e-12);
        assert_eq!(trackers.samples, 1);
        // Fast tracker above slow: no injection
        assert_eq!(trackers.injection_ratio(1.0), 0.0);

        trackers.update(1.0_f64.ln(), 0.1, 0.5);
        assert_relative_eq!(trackers.log_w_slow.exp(), 0.19, epsilon = 1e-12);
        assert_relative_eq!(trackers.log_w_fast.exp(), 0.75, epsilon = 1e-12);

        for _ in 0..5 {
            trackers.update(1e-6_f64.ln(), 0.1, 0.5);
        }
        assert!(trackers.injection_ratio(1.0) > 0.0);

        trackers.reset();
        assert_eq!(trackers, WeightTrackers::default());
    }

    #[test]
    fn test_trackers_handle_huge_weights() {
        // Mean weight e^900 is not representable as f64
        let mut trackers = WeightTrackers::default();
        for _ in 0..3 {
            trackers.update(900.0, 0.05, 0.5);
        }
        assert!(trackers.log_w_slow > f64::MAX.ln());
        assert!(trackers.log_w_slow.is_finite() && trackers.log_w_fast.is_finite());
        assert_eq!(trackers.injection_ratio(1.0), 0.0);

        // A drop of e^-50 in the short-term average triggers injection
        for _ in 0..10 {
            trackers.update(850.0, 0.05, 0.5);
        }
        assert!(trackers.injection_ratio(1.0) > 0.9);
    }
}
