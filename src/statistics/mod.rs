//! Summary statistics for repeated benchmark samples.
//!
//! This module provides the reduction applied to the samples collected for a
//! single grid point:
//! - Arithmetic mean
//! - Population variance (divisor = sample count, not count - 1)
//!
//! Both are computed from the same slice with a two-pass algorithm, which is
//! numerically safer than the naive sum-of-squares formula for timings that
//! share a large common offset.

/// Mean and population variance of one sample set.
///
/// Only constructed from a non-empty sample slice, so `variance` exists
/// exactly when `mean` does.
///
/// # Example
///
/// ```
/// use scaling_sweep::statistics::SampleStats;
///
/// let stats = SampleStats::from_samples(&[2.0, 4.0, 6.0]).unwrap();
/// assert!((stats.mean - 4.0).abs() < 1e-12);
/// assert!((stats.variance - 8.0 / 3.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStats {
    /// Arithmetic mean of the samples.
    pub mean: f64,
    /// Population variance (mean of squared deviations from `mean`).
    pub variance: f64,
}

impl SampleStats {
    /// Reduce a sample set to its mean and population variance.
    ///
    /// Returns `None` for an empty slice.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let mean = mean(samples)?;
        let variance = population_variance(samples, mean);
        Some(Self { mean, variance })
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Coefficient of variation (std dev / mean), `None` when the mean is zero.
    pub fn relative_std_dev(&self) -> Option<f64> {
        if self.mean == 0.0 {
            None
        } else {
            Some(self.std_dev() / self.mean.abs())
        }
    }
}

fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Mean squared deviation from `mean`. `samples` must be non-empty.
fn population_variance(samples: &[f64], mean: f64) -> f64 {
    let sum: f64 = samples
        .iter()
        .map(|&x| {
            let d = x - mean;
            d * d
        })
        .sum();
    sum / samples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_three_samples() {
        let stats = SampleStats::from_samples(&[2.0, 4.0, 6.0]).unwrap();

        assert!(
            (stats.mean - 4.0).abs() < 1e-12,
            "Expected mean=4.0, got {}",
            stats.mean
        );
        // (4 + 0 + 4) / 3, population divisor
        assert!(
            (stats.variance - 8.0 / 3.0).abs() < 1e-12,
            "Expected variance=2.667, got {}",
            stats.variance
        );
    }

    #[test]
    fn test_single_sample_has_zero_variance() {
        let stats = SampleStats::from_samples(&[0.75]).unwrap();
        assert_eq!(stats.mean, 0.75);
        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.std_dev(), 0.0);
    }

    #[test]
    fn test_empty_is_none() {
        assert!(SampleStats::from_samples(&[]).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_population_not_sample_variance() {
        // Sample variance of [1..5] would be 2.5
        let var = SampleStats::from_samples(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap().variance;
        assert!((var - 2.0).abs() < 1e-12, "got {}", var);
    }

    #[test]
    fn test_large_offset_is_stable() {
        let base = 1.0e9;
        let stats = SampleStats::from_samples(&[base + 1.0, base + 2.0, base + 3.0]).unwrap();
        assert!((stats.variance - 2.0 / 3.0).abs() < 1e-6, "got {}", stats.variance);
    }

    #[test]
    fn test_relative_std_dev() {
        let stats = SampleStats::from_samples(&[2.0, 4.0, 6.0]).unwrap();
        let cv = stats.relative_std_dev().unwrap();
        assert!((cv - (8.0f64 / 3.0).sqrt() / 4.0).abs() < 1e-12);

        let zero = SampleStats::from_samples(&[0.0, 0.0]).unwrap();
        assert!(zero.relative_std_dev().is_none());
    }

    proptest! {
        #[test]
        fn stats_are_order_independent(
            mut samples in proptest::collection::vec(1.0e-6f64..1.0e3, 1..40)
        ) {
            let forward = SampleStats::from_samples(&samples).unwrap();
            samples.reverse();
            let backward = SampleStats::from_samples(&samples).unwrap();

            let tol = 1e-9 * forward.mean.abs().max(1.0);
            prop_assert!((forward.mean - backward.mean).abs() <= tol);
            let vtol = 1e-9 * forward.variance.abs().max(1.0);
            prop_assert!((forward.variance - backward.variance).abs() <= vtol);
            prop_assert!(forward.variance >= 0.0);
        }
    }
}
