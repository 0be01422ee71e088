//! Grid point identifiers and per-point aggregates.

use std::fmt;

use crate::statistics::SampleStats;

/// One grid point: (matrix size, thread count, calculation mode).
///
/// Immutable once constructed. Equality and hashing are structural, so a key
/// rebuilt from its parts looks up the same table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    matrix_size: u32,
    threads: u32,
    mode: String,
}

impl ConfigKey {
    /// Create a key from its three coordinates.
    pub fn new(matrix_size: u32, threads: u32, mode: impl Into<String>) -> Self {
        Self {
            matrix_size,
            threads,
            mode: mode.into(),
        }
    }

    /// Matrix dimension passed to the benchmark binary.
    pub fn matrix_size(&self) -> u32 {
        self.matrix_size
    }

    /// Worker thread count passed to the benchmark binary.
    pub fn threads(&self) -> u32 {
        self.threads
    }

    /// Calculation mode tag (e.g. `simple`, `tasks`, `sections`).
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// The key at the same matrix size and mode but a different thread count.
    ///
    /// Used to look up the baseline point for speedup.
    pub fn with_threads(&self, threads: u32) -> Self {
        Self {
            matrix_size: self.matrix_size,
            threads,
            mode: self.mode.clone(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ms: {}, tc: {}, ct: {}",
            self.matrix_size, self.threads, self.mode
        )
    }
}

/// Mean and variance for one grid point, or nothing if it was never measured.
///
/// A point is unmeasured when none of its repetitions produced a parseable
/// sample (or when it was restored from a checkpoint row with empty fields).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregate {
    stats: Option<SampleStats>,
}

impl Aggregate {
    /// Aggregate for a point with no valid samples.
    pub fn unmeasured() -> Self {
        Self { stats: None }
    }

    /// Aggregate with known statistics.
    pub fn measured(stats: SampleStats) -> Self {
        Self { stats: Some(stats) }
    }

    /// Reduce the valid samples of one point.
    pub fn from_samples(samples: &[f64]) -> Self {
        Self {
            stats: SampleStats::from_samples(samples),
        }
    }

    /// Whether at least one sample contributed.
    pub fn is_measured(&self) -> bool {
        self.stats.is_some()
    }

    /// Mean of the valid samples.
    pub fn mean(&self) -> Option<f64> {
        self.stats.map(|s| s.mean)
    }

    /// Population variance of the valid samples.
    pub fn variance(&self) -> Option<f64> {
        self.stats.map(|s| s.variance)
    }

    /// Underlying statistics, if measured.
    pub fn stats(&self) -> Option<SampleStats> {
        self.stats
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stats {
            Some(s) => write!(f, "avg_result: {}, variance: {}", s.mean, s.variance),
            None => write!(f, "avg_result: None, variance: None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_structural_equality() {
        let a = ConfigKey::new(512, 4, "simple");
        let b = ConfigKey::new(512, 4, String::from("simple"));
        let c = ConfigKey::new(512, 4, "tasks");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<ConfigKey> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
    }

    #[test]
    fn test_with_threads_keeps_other_coordinates() {
        let key = ConfigKey::new(1024, 8, "sections");
        let base = key.with_threads(1);

        assert_eq!(base.matrix_size(), 1024);
        assert_eq!(base.threads(), 1);
        assert_eq!(base.mode(), "sections");
        assert_eq!(key.threads(), 8);
    }

    #[test]
    fn test_key_display() {
        let key = ConfigKey::new(4096, 6, "simple");
        assert_eq!(key.to_string(), "ms: 4096, tc: 6, ct: simple");
    }

    #[test]
    fn test_unmeasured_has_neither_mean_nor_variance() {
        let agg = Aggregate::from_samples(&[]);
        assert!(!agg.is_measured());
        assert_eq!(agg.mean(), None);
        assert_eq!(agg.variance(), None);
        assert_eq!(agg, Aggregate::unmeasured());
        assert_eq!(agg.to_string(), "avg_result: None, variance: None");
    }

    #[test]
    fn test_measured_exposes_both() {
        let agg = Aggregate::from_samples(&[1.0, 3.0]);
        assert_eq!(agg.mean(), Some(2.0));
        assert_eq!(agg.variance(), Some(1.0));
        assert_eq!(agg.to_string(), "avg_result: 2, variance: 1");
    }
}
