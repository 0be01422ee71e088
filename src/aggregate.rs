//! Repeated sampling of one grid point.

use crate::runner::{SampleOutcome, SampleSource};
use crate::types::{Aggregate, ConfigKey};

/// Upper bound on samples reserved up front; larger runs grow as they go.
const MAX_RESERVED_SAMPLES: usize = 1024;

/// What happened while sampling one grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointOutcome {
    /// Mean and variance of the valid samples, or unmeasured.
    pub aggregate: Aggregate,
    /// Number of invocations made.
    pub attempts: usize,
    /// Number of invocations whose sample was dropped.
    pub discarded: usize,
}

impl PointOutcome {
    /// Number of samples that contributed to the aggregate.
    pub fn valid(&self) -> usize {
        self.attempts - self.discarded
    }
}

/// Sample `key` exactly `repetitions` times and reduce the valid samples.
///
/// Discarded samples are logged and skipped. If none survive, the point is
/// unmeasured; there are no retries beyond `repetitions`.
pub fn aggregate_point(
    source: &dyn SampleSource,
    key: &ConfigKey,
    repetitions: usize,
) -> PointOutcome {
    let mut samples = sample_buffer(repetitions);
    let mut discarded = 0;

    for run in 0..repetitions {
        match source.sample(key) {
            SampleOutcome::Parsed(value) => samples.push(value),
            SampleOutcome::Discarded(reason) => {
                discarded += 1;
                tracing::warn!(
                    "{}: run {}/{} discarded ({})",
                    key,
                    run + 1,
                    repetitions,
                    reason
                );
            }
        }
    }

    PointOutcome {
        aggregate: Aggregate::from_samples(&samples),
        attempts: repetitions,
        discarded,
    }
}

fn sample_buffer(repetitions: usize) -> Vec<f64> {
    Vec::with_capacity(repetitions.min(MAX_RESERVED_SAMPLES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::FnSource;
    use std::cell::Cell;

    /// Replays canned outputs in order, cycling.
    fn replay(outputs: &'static [&'static str]) -> FnSource<impl Fn(&ConfigKey) -> String> {
        let calls = Cell::new(0usize);
        FnSource::new("replay", move |_key: &ConfigKey| {
            let i = calls.get();
            calls.set(i + 1);
            outputs[i % outputs.len()].to_string()
        })
    }

    fn key() -> ConfigKey {
        ConfigKey::new(4096, 1, "simple")
    }

    #[test]
    fn test_three_good_samples() {
        let source = replay(&["2.0", "4.0", "6.0"]);
        let outcome = aggregate_point(&source, &key(), 3);

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.discarded, 0);
        assert_eq!(outcome.valid(), 3);
        assert_eq!(outcome.aggregate.mean(), Some(4.0));
        let var = outcome.aggregate.variance().unwrap();
        assert!((var - 8.0 / 3.0).abs() < 1e-12, "got {}", var);
    }

    #[test]
    fn test_all_failed_is_unmeasured() {
        let source = replay(&["", "error"]);
        let outcome = aggregate_point(&source, &key(), 3);

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.discarded, 3);
        assert!(!outcome.aggregate.is_measured());
        assert_eq!(outcome.aggregate.mean(), None);
        assert_eq!(outcome.aggregate.variance(), None);
    }

    #[test]
    fn test_failures_do_not_bias_mean() {
        let source = replay(&["1.0", "garbage", "3.0", ""]);
        let outcome = aggregate_point(&source, &key(), 4);

        assert_eq!(outcome.discarded, 2);
        assert_eq!(outcome.aggregate.mean(), Some(2.0));
        assert_eq!(outcome.aggregate.variance(), Some(1.0));
    }

    #[test]
    fn test_exact_invocation_count() {
        let calls = Cell::new(0usize);
        let source = FnSource::new("count", |_key: &ConfigKey| {
            calls.set(calls.get() + 1);
            "x".to_string()
        });
        let outcome = aggregate_point(&source, &key(), 5);

        assert_eq!(calls.get(), 5);
        assert_eq!(outcome.discarded, 5);
    }

    #[test]
    fn test_huge_repetition_count_reserves_bounded_buffer() {
        let buf = sample_buffer(usize::MAX);
        assert!(buf.is_empty());
        assert!(buf.capacity() >= MAX_RESERVED_SAMPLES);
        assert!(buf.capacity() < usize::MAX / 2);

        assert!(sample_buffer(3).capacity() >= 3);
    }
}
