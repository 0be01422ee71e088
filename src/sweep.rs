//! Sweep engine: walk the grid and aggregate every point.
//!
//! This module provides:
//! - `ResultsTable`: ordered mapping from grid point to aggregate
//! - `SweepRunner`: sequential execution of a sweep over a sample source
//! - `SweepResults`: the finished table plus run metadata
//!
//! # Example
//!
//! ```ignore
//! use scaling_sweep::config::SweepConfig;
//! use scaling_sweep::runner::BinaryRunner;
//! use scaling_sweep::sweep::SweepRunner;
//!
//! let config = SweepConfig::quick().with_binary("./hpc_task1");
//! let runner = SweepRunner::new(Box::new(BinaryRunner::from_config(&config)));
//!
//! let results = runner.run(&config, |p| {
//!     println!("{:.0}% {} {}", p.fraction() * 100.0, p.key, p.aggregate);
//! });
//!
//! println!("{}", scaling_sweep::output::to_markdown(&results));
//! ```

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::aggregate::aggregate_point;
use crate::checkpoint::IncrementalCsvWriter;
use crate::config::SweepConfig;
use crate::runner::SampleSource;
use crate::types::{Aggregate, ConfigKey};

/// Mapping from grid point to aggregate.
///
/// Lookup is by key; iteration follows insertion order, which for a sweep is
/// the grid enumeration order. Entries are never replaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    entries: Vec<(ConfigKey, Aggregate)>,
    index: HashMap<ConfigKey, usize>,
}

impl ResultsTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a point. Returns `false` (and leaves the table untouched) if
    /// the key is already present.
    pub fn insert(&mut self, key: ConfigKey, aggregate: Aggregate) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, aggregate));
        true
    }

    /// Aggregate for a point
    pub fn get(&self, key: &ConfigKey) -> Option<&Aggregate> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, key: &ConfigKey) -> bool {
        self.index.contains_key(key)
    }

    /// Points in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&ConfigKey, &Aggregate)> {
        self.entries.iter().map(|(k, a)| (k, a))
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &ConfigKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of points with a defined mean
    pub fn measured_count(&self) -> usize {
        self.entries.iter().filter(|(_, a)| a.is_measured()).count()
    }

    /// Points whose every repetition was discarded
    pub fn unmeasured(&self) -> impl Iterator<Item = &ConfigKey> {
        self.entries
            .iter()
            .filter(|(_, a)| !a.is_measured())
            .map(|(k, _)| k)
    }
}

/// Progress notification emitted after each grid point.
#[derive(Debug, Clone, Copy)]
pub struct SweepProgress<'a> {
    /// Points finished so far, including this one
    pub completed: usize,
    /// Points in the grid
    pub total: usize,
    /// The point just finished
    pub key: &'a ConfigKey,
    /// Its aggregate
    pub aggregate: &'a Aggregate,
    /// Whether the aggregate came from a checkpoint instead of fresh runs
    pub resumed: bool,
}

impl SweepProgress<'_> {
    /// Completed fraction in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Finished sweep.
#[derive(Debug, Clone)]
pub struct SweepResults {
    /// One entry per grid point, in grid order
    pub table: ResultsTable,
    /// Configuration used
    pub config: SweepConfig,
    /// Name of the sample source
    pub source: String,
    /// Total execution time
    pub total_time: Duration,
    /// Samples dropped across the whole sweep
    pub discarded_samples: usize,
    /// Points restored from a checkpoint rather than measured
    pub resumed_points: usize,
}

impl SweepResults {
    /// Create new empty results
    pub fn new(config: SweepConfig, source: impl Into<String>) -> Self {
        Self {
            table: ResultsTable::new(),
            config,
            source: source.into(),
            total_time: Duration::ZERO,
            discarded_samples: 0,
            resumed_points: 0,
        }
    }

    /// Baseline thread count for speedup
    pub fn baseline_threads(&self) -> u32 {
        self.config.baseline_threads()
    }
}

/// Sequential sweep runner.
///
/// Issues one invocation at a time and blocks on each; there is no
/// parallelism across points or repetitions.
pub struct SweepRunner {
    source: Box<dyn SampleSource>,
}

impl SweepRunner {
    /// Create a runner over a sample source
    pub fn new(source: Box<dyn SampleSource>) -> Self {
        Self { source }
    }

    /// Name of the sample source
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Run the full sweep.
    ///
    /// # Arguments
    /// * `config` - Sweep configuration. A point repeated by an invalid
    ///   configuration is measured once.
    /// * `progress` - Called once per grid point, in grid order
    ///
    /// # Returns
    /// A table covering every grid point, some possibly unmeasured
    pub fn run<F>(&self, config: &SweepConfig, progress: F) -> SweepResults
    where
        F: FnMut(&SweepProgress<'_>),
    {
        self.run_with_checkpoint(config, None, progress)
    }

    /// Run the sweep, persisting each point as it completes.
    ///
    /// Points already present in the checkpoint are restored instead of
    /// re-measured. A failed checkpoint write is logged and the sweep goes on.
    pub fn run_with_checkpoint<F>(
        &self,
        config: &SweepConfig,
        mut checkpoint: Option<&mut IncrementalCsvWriter>,
        mut progress: F,
    ) -> SweepResults
    where
        F: FnMut(&SweepProgress<'_>),
    {
        let start = Instant::now();
        let mut results = SweepResults::new(config.clone(), self.source.name());
        let total = config.iter_points().collect::<HashSet<_>>().len();
        if total < config.total_points() {
            tracing::warn!(
                "configuration repeats grid points; sweeping {} of {}",
                total,
                config.total_points()
            );
        }

        for key in config.iter_points() {
            if results.table.contains(&key) {
                tracing::warn!("skipping repeated grid point {}", key);
                continue;
            }
            let restored = checkpoint.as_deref().and_then(|cp| cp.lookup(&key));

            let (aggregate, resumed) = match restored {
                Some(aggregate) => {
                    results.resumed_points += 1;
                    (aggregate, true)
                }
                None => {
                    let outcome = aggregate_point(self.source.as_ref(), &key, config.repetitions);
                    results.discarded_samples += outcome.discarded;

                    if let Some(cp) = checkpoint.as_deref_mut() {
                        if let Err(e) = cp.write_point(&key, &outcome.aggregate) {
                            tracing::error!("failed to checkpoint {}: {}", key, e);
                        }
                    }
                    (outcome.aggregate, false)
                }
            };

            tracing::info!(
                "{}, {}{}",
                key,
                aggregate,
                if resumed { " (resumed)" } else { "" }
            );
            progress(&SweepProgress {
                completed: results.table.len() + 1,
                total,
                key: &key,
                aggregate: &aggregate,
                resumed,
            });

            results.table.insert(key, aggregate);
        }

        results.total_time = start.elapsed();
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointFingerprint;
    use crate::config::{SizeRange, ThreadRange};
    use crate::runner::FnSource;

    fn small_config() -> SweepConfig {
        SweepConfig::reference()
            .with_matrix_sizes(SizeRange::new(100, 300, 100))
            .with_threads(ThreadRange::new(1, 4))
            .with_modes(["simple", "tasks"])
            .with_repetitions(2)
    }

    /// Runtime ~ size / threads, so speedup is linear.
    fn ideal_source() -> Box<dyn SampleSource> {
        Box::new(FnSource::new("ideal", |key: &ConfigKey| {
            format!("{}", key.matrix_size() as f64 / key.threads() as f64)
        }))
    }

    #[test]
    fn test_table_covers_full_grid() {
        let config = small_config();
        let results = SweepRunner::new(ideal_source()).run(&config, |_| {});

        assert_eq!(results.table.len(), config.total_points());
        assert_eq!(results.table.len(), 2 * 3 * 4);

        let expected: HashSet<ConfigKey> = config.iter_points().collect();
        let actual: HashSet<ConfigKey> = results.table.keys().cloned().collect();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_table_order_follows_grid() {
        let config = small_config();
        let results = SweepRunner::new(ideal_source()).run(&config, |_| {});

        let order: Vec<ConfigKey> = results.table.keys().cloned().collect();
        let grid: Vec<ConfigKey> = config.iter_points().collect();
        assert_eq!(order, grid);
    }

    #[test]
    fn test_aggregates_match_source() {
        let config = small_config();
        let results = SweepRunner::new(ideal_source()).run(&config, |_| {});

        let agg = results.table.get(&ConfigKey::new(300, 4, "tasks")).unwrap();
        assert_eq!(agg.mean(), Some(75.0));
        assert_eq!(agg.variance(), Some(0.0));
        assert_eq!(results.discarded_samples, 0);
        assert_eq!(results.resumed_points, 0);
        assert_eq!(results.source, "ideal");
    }

    #[test]
    fn test_progress_called_per_point_in_order() {
        let config = small_config();
        let mut seen = Vec::new();
        let mut fractions = Vec::new();
        SweepRunner::new(ideal_source()).run(&config, |p| {
            seen.push(p.key.clone());
            fractions.push(p.fraction());
            assert_eq!(p.total, 24);
            assert!(!p.resumed);
        });

        assert_eq!(seen, config.iter_points().collect::<Vec<_>>());
        assert_eq!(fractions.last().copied(), Some(1.0));
    }

    #[test]
    fn test_unmeasured_points_are_kept() {
        let config = small_config();
        let source = FnSource::new("flaky", |key: &ConfigKey| {
            if key.threads() == 3 {
                "Segmentation fault".to_string()
            } else {
                "1.0".to_string()
            }
        });
        let results = SweepRunner::new(Box::new(source)).run(&config, |_| {});

        assert_eq!(results.table.len(), config.total_points());
        let unmeasured: Vec<&ConfigKey> = results.table.unmeasured().collect();
        assert_eq!(unmeasured.len(), 2 * 3);
        assert!(unmeasured.iter().all(|k| k.threads() == 3));
        assert_eq!(results.table.measured_count(), 2 * 3 * 3);
        assert_eq!(results.discarded_samples, 2 * 3 * config.repetitions);
    }

    #[test]
    fn test_repeated_grid_points_measured_once() {
        use std::cell::Cell;
        use std::rc::Rc;

        let config = small_config().with_modes(["simple", "tasks", "simple"]);
        assert!(config.validate().is_err());

        let calls = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&calls);
        let source = FnSource::new("counting", move |key: &ConfigKey| {
            counter.set(counter.get() + 1);
            format!("{}", key.matrix_size())
        });
        let mut last = None;
        let results = SweepRunner::new(Box::new(source)).run(&config, |p| {
            last = Some((p.completed, p.total));
        });

        assert_eq!(results.table.len(), 2 * 3 * 4);
        assert_eq!(calls.get(), 2 * 3 * 4 * config.repetitions);
        assert_eq!(last, Some((24, 24)));
        let order: Vec<ConfigKey> = results.table.keys().cloned().collect();
        let first_seen: Vec<ConfigKey> = small_config().iter_points().collect();
        assert_eq!(order, first_seen);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let config = small_config();
        let runner = SweepRunner::new(ideal_source());
        let first = runner.run(&config, |_| {});
        let second = runner.run(&config, |_| {});
        assert_eq!(first.table, second.table);
    }

    #[test]
    fn test_table_insert_never_replaces() {
        let mut table = ResultsTable::new();
        let key = ConfigKey::new(64, 1, "simple");
        assert!(table.insert(key.clone(), Aggregate::from_samples(&[1.0])));
        assert!(!table.insert(key.clone(), Aggregate::unmeasured()));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&key).and_then(|a| a.mean()), Some(1.0));
        assert!(table.contains(&key));
        assert!(!table.contains(&ConfigKey::new(64, 2, "simple")));
    }

    #[test]
    fn test_checkpoint_resume_skips_points() {
        use std::cell::Cell;
        use std::rc::Rc;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.csv");
        let config = small_config();
        let fingerprint = CheckpointFingerprint::new("ideal", config.repetitions, config.print_mode);

        // First run only covers the "simple" half of the grid
        {
            let half = config.clone().with_modes(["simple"]);
            let mut cp = IncrementalCsvWriter::new(&path, false, &fingerprint).unwrap();
            SweepRunner::new(ideal_source()).run_with_checkpoint(&half, Some(&mut cp), |_| {});
        }

        let calls = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&calls);
        let source = FnSource::new("counting", move |key: &ConfigKey| {
            counter.set(counter.get() + 1);
            format!("{}", key.matrix_size() as f64 / key.threads() as f64)
        });

        let mut cp = IncrementalCsvWriter::new(&path, true, &fingerprint).unwrap();
        assert_eq!(cp.resumed_count, 12);
        let mut resumed_flags = 0;
        let results = SweepRunner::new(Box::new(source)).run_with_checkpoint(
            &config,
            Some(&mut cp),
            |p| {
                if p.resumed {
                    resumed_flags += 1;
                }
            },
        );

        assert_eq!(results.table.len(), 24);
        assert_eq!(results.resumed_points, 12);
        assert_eq!(resumed_flags, 12);
        // Only the "tasks" half was measured
        assert_eq!(calls.get(), 12 * config.repetitions);

        let restored = results.table.get(&ConfigKey::new(200, 4, "simple")).unwrap();
        assert_eq!(restored.mean(), Some(50.0));
        assert_eq!(restored.variance(), Some(0.0));

        let fresh = SweepRunner::new(ideal_source()).run(&config, |_| {});
        assert_eq!(results.table, fresh.table);
    }
}
