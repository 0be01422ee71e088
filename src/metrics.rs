//! Derived metrics over a finished results table.
//!
//! Speedup compares a point's mean against the mean at the baseline thread
//! count for the same matrix size and calculation mode:
//!
//! ```text
//! speedup(size, threads, mode) = mean(size, baseline, mode) / mean(size, threads, mode)
//! ```
//!
//! Speedup exists only when both means exist. An unmeasured baseline leaves
//! its whole (size, mode) group without speedup; it is never reported as 0,
//! 1 or infinity. The baseline point itself is always 1.0 once measured. Any
//! other point with a mean of exactly 0 has no speedup, since the ratio is
//! unbounded. Everything here is a read-only view of the table.

use std::collections::HashMap;

use crate::config::SweepConfig;
use crate::sweep::ResultsTable;
use crate::types::ConfigKey;

/// Thread count every speedup is relative to: the minimum of the thread range.
pub fn baseline_threads(config: &SweepConfig) -> u32 {
    config.baseline_threads()
}

/// Speedup of `key` relative to `baseline_threads`.
pub fn speedup(table: &ResultsTable, key: &ConfigKey, baseline_threads: u32) -> Option<f64> {
    let current = table.get(key)?.mean()?;
    let baseline = table.get(&key.with_threads(baseline_threads))?.mean()?;
    if key.threads() == baseline_threads {
        return Some(1.0);
    }
    if current == 0.0 {
        return None;
    }
    Some(baseline / current)
}

/// Every defined speedup, in table order.
pub fn speedups(table: &ResultsTable, baseline_threads: u32) -> Vec<(ConfigKey, f64)> {
    table
        .keys()
        .filter_map(|key| speedup(table, key, baseline_threads).map(|s| (key.clone(), s)))
        .collect()
}

/// One measured point of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub threads: u32,
    pub mean: f64,
    pub variance: f64,
    /// `None` when the baseline of this series is unmeasured
    pub speedup: Option<f64>,
}

/// All measured points for one (calculation mode, matrix size) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub mode: String,
    pub matrix_size: u32,
    /// Ascending by thread count
    pub points: Vec<SeriesPoint>,
}

impl Series {
    /// `(threads, mean)` pairs for plotting
    pub fn mean_line(&self) -> Vec<(u32, f64)> {
        self.points.iter().map(|p| (p.threads, p.mean)).collect()
    }

    /// `(threads, speedup)` pairs, skipping points without speedup
    pub fn speedup_line(&self) -> Vec<(u32, f64)> {
        self.points
            .iter()
            .filter_map(|p| p.speedup.map(|s| (p.threads, s)))
            .collect()
    }
}

/// Group measured points by mode and matrix size.
///
/// Groups appear in the order their first point appears in the table (grid
/// order for a sweep); points within a group are sorted by thread count.
/// Unmeasured points are left out. A group whose points are all unmeasured
/// is still returned, with no points, so every (mode, size) pair shows up.
pub fn series(table: &ResultsTable, baseline_threads: u32) -> Vec<Series> {
    let mut groups: Vec<Series> = Vec::new();
    let mut index: HashMap<(&str, u32), usize> = HashMap::new();

    for (key, aggregate) in table.iter() {
        let slot = *index.entry((key.mode(), key.matrix_size())).or_insert_with(|| {
            groups.push(Series {
                mode: key.mode().to_string(),
                matrix_size: key.matrix_size(),
                points: Vec::new(),
            });
            groups.len() - 1
        });

        if let Some(stats) = aggregate.stats() {
            groups[slot].points.push(SeriesPoint {
                threads: key.threads(),
                mean: stats.mean,
                variance: stats.variance,
                speedup: speedup(table, key, baseline_threads),
            });
        }
    }

    for group in &mut groups {
        group.points.sort_by_key(|p| p.threads);
    }
    groups
}

/// Series for one calculation mode, in table order.
pub fn series_for_mode(table: &ResultsTable, baseline_threads: u32, mode: &str) -> Vec<Series> {
    series(table, baseline_threads)
        .into_iter()
        .filter(|s| s.mode == mode)
        .collect()
}
