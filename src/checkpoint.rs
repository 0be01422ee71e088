//! Checkpoint and incremental CSV writing for sweep resumability.
//!
//! This module provides:
//! - `IncrementalCsvWriter`: appends one row per finished grid point and
//!   flushes immediately, so an interrupted sweep keeps what it measured
//! - Resume support: rows already on disk are loaded back as aggregates and
//!   the sweep skips those points
//! - `CheckpointFingerprint`: the settings that produced the rows, stored in
//!   a JSON file next to the CSV and checked before resuming
//!
//! The rows use the same format as the final results CSV (see
//! [`crate::output::CSV_HEADER`]).
//!
//! # Example
//!
//! ```ignore
//! use scaling_sweep::checkpoint::{CheckpointFingerprint, IncrementalCsvWriter};
//! use std::path::Path;
//!
//! let fingerprint = CheckpointFingerprint::for_binary(&config);
//! // Create writer (resume=true loads existing results)
//! let mut writer = IncrementalCsvWriter::new(Path::new("checkpoint.csv"), true, &fingerprint)?;
//!
//! if writer.lookup(&key).is_none() {
//!     let aggregate = measure(&key);
//!     writer.write_point(&key, &aggregate)?;
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::SweepConfig;
use crate::output::{format_csv_row, OutputError, CSV_HEADER};
use crate::statistics::SampleStats;
use crate::types::{Aggregate, ConfigKey};

/// Settings that decide what a checkpoint row means.
///
/// Rows are keyed by grid point only, so resuming with a different binary,
/// run count or print mode would mix measurements of different things.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointFingerprint {
    /// Binary path or source name
    pub source: String,
    pub repetitions: usize,
    pub print_mode: bool,
}

impl CheckpointFingerprint {
    pub fn new(source: impl Into<String>, repetitions: usize, print_mode: bool) -> Self {
        Self {
            source: source.into(),
            repetitions,
            print_mode,
        }
    }

    /// Fingerprint of a sweep over `config.binary`.
    pub fn for_binary(config: &SweepConfig) -> Self {
        Self::new(
            config.binary.display().to_string(),
            config.repetitions,
            config.print_mode,
        )
    }

    /// Where the fingerprint of the checkpoint at `checkpoint` is stored.
    pub fn path_for(checkpoint: &Path) -> PathBuf {
        checkpoint.with_extension("json")
    }

    fn load(path: &Path) -> Result<Option<Self>, OutputError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|e| OutputError::io(path, e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| OutputError::Json {
                path: path.to_path_buf(),
                source,
            })
    }

    fn save(&self, path: &Path) -> Result<(), OutputError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| OutputError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|e| OutputError::io(path, e))
    }
}

impl fmt::Display for CheckpointFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source={}, runs={}, print_mode={}",
            self.source, self.repetitions, self.print_mode
        )
    }
}

/// Incremental CSV writer with checkpoint support.
///
/// The sweep is sequential, so the writer is driven through `&mut self`
/// from the single control thread.
pub struct IncrementalCsvWriter {
    path: PathBuf,
    file: BufWriter<File>,
    completed: HashMap<ConfigKey, Aggregate>,
    /// Number of points loaded from an existing checkpoint.
    pub resumed_count: usize,
}

impl IncrementalCsvWriter {
    /// Create a new incremental CSV writer.
    ///
    /// # Behavior
    /// - If `resume=false`: Creates a new file (truncating if exists), writes header
    /// - If `resume=true` and file exists: Loads completed points, appends new rows
    /// - If `resume=true` and file doesn't exist: Creates new file with header
    ///
    /// The fingerprint is written next to a new file. Resuming fails with
    /// [`OutputError::CheckpointMismatch`] when the stored fingerprint is
    /// missing or differs from `fingerprint`.
    pub fn new(
        path: &Path,
        resume: bool,
        fingerprint: &CheckpointFingerprint,
    ) -> Result<Self, OutputError> {
        let fingerprint_path = CheckpointFingerprint::path_for(path);
        let (file, completed) = if resume && path.exists() {
            let stored = CheckpointFingerprint::load(&fingerprint_path)?;
            if stored.as_ref() != Some(fingerprint) {
                return Err(OutputError::CheckpointMismatch {
                    path: path.to_path_buf(),
                    expected: fingerprint.to_string(),
                    found: stored.map_or_else(|| "no fingerprint".to_string(), |f| f.to_string()),
                });
            }
            let completed = Self::load_completed(path)?;
            let file = OpenOptions::new()
                .append(true)
                .open(path)
                .map_err(|e| OutputError::io(path, e))?;
            (file, completed)
        } else {
            let mut file = File::create(path).map_err(|e| OutputError::io(path, e))?;
            writeln!(file, "{}", CSV_HEADER).map_err(|e| OutputError::io(path, e))?;
            file.flush().map_err(|e| OutputError::io(path, e))?;
            fingerprint.save(&fingerprint_path)?;
            (file, HashMap::new())
        };

        let resumed_count = completed.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            completed,
            resumed_count,
        })
    }

    /// Aggregate recorded for `key`, if it has been completed.
    pub fn lookup(&self, key: &ConfigKey) -> Option<Aggregate> {
        self.completed.get(key).copied()
    }

    /// Path of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the number of completed points.
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Append one finished point and flush it to disk.
    pub fn write_point(&mut self, key: &ConfigKey, aggregate: &Aggregate) -> Result<(), OutputError> {
        writeln!(self.file, "{}", format_csv_row(key, aggregate))
            .and_then(|_| self.file.flush())
            .map_err(|e| OutputError::io(&self.path, e))?;
        self.completed.insert(key.clone(), *aggregate);
        Ok(())
    }

    /// Load completed points from an existing checkpoint file.
    ///
    /// Malformed rows are skipped with a warning; a later row for the same
    /// point wins.
    fn load_completed(path: &Path) -> Result<HashMap<ConfigKey, Aggregate>, OutputError> {
        let file = File::open(path).map_err(|e| OutputError::io(path, e))?;
        let reader = BufReader::new(file);
        let mut completed = HashMap::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!("skipping unreadable line {} in checkpoint: {}", line_num + 1, e);
                    continue;
                }
            };

            if line_num == 0 && line.starts_with("Matrix Size,") {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            match parse_csv_row(&line) {
                Some((key, aggregate)) => {
                    completed.insert(key, aggregate);
                }
                None => tracing::warn!(
                    "could not parse line {} in checkpoint: {}",
                    line_num + 1,
                    line.chars().take(80).collect::<String>()
                ),
            }
        }

        Ok(completed)
    }
}

/// Parse one results row back into a key and aggregate.
///
/// Returns `None` for malformed rows, including a mean without a variance.
pub fn parse_csv_row(line: &str) -> Option<(ConfigKey, Aggregate)> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() != 5 {
        return None;
    }
    let matrix_size: u32 = parts[0].parse().ok()?;
    let threads: u32 = parts[1].parse().ok()?;
    let mode = parts[2];
    if mode.is_empty() {
        return None;
    }

    let aggregate = match (parts[3], parts[4]) {
        ("", "") => Aggregate::unmeasured(),
        (mean, variance) => Aggregate::measured(SampleStats {
            mean: mean.parse().ok()?,
            variance: variance.parse().ok()?,
        }),
    };

    Some((ConfigKey::new(matrix_size, threads, mode), aggregate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn measured(mean: f64, variance: f64) -> Aggregate {
        Aggregate::measured(SampleStats { mean, variance })
    }

    fn fingerprint() -> CheckpointFingerprint {
        CheckpointFingerprint::new("./hpc_task1", 3, false)
    }

    #[test]
    fn test_incremental_write_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.csv");

        let mut writer = IncrementalCsvWriter::new(&path, false, &fingerprint()).unwrap();
        assert_eq!(writer.completed_count(), 0);
        assert_eq!(writer.resumed_count, 0);

        let key = ConfigKey::new(4096, 1, "simple");
        writer.write_point(&key, &measured(12.5, 0.25)).unwrap();

        assert_eq!(writer.completed_count(), 1);
        assert_eq!(writer.lookup(&key), Some(measured(12.5, 0.25)));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(CSV_HEADER));
        assert!(content.contains("4096,1,simple,12.5,0.25"));
    }

    #[test]
    fn test_resume_from_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.csv");

        {
            let mut writer = IncrementalCsvWriter::new(&path, false, &fingerprint()).unwrap();
            writer
                .write_point(&ConfigKey::new(512, 1, "simple"), &measured(4.0, 1.0))
                .unwrap();
            writer
                .write_point(&ConfigKey::new(512, 2, "simple"), &Aggregate::unmeasured())
                .unwrap();
            writer
                .write_point(&ConfigKey::new(512, 1, "tasks"), &measured(0.1, 0.0))
                .unwrap();
        }

        let mut writer = IncrementalCsvWriter::new(&path, true, &fingerprint()).unwrap();
        assert_eq!(writer.resumed_count, 3);

        assert_eq!(
            writer.lookup(&ConfigKey::new(512, 1, "simple")),
            Some(measured(4.0, 1.0))
        );
        assert_eq!(
            writer.lookup(&ConfigKey::new(512, 2, "simple")),
            Some(Aggregate::unmeasured())
        );
        assert_eq!(writer.lookup(&ConfigKey::new(512, 2, "tasks")), None);

        writer
            .write_point(&ConfigKey::new(512, 2, "tasks"), &measured(0.06, 0.0))
            .unwrap();
        assert_eq!(writer.completed_count(), 4);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Matrix Size").count(), 1);
    }

    #[test]
    fn test_resume_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.csv");

        let writer = IncrementalCsvWriter::new(&path, true, &fingerprint()).unwrap();
        assert_eq!(writer.resumed_count, 0);
        assert!(path.exists());
    }

    #[test]
    fn test_malformed_line_handling() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("malformed.csv");

        std::fs::write(
            &path,
            "Matrix Size,Threads Count,Calculation Type,Average Result,Variance\n\
             4096,1,simple,10.0,0.5\n\
             malformed line\n\
             4096,2,simple,5.0,\n\
             4096,3,simple,,\n\
             \n\
             4096,4\n",
        )
        .unwrap();
        std::fs::write(
            CheckpointFingerprint::path_for(&path),
            serde_json::to_string(&fingerprint()).unwrap(),
        )
        .unwrap();

        let writer = IncrementalCsvWriter::new(&path, true, &fingerprint()).unwrap();
        assert_eq!(writer.resumed_count, 2);
        assert!(writer.lookup(&ConfigKey::new(4096, 2, "simple")).is_none());
        assert_eq!(
            writer.lookup(&ConfigKey::new(4096, 3, "simple")),
            Some(Aggregate::unmeasured())
        );
    }

    #[test]
    fn test_parse_csv_row() {
        let (key, agg) = parse_csv_row("1024,8,sections,0.031,0.0004").unwrap();
        assert_eq!(key, ConfigKey::new(1024, 8, "sections"));
        assert_eq!(agg.mean(), Some(0.031));
        assert_eq!(agg.variance(), Some(0.0004));

        assert!(parse_csv_row("1024,8,,1.0,0.0").is_none());
        assert!(parse_csv_row("x,8,simple,1.0,0.0").is_none());
        assert!(parse_csv_row("1024,8,simple,abc,0.0").is_none());
    }

    #[test]
    fn test_fingerprint_written_next_to_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.csv");

        IncrementalCsvWriter::new(&path, false, &fingerprint()).unwrap();

        let stored = std::fs::read_to_string(temp_dir.path().join("checkpoint.json")).unwrap();
        let parsed: CheckpointFingerprint = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed, fingerprint());
    }

    #[test]
    fn test_resume_refuses_different_settings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.csv");
        {
            let mut writer = IncrementalCsvWriter::new(&path, false, &fingerprint()).unwrap();
            writer
                .write_point(&ConfigKey::new(512, 1, "simple"), &measured(4.0, 1.0))
                .unwrap();
        }

        let changed = [
            CheckpointFingerprint::new("./hpc_task2", 3, false),
            CheckpointFingerprint::new("./hpc_task1", 5, false),
            CheckpointFingerprint::new("./hpc_task1", 3, true),
        ];
        for other in &changed {
            match IncrementalCsvWriter::new(&path, true, other) {
                Err(OutputError::CheckpointMismatch { expected, found, .. }) => {
                    assert_eq!(expected, other.to_string());
                    assert_eq!(found, fingerprint().to_string());
                }
                Err(e) => panic!("unexpected error {}", e),
                Ok(_) => panic!("resumed with {}", other),
            }
        }

        // The refused resumes left the rows alone
        let writer = IncrementalCsvWriter::new(&path, true, &fingerprint()).unwrap();
        assert_eq!(writer.resumed_count, 1);
    }

    #[test]
    fn test_resume_refuses_checkpoint_without_fingerprint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.csv");
        std::fs::write(&path, format!("{}\n512,1,simple,4,1\n", CSV_HEADER)).unwrap();

        let err = IncrementalCsvWriter::new(&path, true, &fingerprint())
            .err()
            .expect("resume without fingerprint");
        assert!(err.to_string().contains("no fingerprint"), "{}", err);
    }

    #[test]
    fn test_fresh_start_replaces_old_fingerprint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint.csv");
        IncrementalCsvWriter::new(&path, false, &fingerprint()).unwrap();

        let other = CheckpointFingerprint::new("./hpc_task1", 10, false);
        IncrementalCsvWriter::new(&path, false, &other).unwrap();

        assert!(IncrementalCsvWriter::new(&path, true, &other).is_ok());
        assert!(IncrementalCsvWriter::new(&path, true, &fingerprint()).is_err());
    }
}
