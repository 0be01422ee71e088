//! Output formatters for sweep results.
//!
//! This module provides:
//! - CSV export of the results table (one row per grid point)
//! - CSV export of speedups
//! - Markdown report generation
//! - Terminal summary with colors and box drawing (see [`terminal`])

pub mod terminal;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::metrics;
use crate::sweep::SweepResults;
use crate::types::{Aggregate, ConfigKey};

pub use terminal::format_summary;

/// Header of the results CSV and of checkpoint files.
pub const CSV_HEADER: &str = "Matrix Size,Threads Count,Calculation Type,Average Result,Variance";

/// Header of the speedup CSV.
pub const SPEEDUP_CSV_HEADER: &str = "Matrix Size,Threads Count,Calculation Type,Speedup";

/// Errors raised while writing reports to disk.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read or write {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "checkpoint {} was written with {found}, this run uses {expected}; \
         start without --resume or point --output elsewhere",
        path.display()
    )]
    CheckpointMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

impl OutputError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        OutputError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One results row. Unmeasured points get empty mean and variance fields.
pub fn format_csv_row(key: &ConfigKey, aggregate: &Aggregate) -> String {
    format!(
        "{},{},{},{},{}",
        key.matrix_size(),
        key.threads(),
        key.mode(),
        aggregate.mean().map(|m| m.to_string()).unwrap_or_default(),
        aggregate.variance().map(|v| v.to_string()).unwrap_or_default(),
    )
}

/// File name of a results CSV stamped with `secs` since the unix epoch.
pub fn csv_file_name(secs: f64) -> String {
    format!("data-{:.6}.csv", secs)
}

/// `dir/data-<now>.csv`
pub fn timestamped_csv_path(dir: &Path) -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    dir.join(csv_file_name(secs))
}

/// Create `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), OutputError> {
    fs::create_dir_all(dir).map_err(|e| OutputError::io(dir, e))
}

/// Write the results table to CSV, in grid order.
pub fn write_csv(results: &SweepResults, path: &Path) -> Result<(), OutputError> {
    write_with(path, |writer| {
        writeln!(writer, "{}", CSV_HEADER)?;
        for (key, aggregate) in results.table.iter() {
            writeln!(writer, "{}", format_csv_row(key, aggregate))?;
        }
        Ok(())
    })
}

/// Write every defined speedup to CSV. Points without speedup are omitted.
pub fn write_speedup_csv(results: &SweepResults, path: &Path) -> Result<(), OutputError> {
    let speedups = metrics::speedups(&results.table, results.baseline_threads());
    write_with(path, |writer| {
        writeln!(writer, "{}", SPEEDUP_CSV_HEADER)?;
        for (key, speedup) in &speedups {
            writeln!(
                writer,
                "{},{},{},{}",
                key.matrix_size(),
                key.threads(),
                key.mode(),
                speedup
            )?;
        }
        Ok(())
    })
}

/// Write the markdown report to `path`.
pub fn write_markdown(results: &SweepResults, path: &Path) -> Result<(), OutputError> {
    let md = to_markdown(results);
    write_with(path, |writer| writer.write_all(md.as_bytes()))
}

fn write_with<F>(path: &Path, body: F) -> Result<(), OutputError>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = File::create(path).map_err(|e| OutputError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| OutputError::io(path, e))
}

/// Generate markdown report from results.
pub fn to_markdown(results: &SweepResults) -> String {
    let config = &results.config;
    let mut md = String::new();

    md.push_str(&format!(
        "# Scaling Sweep Results ({})\n\n",
        config.preset.name()
    ));

    md.push_str("## Configuration\n\n");
    md.push_str(&format!("- **Binary**: `{}`\n", config.binary.display()));
    md.push_str(&format!("- **Source**: {}\n", results.source));
    md.push_str(&format!("- **Calculation modes**: {}\n", config.modes.join(", ")));
    md.push_str(&format!("- **Matrix sizes**: {:?}\n", config.matrix_sizes()));
    md.push_str(&format!(
        "- **Threads**: {}..={} (baseline {})\n",
        config.threads.start,
        config.threads.stop,
        results.baseline_threads()
    ));
    md.push_str(&format!("- **Runs per point**: {}\n", config.repetitions));
    md.push_str(&format!("- **CPU count**: {}\n", config.cpu_count));
    md.push_str(&format!(
        "- **Points**: {} ({} measured, {} resumed)\n",
        results.table.len(),
        results.table.measured_count(),
        results.resumed_points
    ));
    md.push_str(&format!(
        "- **Discarded samples**: {}\n",
        results.discarded_samples
    ));
    md.push_str(&format!(
        "- **Total execution time**: {:.1}s\n\n",
        results.total_time.as_secs_f64()
    ));

    for mode in &config.modes {
        md.push_str(&format!("## Calculation type: {}\n\n", mode));
        md.push_str(&mode_table(results, mode));
        md.push('\n');
    }

    let unmeasured: Vec<&ConfigKey> = results.table.unmeasured().collect();
    if !unmeasured.is_empty() {
        md.push_str("## Unmeasured points\n\n");
        for key in unmeasured {
            md.push_str(&format!("- {}\n", key));
        }
        md.push('\n');
    }

    md
}

/// Table of every point for one mode, grid order.
fn mode_table(results: &SweepResults, mode: &str) -> String {
    let baseline = results.baseline_threads();
    let mut table = String::new();

    table.push_str("| Matrix Size | Threads | Average Result | Variance | CV | Speedup |\n");
    table.push_str("|-------------|---------|----------------|----------|----|---------|\n");

    let mut rows = 0;
    for (key, aggregate) in results.table.iter().filter(|(k, _)| k.mode() == mode) {
        let speedup = metrics::speedup(&results.table, key, baseline);
        table.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            key.matrix_size(),
            key.threads(),
            aggregate
                .mean()
                .map(|m| format!("{:.6}", m))
                .unwrap_or_else(|| "-".to_string()),
            aggregate
                .variance()
                .map(|v| format!("{:.6}", v))
                .unwrap_or_else(|| "-".to_string()),
            aggregate
                .stats()
                .and_then(|s| s.relative_std_dev())
                .map(|cv| format!("{:.1}%", cv * 100.0))
                .unwrap_or_else(|| "-".to_string()),
            speedup
                .map(|s| format!("{:.2}x", s))
                .unwrap_or_else(|| "-".to_string()),
        ));
        rows += 1;
    }

    if rows == 0 {
        return "No results\n".to_string();
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SizeRange, SweepConfig, ThreadRange};
    use crate::statistics::SampleStats;
    use std::time::Duration;

    fn mock_results() -> SweepResults {
        let config = SweepConfig::reference()
            .with_matrix_sizes(SizeRange::single(4096))
            .with_threads(ThreadRange::new(1, 3));
        let mut results = SweepResults::new(config, "mock");
        results.total_time = Duration::from_secs(10);

        let measured = |mean, variance| Aggregate::measured(SampleStats { mean, variance });
        results
            .table
            .insert(ConfigKey::new(4096, 1, "simple"), measured(12.5, 0.25));
        results
            .table
            .insert(ConfigKey::new(4096, 2, "simple"), Aggregate::unmeasured());
        results
            .table
            .insert(ConfigKey::new(4096, 3, "simple"), measured(5.0, 0.0));
        results
    }

    #[test]
    fn test_format_csv_row() {
        let key = ConfigKey::new(4096, 1, "simple");
        let row = format_csv_row(&key, &Aggregate::measured(SampleStats { mean: 12.5, variance: 0.25 }));
        assert_eq!(row, "4096,1,simple,12.5,0.25");
        assert_eq!(format_csv_row(&key, &Aggregate::unmeasured()), "4096,1,simple,,");
    }

    #[test]
    fn test_csv_output() {
        let results = mock_results();
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("test.csv");

        write_csv(&results, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                CSV_HEADER,
                "4096,1,simple,12.5,0.25",
                "4096,2,simple,,",
                "4096,3,simple,5,0",
            ]
        );
    }

    #[test]
    fn test_speedup_csv_skips_absent() {
        let results = mock_results();
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("speedup.csv");

        write_speedup_csv(&results, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![SPEEDUP_CSV_HEADER, "4096,1,simple,1", "4096,3,simple,2.5"]
        );
    }

    #[test]
    fn test_write_to_missing_dir_fails() {
        let results = mock_results();
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("test.csv");

        let err = write_csv(&results, &path).unwrap_err();
        assert!(err.to_string().contains("test.csv"));
    }

    #[test]
    fn test_csv_file_name() {
        assert_eq!(csv_file_name(1697000000.5), "data-1697000000.500000.csv");
        let path = timestamped_csv_path(Path::new("results"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("data-") && name.ends_with(".csv"));
        assert!(path.starts_with("results"));
    }

    #[test]
    fn test_markdown_output() {
        let results = mock_results();
        let md = to_markdown(&results);

        assert!(md.contains("# Scaling Sweep Results (reference)"));
        assert!(md.contains("## Calculation type: simple"));
        assert!(md.contains("| 4096 | 1 | 12.500000 | 0.250000 | 4.0% | 1.00x |"));
        assert!(md.contains("| 4096 | 2 | - | - | - | - |"));
        assert!(md.contains("| 4096 | 3 | 5.000000 | 0.000000 | 0.0% | 2.50x |"));
        assert!(md.contains("## Unmeasured points"));
        assert!(md.contains("ms: 4096, tc: 2, ct: simple"));
    }
}
