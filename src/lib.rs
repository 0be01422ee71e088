//! # scaling-sweep
//!
//! Measure how an external parallel benchmark scales with thread count.
//!
//! The sweep walks a grid of matrix size x thread count x calculation mode,
//! invokes the benchmark binary a fixed number of times per point, and
//! reduces the parsed timings to:
//! - Mean and population variance per point
//! - Speedup relative to the smallest thread count
//! - CSV, markdown and SVG reports
//!
//! The binary is called as
//! `<binary> <matrix_size> <thread_count> <calculation_mode> <print_mode>`
//! and must print a single floating-point number on stdout. Invocations
//! that crash, time out or print anything else are discarded; a point whose
//! every invocation was discarded stays in the table as unmeasured.
//!
//! ## Quick Start
//!
//! ```ignore
//! use scaling_sweep::{BinaryRunner, SweepConfig, SweepRunner};
//!
//! let config = SweepConfig::quick().with_binary("./hpc_task1");
//! config.validate()?;
//!
//! let runner = SweepRunner::new(Box::new(BinaryRunner::from_config(&config)));
//! let results = runner.run(&config, |_| {});
//!
//! for (key, speedup) in scaling_sweep::metrics::speedups(&results.table, results.baseline_threads()) {
//!     println!("{}: {:.2}x", key, speedup);
//! }
//! ```

#![warn(clippy::all)]

// Core modules
mod types;

// Functional modules
pub mod aggregate;
pub mod checkpoint;
pub mod config;
pub mod metrics;
pub mod output;
pub mod plot;
pub mod runner;
pub mod statistics;
pub mod sweep;

// Re-exports for public API
pub use aggregate::{aggregate_point, PointOutcome};
pub use checkpoint::{CheckpointFingerprint, IncrementalCsvWriter};
pub use config::{ConfigError, SizeRange, SweepConfig, SweepPreset, ThreadRange};
pub use output::OutputError;
pub use plot::PlotError;
pub use runner::{BinaryRunner, DiscardReason, FnSource, SampleOutcome, SampleSource};
pub use statistics::SampleStats;
pub use sweep::{ResultsTable, SweepProgress, SweepResults, SweepRunner};
pub use types::{Aggregate, ConfigKey};
