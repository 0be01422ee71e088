//! Sweep configuration: grid dimensions, repetitions and presets.
//!
//! The configuration is fixed when a sweep starts. It can be built from a
//! preset, loaded from a JSON file, and then adjusted with the builder-style
//! setters before being handed to [`SweepRunner`](crate::sweep::SweepRunner).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConfigKey;

/// Errors raised while building or loading a [`SweepConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no calculation modes configured")]
    NoModes,

    #[error("invalid calculation mode '{0}': must be non-empty and contain no commas or whitespace")]
    InvalidMode(String),

    #[error("calculation mode '{0}' is listed more than once")]
    DuplicateMode(String),

    #[error("matrix size {0} appears in more than one size range")]
    DuplicateMatrixSize(u32),

    #[error("repetition count must be at least 1")]
    ZeroRepetitions,

    #[error("reference CPU count must be at least 1")]
    ZeroCpuCount,

    #[error("invalid range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },

    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Inclusive matrix size range `start..=stop` walked in `step` increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRange {
    pub start: u32,
    pub stop: u32,
    pub step: u32,
}

impl SizeRange {
    pub fn new(start: u32, stop: u32, step: u32) -> Self {
        Self { start, stop, step }
    }

    /// A range holding exactly one size.
    pub fn single(size: u32) -> Self {
        Self::new(size, size, 1)
    }

    /// Sizes in ascending order.
    pub fn values(&self) -> impl Iterator<Item = u32> {
        (self.start..=self.stop).step_by(self.step.max(1) as usize)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRange {
            input: format!("{}:{}:{}", self.start, self.stop, self.step),
            reason: reason.to_string(),
        };
        if self.start == 0 {
            return Err(invalid("matrix sizes must be positive"));
        }
        if self.step == 0 {
            return Err(invalid("step must be positive"));
        }
        if self.start > self.stop {
            return Err(invalid("start is greater than stop"));
        }
        Ok(())
    }
}

/// Parses `start:stop:step`, or `start:stop` with step 1, or a single size.
impl FromStr for SizeRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_u32_parts(s)?;
        let range = match parts.as_slice() {
            [size] => Self::single(*size),
            [start, stop] => Self::new(*start, *stop, 1),
            [start, stop, step] => Self::new(*start, *stop, *step),
            _ => {
                return Err(ConfigError::InvalidRange {
                    input: s.to_string(),
                    reason: "expected start:stop:step".to_string(),
                })
            }
        };
        range.validate()?;
        Ok(range)
    }
}

/// Inclusive thread count range `start..=stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRange {
    pub start: u32,
    pub stop: u32,
}

impl ThreadRange {
    pub fn new(start: u32, stop: u32) -> Self {
        Self { start, stop }
    }

    /// Thread counts in ascending order.
    pub fn values(&self) -> impl Iterator<Item = u32> {
        self.start..=self.stop
    }

    /// Number of thread counts in the range.
    pub fn len(&self) -> usize {
        if self.start > self.stop {
            0
        } else {
            (self.stop - self.start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRange {
            input: format!("{}:{}", self.start, self.stop),
            reason: reason.to_string(),
        };
        if self.start == 0 {
            return Err(invalid("thread counts must be positive"));
        }
        if self.start > self.stop {
            return Err(invalid("start is greater than stop"));
        }
        Ok(())
    }
}

/// Parses `start:stop`, or a single thread count.
impl FromStr for ThreadRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = parse_u32_parts(s)?;
        let range = match parts.as_slice() {
            [n] => Self::new(*n, *n),
            [start, stop] => Self::new(*start, *stop),
            _ => {
                return Err(ConfigError::InvalidRange {
                    input: s.to_string(),
                    reason: "expected start:stop".to_string(),
                })
            }
        };
        range.validate()?;
        Ok(range)
    }
}

fn parse_u32_parts(s: &str) -> Result<Vec<u32>, ConfigError> {
    s.split(':')
        .map(|part| {
            part.trim().parse::<u32>().map_err(|e| ConfigError::InvalidRange {
                input: s.to_string(),
                reason: format!("'{}' is not a non-negative integer ({})", part.trim(), e),
            })
        })
        .collect()
}

/// Preset levels for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepPreset {
    /// The reference lab setup: 4096x4096 matrices, 1..=18 threads, `simple` mode.
    Reference,
    /// All three calculation modes on the reference grid.
    AllModes,
    /// Small matrices and few threads for smoke testing.
    Quick,
    /// Anything assembled by hand or loaded from a file.
    Custom,
}

impl SweepPreset {
    /// Short name for this preset.
    pub fn name(&self) -> &'static str {
        match self {
            SweepPreset::Reference => "reference",
            SweepPreset::AllModes => "all-modes",
            SweepPreset::Quick => "quick",
            SweepPreset::Custom => "custom",
        }
    }
}

impl FromStr for SweepPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reference" | "default" => Ok(SweepPreset::Reference),
            "all-modes" | "all_modes" | "allmodes" | "all" => Ok(SweepPreset::AllModes),
            "quick" => Ok(SweepPreset::Quick),
            "custom" => Ok(SweepPreset::Custom),
            _ => Err(format!(
                "unknown preset '{}'. Available: reference, all-modes, quick",
                s
            )),
        }
    }
}

/// Configuration for a sweep.
///
/// Defines the grid (calculation modes x matrix sizes x thread counts), how
/// many times each point is repeated, and how the benchmark binary is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Preset this configuration started from (informational)
    pub preset: SweepPreset,
    /// Path to the benchmark binary
    pub binary: PathBuf,
    /// Matrix sizes
    pub matrix_sizes: SizeRange,
    /// Extra sizes appended after `matrix_sizes` (the "huge" tail of the sweep)
    pub huge_sizes: Option<SizeRange>,
    /// Thread counts; the smallest one is the speedup baseline
    pub threads: ThreadRange,
    /// Calculation mode tags, swept in this order
    pub modes: Vec<String>,
    /// Invocations per grid point
    pub repetitions: usize,
    /// Physical CPU count of the benchmark host, used for chart guides only
    pub cpu_count: u32,
    /// Passed through as the binary's fourth argument
    pub print_mode: bool,
    /// Kill an invocation after this many seconds. `None` waits forever.
    pub timeout_secs: Option<f64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl SweepConfig {
    /// The reference lab setup.
    ///
    /// - Matrix sizes: 4096 only (range 4096..=4096 step 64)
    /// - Threads: 1..=18 on a 6-core host
    /// - Mode: `simple`
    /// - 3 runs per point
    pub fn reference() -> Self {
        Self {
            preset: SweepPreset::Reference,
            binary: PathBuf::from("./hpc_task1"),
            matrix_sizes: SizeRange::new(4096, 4096, 64),
            huge_sizes: None,
            threads: ThreadRange::new(1, 18),
            modes: vec!["simple".to_string()],
            repetitions: 3,
            cpu_count: 6,
            print_mode: false,
            timeout_secs: None,
        }
    }

    /// Reference grid over every mode the reference binary understands.
    pub fn all_modes() -> Self {
        Self {
            preset: SweepPreset::AllModes,
            modes: vec![
                "simple".to_string(),
                "tasks".to_string(),
                "sections".to_string(),
            ],
            ..Self::reference()
        }
    }

    /// Quick smoke test: 256..=1024 step 256, 1..=4 threads, all modes.
    pub fn quick() -> Self {
        Self {
            preset: SweepPreset::Quick,
            matrix_sizes: SizeRange::new(256, 1024, 256),
            threads: ThreadRange::new(1, 4),
            cpu_count: 4,
            ..Self::all_modes()
        }
    }

    /// Build the configuration for a preset.
    pub fn from_preset(preset: SweepPreset) -> Self {
        match preset {
            SweepPreset::Reference => Self::reference(),
            SweepPreset::AllModes => Self::all_modes(),
            SweepPreset::Quick => Self::quick(),
            SweepPreset::Custom => Self {
                preset: SweepPreset::Custom,
                ..Self::reference()
            },
        }
    }

    /// Load a configuration from a JSON file and validate it.
    ///
    /// Missing fields fall back to the reference preset.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.preset = SweepPreset::Custom;
        config.validate()?;
        Ok(config)
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_matrix_sizes(mut self, sizes: SizeRange) -> Self {
        self.matrix_sizes = sizes;
        self
    }

    pub fn with_huge_sizes(mut self, sizes: Option<SizeRange>) -> Self {
        self.huge_sizes = sizes;
        self
    }

    pub fn with_threads(mut self, threads: ThreadRange) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_modes<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modes = modes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn with_cpu_count(mut self, cpu_count: u32) -> Self {
        self.cpu_count = cpu_count;
        self
    }

    pub fn with_print_mode(mut self, print_mode: bool) -> Self {
        self.print_mode = print_mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_secs = timeout.map(|t| t.as_secs_f64());
        self
    }

    /// Per-invocation timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }

    /// Check that the grid is non-empty and every point is unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modes.is_empty() {
            return Err(ConfigError::NoModes);
        }
        let mut seen_modes = HashSet::new();
        for mode in &self.modes {
            if mode.is_empty() || mode.contains(',') || mode.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidMode(mode.clone()));
            }
            if !seen_modes.insert(mode.as_str()) {
                return Err(ConfigError::DuplicateMode(mode.clone()));
            }
        }

        self.matrix_sizes.validate()?;
        if let Some(huge) = &self.huge_sizes {
            huge.validate()?;
        }
        let mut seen_sizes = HashSet::new();
        for size in self.matrix_sizes() {
            if !seen_sizes.insert(size) {
                return Err(ConfigError::DuplicateMatrixSize(size));
            }
        }

        self.threads.validate()?;
        if self.repetitions == 0 {
            return Err(ConfigError::ZeroRepetitions);
        }
        if self.cpu_count == 0 {
            return Err(ConfigError::ZeroCpuCount);
        }
        Ok(())
    }

    /// All matrix sizes in sweep order: the default range, then the huge range.
    pub fn matrix_sizes(&self) -> Vec<u32> {
        let mut sizes: Vec<u32> = self.matrix_sizes.values().collect();
        if let Some(huge) = &self.huge_sizes {
            sizes.extend(huge.values());
        }
        sizes
    }

    /// Thread count used as the speedup baseline (the minimum of the range).
    pub fn baseline_threads(&self) -> u32 {
        self.threads.start
    }

    /// Total number of grid points.
    pub fn total_points(&self) -> usize {
        self.modes.len() * self.matrix_sizes().len() * self.threads.len()
    }

    /// Total number of binary invocations a full sweep performs.
    pub fn total_invocations(&self) -> usize {
        self.total_points().saturating_mul(self.repetitions)
    }

    /// Iterate over all grid points.
    ///
    /// Order: calculation mode (outer), matrix size (middle), thread count
    /// (inner). The iterator is finite and can be recreated at will.
    pub fn iter_points(&self) -> impl Iterator<Item = ConfigKey> + '_ {
        let sizes = self.matrix_sizes();
        let threads = self.threads;
        self.modes.iter().flat_map(move |mode| {
            sizes.clone().into_iter().flat_map(move |size| {
                threads
                    .values()
                    .map(move |t| ConfigKey::new(size, t, mode.as_str()))
            })
        })
    }
}
