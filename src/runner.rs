//! Sample sources: one invocation of the benchmark, one sample.
//!
//! The [`SampleSource`] trait is the seam between the sweep engine and the
//! thing being measured. [`BinaryRunner`] is the production implementation
//! that shells out to the external benchmark binary; [`FnSource`] wraps a
//! closure and is handy for tests and in-process benchmarks.
//!
//! # Binary contract
//!
//! ```text
//! <binary> <matrix_size> <threads_count> <calculation_type> <print_mode>
//! ```
//!
//! All arguments are passed as text and `print_mode` is `true` or `false`.
//! A successful run prints a single floating-point number on stdout.
//! Anything else is a discarded sample; discards never abort the sweep.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::SweepConfig;
use crate::types::ConfigKey;

/// Polling interval while waiting on a child with a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to keep reading a pipe after the child is gone.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Why a sample was dropped.
///
/// Every variant is treated identically by the aggregator; the distinction
/// only feeds logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// The binary could not be started (missing, not executable, ...).
    Spawn(String),
    /// The binary exited with a non-zero status or was killed by a signal.
    ExitStatus {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Trimmed stderr, truncated.
        stderr: String,
    },
    /// The invocation exceeded the configured timeout and was killed.
    TimedOut(Duration),
    /// Stdout was empty after trimming.
    EmptyOutput,
    /// Stdout was not a single number.
    Unparseable(String),
    /// Stdout parsed to NaN or an infinity.
    NonFinite(String),
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to start benchmark: {}", e),
            Self::ExitStatus { code: Some(c), stderr } if stderr.is_empty() => {
                write!(f, "benchmark exited with status {}", c)
            }
            Self::ExitStatus { code: Some(c), stderr } => {
                write!(f, "benchmark exited with status {}: {}", c, stderr)
            }
            Self::ExitStatus { code: None, .. } => write!(f, "benchmark terminated by signal"),
            Self::TimedOut(t) => write!(f, "benchmark killed after {:.1}s", t.as_secs_f64()),
            Self::EmptyOutput => write!(f, "benchmark printed nothing"),
            Self::Unparseable(s) => write!(f, "output is not a number: '{}'", s),
            Self::NonFinite(s) => write!(f, "output is not finite: '{}'", s),
        }
    }
}

/// Result of one sample attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// The invocation produced a usable number.
    Parsed(f64),
    /// The invocation produced nothing usable.
    Discarded(DiscardReason),
}

impl SampleOutcome {
    /// The parsed value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Parsed(v) => Some(*v),
            Self::Discarded(_) => None,
        }
    }
}

/// Something that can produce one sample for a grid point.
///
/// Implementations must not panic on bad input from the measured program:
/// failures are reported as [`SampleOutcome::Discarded`].
pub trait SampleSource {
    /// Name shown in logs and reports.
    fn name(&self) -> &str;

    /// Take one sample for `key`. Called once per repetition.
    fn sample(&self, key: &ConfigKey) -> SampleOutcome;
}

/// Classify the captured stdout of one invocation.
///
/// The output is trimmed and must parse as a single finite `f64`.
pub fn parse_sample(stdout: &str) -> SampleOutcome {
    let text = stdout.trim();
    if text.is_empty() {
        return SampleOutcome::Discarded(DiscardReason::EmptyOutput);
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => SampleOutcome::Parsed(v),
        Ok(_) => SampleOutcome::Discarded(DiscardReason::NonFinite(truncate(text, 80))),
        Err(_) => SampleOutcome::Discarded(DiscardReason::Unparseable(truncate(text, 80))),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// =============================================================================
// External binary
// =============================================================================

/// Runs the external benchmark binary once per sample.
#[derive(Debug, Clone)]
pub struct BinaryRunner {
    /// Path (or PATH-resolved name) of the benchmark binary.
    pub binary: PathBuf,
    /// Passed through as the fourth argument.
    pub print_mode: bool,
    /// Kill the child after this long. `None` blocks until it exits.
    pub timeout: Option<Duration>,
    name: String,
}

impl BinaryRunner {
    /// Create a runner for `binary` with print mode off and no timeout.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        let name = binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| binary.display().to_string());
        Self {
            binary,
            print_mode: false,
            timeout: None,
            name,
        }
    }

    /// Create a runner from the binary settings of a sweep configuration.
    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(&config.binary)
            .print_mode(config.print_mode)
            .timeout(config.timeout())
    }

    /// Set the print mode flag.
    pub fn print_mode(mut self, print_mode: bool) -> Self {
        self.print_mode = print_mode;
        self
    }

    /// Set the per-invocation timeout.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Positional arguments for one invocation.
    pub fn args(&self, key: &ConfigKey) -> [String; 4] {
        [
            key.matrix_size().to_string(),
            key.threads().to_string(),
            key.mode().to_string(),
            self.print_mode.to_string(),
        ]
    }

    fn command(&self, key: &ConfigKey) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args(key)).stdin(Stdio::null());
        cmd
    }
}

impl SampleSource for BinaryRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&self, key: &ConfigKey) -> SampleOutcome {
        let start = Instant::now();
        let captured = match self.timeout {
            None => run_to_completion(self.command(key)),
            Some(timeout) => run_with_timeout(self.command(key), timeout),
        };

        let outcome = match captured {
            Ok(run) if run.status.success() => parse_sample(&run.stdout),
            Ok(run) => SampleOutcome::Discarded(DiscardReason::ExitStatus {
                code: run.status.code(),
                stderr: truncate(run.stderr.trim(), 200),
            }),
            Err(reason) => SampleOutcome::Discarded(reason),
        };

        tracing::debug!(
            "{} {} -> {:?} in {:.3}s",
            self.binary.display(),
            self.args(key).join(" "),
            outcome,
            start.elapsed().as_secs_f64()
        );
        outcome
    }
}

/// Captured result of a finished child process.
struct CapturedRun {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

fn spawn_error(binary: &Path, e: std::io::Error) -> DiscardReason {
    DiscardReason::Spawn(format!("{}: {}", binary.display(), e))
}

/// Run a child to completion, capturing stdout and stderr.
fn run_to_completion(mut cmd: Command) -> Result<CapturedRun, DiscardReason> {
    let binary = PathBuf::from(cmd.get_program());
    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| spawn_error(&binary, e))?;

    Ok(CapturedRun {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a child, killing it and everything it started if it outlives `timeout`.
///
/// Stdout and stderr are drained on helper threads so a chatty child cannot
/// stall on a full pipe while we poll for its exit. On unix the child leads
/// its own process group, so a timeout also reaches the processes it forked.
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<CapturedRun, DiscardReason> {
    let binary = PathBuf::from(cmd.get_program());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(&binary, e))?;

    let stdout_reader = child.stdout.take().map(PipeReader::spawn);
    let stderr_reader = child.stderr.take().map(PipeReader::spawn);

    let status = wait_with_timeout(&mut child, timeout);

    // A descendant that escaped the group can still hold the pipes open.
    let stdout = stdout_reader
        .map(|r| r.finish(READER_GRACE))
        .unwrap_or_default();
    let stderr = stderr_reader
        .map(|r| r.finish(READER_GRACE))
        .unwrap_or_default();

    Ok(CapturedRun {
        status: status?,
        stdout,
        stderr,
    })
}

/// Background reader accumulating everything written to one pipe.
struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

impl PipeReader {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut b) => b.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            let _ = tx.send(());
        });
        Self { buf, done }
    }

    /// Wait up to `grace` for end of file, then take whatever was read.
    ///
    /// A reader still blocked after `grace` is left detached.
    fn finish(self, grace: Duration) -> String {
        let _ = self.done.recv_timeout(grace);
        self.buf
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, DiscardReason> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    kill_tree(child);
                    let _ = child.wait();
                    return Err(DiscardReason::TimedOut(timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_tree(child);
                let _ = child.wait();
                return Err(DiscardReason::Spawn(format!("wait failed: {}", e)));
            }
        }
    }
}

/// Kill the child and its process group. Must run before the child is reaped,
/// while its pid still names the group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes plain integers and touches no memory of ours.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

// =============================================================================
// Closure-backed source
// =============================================================================

/// A sample source backed by a closure returning the program's stdout.
///
/// The returned text goes through [`parse_sample`], so a closure exercises
/// the same classification as a real binary.
///
/// ```
/// use scaling_sweep::runner::{FnSource, SampleSource, SampleOutcome};
/// use scaling_sweep::ConfigKey;
///
/// let source = FnSource::new("constant", |_key: &ConfigKey| "0.5".to_string());
/// let outcome = source.sample(&ConfigKey::new(64, 1, "simple"));
/// assert_eq!(outcome, SampleOutcome::Parsed(0.5));
/// ```
pub struct FnSource<F> {
    name: String,
    f: F,
}

impl<F> FnSource<F>
where
    F: Fn(&ConfigKey) -> String,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> SampleSource for FnSource<F>
where
    F: Fn(&ConfigKey) -> String,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&self, key: &ConfigKey) -> SampleOutcome {
        parse_sample(&(self.f)(key))
    }
}
