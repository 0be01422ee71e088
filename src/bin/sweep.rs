//! CLI for running a thread-scaling sweep against a benchmark binary.
//!
//! # Usage
//!
//! ```bash
//! # Reference sweep: 4096x4096, 1..=18 threads, simple mode, 3 runs
//! cargo run --release --bin sweep -- --binary ./hpc_task1
//!
//! # Every calculation mode, plus the huge size tail
//! cargo run --release --bin sweep -- --preset all-modes --huge-sizes 8192:16384:4096
//!
//! # Custom grid
//! cargo run --release --bin sweep -- \
//!   --sizes 512:2048:512 \
//!   --threads 1:12 \
//!   --modes simple,tasks \
//!   --runs 5 \
//!   --timeout 120
//!
//! # Continue an interrupted sweep
//! cargo run --release --bin sweep -- --preset all-modes --resume
//! ```
//!
//! Outputs land under `--output` (default `.`):
//! - `results/data-<timestamp>.csv`: one row per grid point
//! - `results/speedup.csv` and `results/report.md`
//! - `results/checkpoint.csv`: rows written as the sweep goes, with the
//!   binary, runs and print mode that produced them in `checkpoint.json`
//! - `imgs/calculation_type_<mode>.svg`: one chart per mode

use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use scaling_sweep::output::{
    ensure_dir, format_summary, timestamped_csv_path, write_csv, write_markdown,
    write_speedup_csv,
};
use scaling_sweep::{
    plot, BinaryRunner, CheckpointFingerprint, IncrementalCsvWriter, SizeRange, SweepConfig,
    SweepPreset, SweepRunner, ThreadRange,
};

/// Thread-scaling sweep over matrix size, thread count and calculation mode
#[derive(Parser, Debug)]
#[command(name = "sweep")]
#[command(about = "Run a benchmark binary over a size x threads x mode grid and report speedup")]
#[command(version)]
struct Args {
    /// Preset configuration: reference, all-modes, quick
    #[arg(short, long, default_value = "reference")]
    preset: SweepPreset,

    /// Load the configuration from a JSON file (flags below still override it)
    #[arg(short, long, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Benchmark binary, called as `<binary> <size> <threads> <mode> <print_mode>`
    #[arg(short, long)]
    binary: Option<PathBuf>,

    /// Matrix sizes as start:stop:step (stop inclusive)
    #[arg(long)]
    sizes: Option<SizeRange>,

    /// Extra matrix sizes appended after the default range
    #[arg(long)]
    huge_sizes: Option<SizeRange>,

    /// Thread counts as start:stop (stop inclusive); start is the speedup baseline
    #[arg(short, long)]
    threads: Option<ThreadRange>,

    /// Calculation modes (comma-separated, e.g. "simple,tasks,sections")
    #[arg(short, long, value_delimiter = ',')]
    modes: Option<Vec<String>>,

    /// Invocations per grid point
    #[arg(short, long)]
    runs: Option<usize>,

    /// Physical CPU count of the benchmark host (chart guides only)
    #[arg(long)]
    cpu_count: Option<u32>,

    /// Pass `true` as the binary's print-mode argument
    #[arg(long)]
    print_mode: bool,

    /// Kill an invocation after this many seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Output directory for results and charts
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Skip writing CSV and markdown files
    #[arg(long)]
    no_csv: bool,

    /// Skip rendering charts
    #[arg(long)]
    no_plots: bool,

    /// Do not write a checkpoint while sweeping
    #[arg(long, conflicts_with = "resume")]
    no_checkpoint: bool,

    /// Resume from an existing checkpoint, skipping points already measured
    #[arg(long)]
    resume: bool,

    /// Log each grid point (-v) or each invocation (-vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    init_tracing(&args);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    if config.binary.components().count() > 1 && !config.binary.exists() {
        tracing::warn!(
            "benchmark binary {} does not exist; every sample will be discarded",
            config.binary.display()
        );
    }

    let results_dir = args.output.join("results");
    let imgs_dir = args.output.join("imgs");
    if let Err(e) = ensure_dir(&results_dir) {
        eprintln!("Failed to create output directory: {}", e);
        process::exit(1);
    }

    let mut checkpoint = if args.no_checkpoint {
        None
    } else {
        let path = results_dir.join("checkpoint.csv");
        let fingerprint = CheckpointFingerprint::for_binary(&config);
        match IncrementalCsvWriter::new(&path, args.resume, &fingerprint) {
            Ok(writer) => Some(writer),
            Err(e) => {
                eprintln!("Failed to open checkpoint: {}", e);
                process::exit(1);
            }
        }
    };

    // Print configuration
    println!("=== Scaling Sweep ===\n");
    println!("Configuration:");
    println!("  Preset: {}", config.preset.name());
    println!("  Binary: {}", config.binary.display());
    println!("  Calculation modes: {:?}", config.modes);
    println!("  Matrix sizes: {:?}", config.matrix_sizes());
    println!(
        "  Threads: {}..={} (baseline {})",
        config.threads.start,
        config.threads.stop,
        config.baseline_threads()
    );
    println!("  Runs per point: {}", config.repetitions);
    println!("  CPU count: {}", config.cpu_count);
    match config.timeout() {
        Some(t) => println!("  Timeout: {:.1}s", t.as_secs_f64()),
        None => println!("  Timeout: none"),
    }
    println!("  Total points: {}", config.total_points());
    println!("  Total invocations: {}", config.total_invocations());
    if let Some(cp) = &checkpoint {
        println!("  Checkpoint: {}", cp.path().display());
        if cp.resumed_count > 0 {
            println!(
                "  Resuming: {} of {} points already on disk",
                cp.completed_count(),
                config.total_points()
            );
        }
    }
    println!();

    let runner = SweepRunner::new(Box::new(BinaryRunner::from_config(&config)));

    let progress_bar = ProgressBar::new(config.total_points() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) ETA: {eta} | {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    progress_bar.enable_steady_tick(Duration::from_millis(100));

    let results = runner.run_with_checkpoint(&config, checkpoint.as_mut(), |progress| {
        progress_bar.set_position(progress.completed as u64);
        progress_bar.set_message(progress.key.to_string());
    });

    progress_bar.finish_with_message("Complete!");
    println!("\nCompleted in {:.1}s\n", results.total_time.as_secs_f64());

    let mut failed = false;

    if !args.no_csv {
        let csv_path = timestamped_csv_path(&results_dir);
        match write_csv(&results, &csv_path) {
            Ok(()) => println!("Wrote results to: {}", csv_path.display()),
            Err(e) => {
                eprintln!("Failed to write CSV: {}", e);
                failed = true;
            }
        }

        let speedup_path = results_dir.join("speedup.csv");
        match write_speedup_csv(&results, &speedup_path) {
            Ok(()) => println!("Wrote speedups to: {}", speedup_path.display()),
            Err(e) => {
                eprintln!("Failed to write speedup CSV: {}", e);
                failed = true;
            }
        }

        let md_path = results_dir.join("report.md");
        match write_markdown(&results, &md_path) {
            Ok(()) => println!("Wrote report to: {}", md_path.display()),
            Err(e) => {
                eprintln!("Failed to write markdown report: {}", e);
                failed = true;
            }
        }
    }

    if !args.no_plots {
        match plot::render_charts(&results, &imgs_dir) {
            Ok(paths) => {
                for path in paths {
                    println!("Wrote chart to: {}", path.display());
                }
            }
            Err(e) => {
                eprintln!("Failed to render charts: {}", e);
                failed = true;
            }
        }
    }

    println!("\n{}", format_summary(&results));

    if failed {
        process::exit(1);
    }
}

fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &Args) -> Result<SweepConfig, scaling_sweep::ConfigError> {
    let mut config = match &args.config {
        Some(path) => SweepConfig::from_json_file(path)?,
        None => SweepConfig::from_preset(args.preset),
    };

    // Apply custom overrides
    if let Some(binary) = &args.binary {
        config = config.with_binary(binary);
    }
    if let Some(sizes) = args.sizes {
        config = config.with_matrix_sizes(sizes);
    }
    if args.huge_sizes.is_some() {
        config = config.with_huge_sizes(args.huge_sizes);
    }
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }
    if let Some(modes) = &args.modes {
        config = config.with_modes(modes.iter().map(|m| m.trim()));
    }
    if let Some(runs) = args.runs {
        config = config.with_repetitions(runs);
    }
    if let Some(cpu_count) = args.cpu_count {
        config = config.with_cpu_count(cpu_count);
    }
    if args.print_mode {
        config = config.with_print_mode(true);
    }
    if let Some(secs) = args.timeout {
        config.timeout_secs = Some(secs);
    }

    config.validate()?;
    Ok(config)
}
