//! Terminal summary with colors and box drawing.

use colored::Colorize;

use crate::metrics::{self, Series};
use crate::sweep::SweepResults;

/// Format a finished sweep for human-readable terminal output.
///
/// One line per (calculation mode, matrix size) series: green when every
/// thread count was measured, yellow when some were lost, red when none
/// were.
pub fn format_summary(results: &SweepResults) -> String {
    let mut output = String::new();
    let table = &results.table;
    let config = &results.config;

    let unmeasured = table.len() - table.measured_count();
    let header = if unmeasured == 0 {
        format!("{} {}", "\u{2713}".green().bold(), "SWEEP COMPLETE".green().bold())
    } else {
        format!(
            "{} {}",
            "\u{26A0}".yellow().bold(),
            format!("SWEEP COMPLETE ({} unmeasured)", unmeasured).yellow().bold()
        )
    };

    output.push_str(&format_box_top());
    output.push_str(&format_box_line(&header));
    output.push_str(&format_box_separator());

    output.push_str(&format_box_line(&format!("Source: {}", results.source)));
    output.push_str(&format_box_line(&format!(
        "Points: {} measured / {}",
        table.measured_count(),
        table.len()
    )));
    output.push_str(&format_box_line(&format!(
        "Samples: {} runs per point, {} discarded",
        config.repetitions, results.discarded_samples
    )));
    if results.resumed_points > 0 {
        output.push_str(&format_box_line(&format!(
            "Resumed: {} points from checkpoint",
            results.resumed_points
        )));
    }
    output.push_str(&format_box_line(&format!(
        "Time: {:.1}s",
        results.total_time.as_secs_f64()
    )));

    output.push_str(&format_box_separator());
    output.push_str(&format_box_line(&format!(
        "{} (baseline {} threads)",
        "Speedup:".bold(),
        results.baseline_threads()
    )));

    let expected = config.threads.len();
    for series in metrics::series(table, results.baseline_threads()) {
        output.push_str(&format_box_line(&format_series(&series, expected)));
    }

    output.push_str(&format_box_bottom());
    output
}

fn format_series(series: &Series, expected: usize) -> String {
    let label = format!("  {} @ {}", series.mode, series.matrix_size);
    let measured = series.points.len();

    let best = series
        .points
        .iter()
        .filter_map(|p| p.speedup.map(|s| (p.threads, s)))
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let detail = match best {
        Some((threads, speedup)) => format!(
            "best {:.2}x at {} threads ({}/{})",
            speedup, threads, measured, expected
        ),
        None if measured > 0 => format!("no baseline ({}/{})", measured, expected),
        None => format!("unmeasured (0/{})", expected),
    };

    let line = format!("{}: {}", label, detail);
    if measured == 0 {
        line.red().to_string()
    } else if measured < expected || best.is_none() {
        line.yellow().to_string()
    } else {
        line.green().to_string()
    }
}

// Box drawing helpers

const BOX_WIDTH: usize = 60;

fn format_box_top() -> String {
    format!("\u{250C}{}\u{2510}\n", "\u{2500}".repeat(BOX_WIDTH))
}

fn format_box_bottom() -> String {
    format!("\u{2514}{}\u{2518}\n", "\u{2500}".repeat(BOX_WIDTH))
}

fn format_box_separator() -> String {
    format!("\u{251C}{}\u{2524}\n", "\u{2500}".repeat(BOX_WIDTH))
}

fn format_box_line(content: &str) -> String {
    let visible_len = strip_ansi_codes(content).chars().count();
    let padding = (BOX_WIDTH - 2).saturating_sub(visible_len);
    format!("\u{2502} {}{} \u{2502}\n", content, " ".repeat(padding))
}

/// Strip ANSI escape codes for accurate length calculation.
fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // Skip until 'm' (end of ANSI sequence)
            while let Some(&next) = chars.peek() {
                chars.next();
                if next == 'm' {
                    break;
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
