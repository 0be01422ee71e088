//! Scaling charts.
//!
//! One SVG per calculation mode, `calculation_type_<mode>.svg`, with two
//! panels sharing the thread-count axis:
//! - average result per matrix size (log y axis)
//! - speedup per matrix size, with the ideal `y = x` line up to twice the
//!   CPU count
//!
//! Both panels carry dashed vertical guides at every multiple of the CPU
//! count. Unmeasured points are left out of every line.

use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use thiserror::Error;

use crate::metrics::{self, Series};
use crate::sweep::SweepResults;

const CHART_WIDTH: u32 = 1600;
const CHART_HEIGHT: u32 = 1800;
/// Results panel takes three quarters of the height, speedup the rest.
const RESULTS_PANEL_HEIGHT: u32 = CHART_HEIGHT * 3 / 4;

/// Errors raised while rendering charts.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("failed to create chart directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render {}: {message}", path.display())]
    Render { path: PathBuf, message: String },
}

/// File name of the chart for `mode`.
pub fn chart_file_name(mode: &str) -> String {
    format!("calculation_type_{}.svg", mode)
}

/// Render one chart per calculation mode into `dir`.
///
/// Modes without a single measured point are skipped. Returns the paths
/// written, in mode order.
pub fn render_charts(results: &SweepResults, dir: &Path) -> Result<Vec<PathBuf>, PlotError> {
    fs::create_dir_all(dir).map_err(|source| PlotError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for mode in &results.config.modes {
        let path = dir.join(chart_file_name(mode));
        if render_mode_chart(results, mode, &path)? {
            written.push(path);
        } else {
            tracing::warn!("no measured points for mode '{}', chart skipped", mode);
        }
    }
    Ok(written)
}

/// Render the chart for one mode to `path`.
///
/// Returns `Ok(false)` without touching the filesystem when the mode has no
/// measured points.
pub fn render_mode_chart(results: &SweepResults, mode: &str, path: &Path) -> Result<bool, PlotError> {
    let series: Vec<Series> =
        metrics::series_for_mode(&results.table, results.baseline_threads(), mode)
            .into_iter()
            .filter(|s| !s.points.is_empty())
            .collect();
    if series.is_empty() {
        return Ok(false);
    }

    let layout = ChartLayout::new(results, &series);
    draw_chart(path, mode, &layout, &series).map_err(|e| PlotError::Render {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!("wrote {}", path.display());
    Ok(true)
}

/// Axis ranges and guide positions shared by both panels.
#[derive(Debug, Clone, PartialEq)]
struct ChartLayout {
    x_min: f64,
    x_max: f64,
    result_min: f64,
    result_max: f64,
    speedup_max: f64,
    /// x positions of the CPU-count guides
    cpu_guides: Vec<f64>,
    /// End point of the ideal speedup line
    ideal_end: f64,
}

impl ChartLayout {
    fn new(results: &SweepResults, series: &[Series]) -> Self {
        let config = &results.config;
        let x_min = f64::from(config.threads.start);
        let x_max = f64::from(config.threads.stop).max(x_min + 1.0);

        let positive_means = || {
            series
                .iter()
                .flat_map(|s| s.points.iter())
                .map(|p| p.mean)
                .filter(|&m| m > 0.0)
        };
        let lo = positive_means().fold(f64::INFINITY, f64::min);
        let hi = positive_means().fold(0.0f64, f64::max);
        let (result_min, result_max) = if lo.is_finite() && hi > 0.0 {
            (lo * 0.8, hi * 1.25)
        } else {
            (0.1, 1.0)
        };

        let cpu = config.cpu_count.max(1);
        let cpu_guides: Vec<f64> = (1u32..)
            .map_while(|k| k.checked_mul(cpu))
            .take_while(|&t| t <= config.threads.stop)
            .map(f64::from)
            .collect();

        let ideal_end = (f64::from(cpu) * 2.0).min(x_max);
        let max_speedup = series
            .iter()
            .flat_map(|s| s.points.iter())
            .filter_map(|p| p.speedup)
            .fold(0.0f64, f64::max);
        let speedup_max = max_speedup.max(ideal_end).max(1.0) * 1.1;

        Self {
            x_min,
            x_max,
            result_min,
            result_max,
            speedup_max,
            cpu_guides,
            ideal_end,
        }
    }
}

fn draw_chart(
    path: &Path,
    mode: &str,
    layout: &ChartLayout,
    series: &[Series],
) -> Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::new(path, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically(RESULTS_PANEL_HEIGHT);

    let mut results_chart = ChartBuilder::on(&upper)
        .caption(format!("Calculation type: {}", mode), ("sans-serif", 28))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(
            layout.x_min..layout.x_max,
            (layout.result_min..layout.result_max).log_scale(),
        )?;

    results_chart
        .configure_mesh()
        .x_desc("Threads")
        .y_desc("Average result")
        .draw()?;

    for &x in &layout.cpu_guides {
        results_chart.draw_series(DashedLineSeries::new(
            vec![(x, layout.result_min), (x, layout.result_max)],
            10,
            6,
            RED.mix(0.7).stroke_width(1),
        ))?;
    }

    for (i, s) in series.iter().enumerate() {
        let color = Palette99::pick(i).mix(0.9);
        let points: Vec<(f64, f64)> = s
            .mean_line()
            .into_iter()
            .filter(|&(_, mean)| mean > 0.0)
            .map(|(t, mean)| (f64::from(t), mean))
            .collect();
        results_chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(format!("{}", s.matrix_size))
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 22, y)], color.stroke_width(2))
            });
    }

    results_chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    let mut speedup_chart = ChartBuilder::on(&lower)
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(layout.x_min..layout.x_max, 0.0f64..layout.speedup_max)?;

    speedup_chart
        .configure_mesh()
        .x_desc("Threads")
        .y_desc("Speedup")
        .draw()?;

    for &x in &layout.cpu_guides {
        speedup_chart.draw_series(DashedLineSeries::new(
            vec![(x, 0.0), (x, layout.speedup_max)],
            10,
            6,
            RED.mix(0.7).stroke_width(1),
        ))?;
    }

    speedup_chart
        .draw_series(DashedLineSeries::new(
            vec![(layout.x_min, layout.x_min), (layout.ideal_end, layout.ideal_end)],
            12,
            6,
            GREEN.stroke_width(2),
        ))?
        .label("Amdahl's law")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 22, y)], GREEN.stroke_width(2)));

    for (i, s) in series.iter().enumerate() {
        let color = Palette99::pick(i).mix(0.9);
        let points: Vec<(f64, f64)> = s
            .speedup_line()
            .into_iter()
            .map(|(t, speedup)| (f64::from(t), speedup))
            .collect();
        if points.is_empty() {
            continue;
        }
        speedup_chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(format!("{}", s.matrix_size))
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 22, y)], color.stroke_width(2))
            });
    }

    speedup_chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
