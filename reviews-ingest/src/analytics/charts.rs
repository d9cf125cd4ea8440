//! SVG chart rendering for the analytics report

use super::{MonthlyCount, RatingBucket, Report};
use plotters::prelude::*;
use reviews_common::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const RATING_CHART_FILE: &str = "rating_distribution.svg";
pub const MONTHLY_CHART_FILE: &str = "reviews_over_time.svg";

const SKY_BLUE: RGBColor = RGBColor(135, 206, 235);
const ORANGE: RGBColor = RGBColor(255, 165, 0);

fn chart_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Internal(format!("chart rendering failed: {}", e))
}

/// Bar chart of review counts per rating
///
/// Returns `false` (and writes nothing) when there is no data.
pub fn render_rating_distribution(buckets: &[RatingBucket], path: &Path) -> Result<bool> {
    if buckets.is_empty() {
        warn!("No ratings to plot, skipping {}", path.display());
        return Ok(false);
    }

    let min_rating = buckets.iter().map(|b| b.rating).fold(f64::INFINITY, f64::min).min(1.0);
    let max_rating = buckets.iter().map(|b| b.rating).fold(f64::NEG_INFINITY, f64::max).max(5.0);
    let max_count = buckets.iter().map(|b| b.count).max().unwrap_or(0);

    let root = SVGBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Rating Distribution", ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((min_rating - 0.5)..(max_rating + 0.5), 0u64..(max_count + max_count / 10 + 1))
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Rating")
        .y_desc("Number of Reviews")
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(buckets.iter().map(|b| {
            Rectangle::new([(b.rating - 0.4, 0), (b.rating + 0.4, b.count)], SKY_BLUE.filled())
        }))
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    info!("Rating chart saved to {}", path.display());
    Ok(true)
}

/// Line chart of monthly review counts, one marker per month
///
/// Returns `false` (and writes nothing) when there is no data.
pub fn render_reviews_over_time(monthly: &[MonthlyCount], path: &Path) -> Result<bool> {
    if monthly.is_empty() {
        warn!("No monthly counts to plot, skipping {}", path.display());
        return Ok(false);
    }

    let max_reviews = monthly.iter().map(|m| m.reviews).max().unwrap_or(0);
    let points: Vec<(i32, u64)> = monthly
        .iter()
        .enumerate()
        .map(|(idx, m)| (idx as i32, m.reviews))
        .collect();
    let month_label = |idx: &i32| -> String {
        usize::try_from(*idx)
            .ok()
            .and_then(|i| monthly.get(i))
            .map(|m| m.month.chars().take(7).collect())
            .unwrap_or_default()
    };

    let root = SVGBackend::new(path, (1000, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Reviews Over Time", ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(-1i32..(monthly.len() as i32), 0u64..(max_reviews + max_reviews / 10 + 1))
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_labels(monthly.len().min(24))
        .x_label_formatter(&month_label)
        .x_desc("Month")
        .y_desc("Number of Reviews")
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(LineSeries::new(points.iter().copied(), ORANGE.stroke_width(2)))
        .map_err(chart_err)?;
    chart
        .draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 4, ORANGE.filled())))
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    info!("Monthly chart saved to {}", path.display());
    Ok(true)
}

/// Render both charts into `dir`, creating it if needed
///
/// Returns the paths of the files written.
pub fn render_report(report: &Report, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    let rating_path = dir.join(RATING_CHART_FILE);
    if render_rating_distribution(&report.ratings, &rating_path)? {
        written.push(rating_path);
    }
    let monthly_path = dir.join(MONTHLY_CHART_FILE);
    if render_reviews_over_time(&report.monthly, &monthly_path)? {
        written.push(monthly_path);
    }
    Ok(written)
}
