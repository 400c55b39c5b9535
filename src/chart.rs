use std::fs;
use std::path::Path;
use std::process::Command;

use chrono::NaiveDate;
use log::{info, warn};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::{PulseError, Result};
use crate::events::{org_color, ReleaseEvent};
use crate::layout::{assign_levels, ANNOTATION_LANES, MIN_DAY_GAP};
use crate::models::{Month, MonthlyTotals};
use crate::smooth::{cap_outliers, DEFAULT_Z_THRESHOLD};

const FIGURE_WIDTH: u32 = 2000;
const FIGURE_HEIGHT: u32 = 900;
const LINE_COLOR: RGBColor = RGBColor(0x1f, 0x77, 0xb4);
const BACKGROUND: RGBColor = RGBColor(0xf8, 0xf9, 0xfa);
const GRID_LIGHT: RGBColor = RGBColor(0xe5, 0xe5, 0xe5);
const GRID_BOLD: RGBColor = RGBColor(0xcc, 0xcc, 0xcc);
const LABEL_MAX_WIDTH: usize = 14;

/// Head-room above the tallest point so marker labels have space.
const HEADROOM: f64 = 1.55;
const MARKER_BASE_FRAC: f64 = 0.30;
const LEVEL_STEP_FRAC: f64 = 0.055;

/// Release plus its render-time stagger lane; recomputed every render.
#[derive(Debug, Clone)]
pub struct ChartEvent {
    pub release: ReleaseEvent,
    pub level: usize,
}

/// Lane assignment for a chronological list of releases.
pub fn stagger(events: &[ReleaseEvent]) -> Vec<ChartEvent> {
    let dates: Vec<NaiveDate> = events.iter().map(|event| event.date).collect();
    let levels = assign_levels(&dates, ANNOTATION_LANES, MIN_DAY_GAP);
    events
        .iter()
        .zip(levels)
        .map(|(release, level)| ChartEvent {
            release: *release,
            level,
        })
        .collect()
}

/// Smooth the full loaded series, then restrict it to the requested month
/// window. Smoothing first means window-boundary points still interpolate
/// from their real neighbors.
pub fn prepare_series(
    totals: &MonthlyTotals,
    start: Option<Month>,
    end: Option<Month>,
) -> (Vec<(Month, u64)>, Vec<Month>) {
    let series: Vec<(Month, u64)> = totals.iter().map(|(month, commits)| (*month, *commits)).collect();
    let (smoothed, capped) = cap_outliers(&series, DEFAULT_Z_THRESHOLD);
    let windowed = smoothed
        .into_iter()
        .filter(|(month, _)| {
            start.map_or(true, |s| *month >= s) && end.map_or(true, |e| *month <= e)
        })
        .collect();
    (windowed, capped)
}

/// Render to `out`, or to a temp file opened with the platform viewer when
/// no output path was given.
pub fn render_or_open(
    series: &[(Month, u64)],
    events: &[ReleaseEvent],
    out: Option<&Path>,
) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            render(series, events, path)?;
            info!("chart saved to {}", path.display());
            Ok(())
        }
        None => {
            let path = std::env::temp_dir().join("commitpulse-chart.png");
            render(series, events, &path)?;
            info!("chart rendered to {}", path.display());
            open_viewer(&path)
        }
    }
}

pub fn render(series: &[(Month, u64)], events: &[ReleaseEvent], out: &Path) -> Result<()> {
    if series.is_empty() {
        return Err(PulseError::Other("no commit data to plot".to_string()));
    }
    draw(series, events, out).map_err(|err| PulseError::ChartError(err.to_string()))
}

fn draw(
    series: &[(Month, u64)],
    events: &[ReleaseEvent],
    out: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (first_month, _) = match series.first() {
        Some(entry) => *entry,
        None => return Ok(()),
    };
    let (last_month, _) = match series.last() {
        Some(entry) => *entry,
        None => return Ok(()),
    };
    let x_start = first_month.first_day();
    let x_end = last_month.succ().first_day();
    let max_commits = series.iter().map(|(_, commits)| *commits).max().unwrap_or(0);
    let y_top = (max_commits as f64 * HEADROOM).max(1.0);

    let points: Vec<(NaiveDate, f64)> = series
        .iter()
        .map(|(month, commits)| (month.first_day(), *commits as f64))
        .collect();

    let root = BitMapBackend::new(out, (FIGURE_WIDTH, FIGURE_HEIGHT)).into_drawing_area();
    root.fill(&BACKGROUND)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Global GitHub commit activity vs. major LLM releases",
            ("sans-serif", 30),
        )
        .margin(15)
        .x_label_area_size(55)
        .y_label_area_size(70)
        .build_cartesian_2d(x_start..x_end, 0f64..y_top)?;

    chart
        .configure_mesh()
        .light_line_style(&GRID_LIGHT.mix(0.5))
        .bold_line_style(&GRID_BOLD.mix(0.6))
        .x_labels(16)
        .y_labels(8)
        .x_label_formatter(&|date: &NaiveDate| date.format("%b %Y").to_string())
        .y_label_formatter(&|value: &f64| human_count(*value))
        .x_desc("Month")
        .y_desc("Total public commits (PushEvents)")
        .label_style(("sans-serif", 14))
        .draw()?;

    chart.draw_series(AreaSeries::new(
        points.iter().copied(),
        0.0,
        &LINE_COLOR.mix(0.12),
    ))?;
    chart
        .draw_series(LineSeries::new(
            points.iter().copied(),
            LINE_COLOR.stroke_width(2),
        ))?
        .label("Monthly commits")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], LINE_COLOR.stroke_width(2)));

    for event in &stagger(events) {
        let date = event.release.date;
        if date < x_start || date > x_end {
            continue;
        }
        let color = parse_color(event.release.color);
        let top_frac = (MARKER_BASE_FRAC + event.level as f64 * LEVEL_STEP_FRAC).min(0.92);
        let y_marker = y_top * top_frac;

        chart.draw_series(std::iter::once(PathElement::new(
            vec![(date, 0.0), (date, y_marker)],
            color.mix(0.55).stroke_width(1),
        )))?;
        chart.draw_series(std::iter::once(Circle::new(
            (date, y_marker),
            3,
            color.filled(),
        )))?;

        let label_style = ("sans-serif", 13)
            .into_font()
            .color(&color)
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        let lines = wrap_label(event.release.model, LABEL_MAX_WIDTH);
        let line_height = y_top * 0.018;
        for (index, line) in lines.iter().enumerate() {
            let y_text = y_marker + line_height * (lines.len() - index) as f64;
            chart.draw_series(std::iter::once(Text::new(
                line.clone(),
                (date, y_text),
                label_style.clone(),
            )))?;
        }
    }

    let mut orgs: Vec<&str> = events.iter().map(|event| event.org).collect();
    orgs.sort_unstable();
    orgs.dedup();
    for org in orgs {
        let color = parse_color(org_color(org));
        chart
            .draw_series(std::iter::once(Circle::new(
                (x_start, 0.0),
                0,
                color.mix(0.0).filled(),
            )))?
            .label(org)
            .legend(move |(x, y)| {
                Rectangle::new([(x + 2, y - 5), (x + 14, y + 5)], color.filled())
            });
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.85))
        .border_style(&GRID_BOLD)
        .label_font(("sans-serif", 15))
        .draw()?;

    let footer = format!("Source: GitHub Archive  |  {} - {}", first_month, last_month);
    let footer_style = ("sans-serif", 14)
        .into_font()
        .color(&RGBColor(0x88, 0x88, 0x88))
        .pos(Pos::new(HPos::Right, VPos::Bottom));
    root.draw(&Text::new(
        footer,
        (FIGURE_WIDTH as i32 - 12, FIGURE_HEIGHT as i32 - 8),
        footer_style,
    ))?;

    root.present()?;
    Ok(())
}

fn open_viewer(path: &Path) -> Result<()> {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let status = Command::new(opener)
        .arg(path)
        .status()
        .map_err(|err| PulseError::CommandError(format!("failed to launch {}: {}", opener, err)))?;
    if !status.success() {
        warn!(
            "{} exited with {}; the chart file is at {}",
            opener,
            status,
            path.display()
        );
    }
    Ok(())
}

fn parse_color(hex: &str) -> RGBColor {
    let hex = hex.trim_start_matches('#');
    let channel =
        |index: usize| u8::from_str_radix(hex.get(index..index + 2).unwrap_or("00"), 16).unwrap_or(0);
    RGBColor(channel(0), channel(2), channel(4))
}

fn human_count(value: f64) -> String {
    if value >= 1e9 {
        format!("{:.1}B", value / 1e9)
    } else if value >= 1e6 {
        format!("{:.0}M", value / 1e6)
    } else if value >= 1e3 {
        format!("{:.0}K", value / 1e3)
    } else {
        format!("{:.0}", value)
    }
}

fn wrap_label(text: &str, width: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
