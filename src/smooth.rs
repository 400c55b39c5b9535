use log::warn;

use crate::models::Month;

pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;

/// Iglewicz & Hoaglin scale constant for the modified z-score.
const MODIFIED_Z_SCALE: f64 = 0.6745;

/// Replace single-month artifacts with values interpolated from their
/// unflagged neighbors, using the median/MAD-based modified z-score.
///
/// Returns the smoothed series and the flagged months. Flagged points at a
/// series boundary take the nearest available unflagged value. A series with
/// no unflagged points is returned unchanged. Callers run this over the full
/// loaded series before any display window is applied, so boundary points of
/// the window still interpolate from real neighbors.
pub fn cap_outliers(series: &[(Month, u64)], threshold: f64) -> (Vec<(Month, u64)>, Vec<Month>) {
    if series.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let values: Vec<f64> = series.iter().map(|(_, commits)| *commits as f64).collect();
    let med = median(&values);
    let deviations: Vec<f64> = values.iter().map(|value| (value - med).abs()).collect();
    let mad = median(&deviations);

    // The +1 stabilizes a zero MAD.
    let flagged: Vec<bool> = values
        .iter()
        .map(|value| (MODIFIED_Z_SCALE * (value - med) / (mad + 1.0)).abs() > threshold)
        .collect();

    if flagged.iter().all(|&is_outlier| is_outlier) {
        return (series.to_vec(), Vec::new());
    }

    let mut smoothed = series.to_vec();
    let n = series.len();
    for i in 0..n {
        if !flagged[i] {
            continue;
        }
        let prev = (0..i).rev().find(|&j| !flagged[j]);
        let next = (i + 1..n).find(|&j| !flagged[j]);
        let value = match (prev, next) {
            (Some(p), Some(q)) => {
                let fraction = (i - p) as f64 / (q - p) as f64;
                values[p] + (values[q] - values[p]) * fraction
            }
            (Some(p), None) => values[p],
            (None, Some(q)) => values[q],
            (None, None) => values[i],
        };
        smoothed[i].1 = value.round().max(0.0) as u64;
    }

    let capped: Vec<Month> = series
        .iter()
        .zip(&flagged)
        .filter_map(|((month, _), &is_outlier)| if is_outlier { Some(*month) } else { None })
        .collect();
    if !capped.is_empty() {
        let listed: Vec<String> = capped.iter().map(|month| month.to_string()).collect();
        warn!("capping {} outlier month(s): {}", capped.len(), listed.join(", "));
    }
    (smoothed, capped)
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
