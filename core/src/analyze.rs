//! Depth smoothing, vertical speed classification and local extrema.

use crate::series::{DenseSeries, Velocity};

/// Half width of the local min/max window (seconds).
const MINMAX_HALF_INTERVAL_SEC: i32 = 270;

/// Intervals shorter than this are re-measured against an older entry.
const SPEED_LOOKBACK_SEC: i32 = 15;

/// Smooth depths, classify vertical speed, and find the shallowest and
/// deepest entry within ±4.5 minutes of every entry.
pub fn analyze_plot_info(series: &mut DenseSeries) {
    let entries = &mut series.entries;
    let nr = entries.len();

    for entry in entries.iter_mut() {
        entry.smoothed_mm = entry.depth_mm;
    }

    for i in 2..nr {
        if i + 2 < nr {
            let weighted = entries[i - 2].depth_mm
                + 2 * entries[i - 1].depth_mm
                + 3 * entries[i].depth_mm
                + 2 * entries[i + 1].depth_mm
                + entries[i + 2].depth_mm;
            entries[i].smoothed_mm = (weighted + 4) / 9;
        }

        let dt = entries[i].time_sec - entries[i - 1].time_sec;
        if dt == 0 {
            entries[i].speed_mm_s = 0;
            entries[i].velocity = Velocity::Stable;
            continue;
        }
        let speed = (entries[i].depth_mm - entries[i - 1].depth_mm) / dt;
        entries[i].speed_mm_s = speed;
        entries[i].velocity = Velocity::classify(speed);

        // Short intervals are noisy: look back to an entry far enough away.
        if dt < SPEED_LOOKBACK_SEC && entries[i].velocity < Velocity::Fast {
            let now = entries[i].time_sec;
            let mut past = i - 1;
            while past > 0 && now - entries[past].time_sec < SPEED_LOOKBACK_SEC {
                past -= 1;
            }
            let span = now - entries[past].time_sec;
            if span > 0 {
                let averaged = (entries[i].depth_mm - entries[past].depth_mm) / span;
                entries[i].velocity = Velocity::classify(averaged);
            }
        }
    }

    for i in 0..nr {
        let (min_idx, max_idx) = local_extrema(series, i);
        series.entries[i].min_idx = min_idx;
        series.entries[i].max_idx = max_idx;
    }
}

/// Indices of the shallowest and deepest entries whose time lies within
/// the window around entry `index`. Ties keep the earliest.
fn local_extrema(series: &DenseSeries, index: usize) -> (usize, usize) {
    let entries = &series.entries;
    let centre = entries[index].time_sec;
    let (start, end) = (centre - MINMAX_HALF_INTERVAL_SEC, centre + MINMAX_HALF_INTERVAL_SEC);

    let mut first = index;
    while first > 0 && entries[first - 1].time_sec >= start {
        first -= 1;
    }

    let (mut min, mut max) = (first, first);
    for (i, entry) in entries.iter().enumerate().skip(first) {
        if entry.time_sec > end {
            break;
        }
        if entry.depth_mm < entries[min].depth_mm {
            min = i;
        }
        if entry.depth_mm > entries[max].depth_mm {
            max = i;
        }
    }
    (min, max)
}
