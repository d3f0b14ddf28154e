//! Cylinder pressure reconstruction.
//!
//! Where the log has no transmitter data, the only ground truth is the
//! start and end pressure entered for each cylinder. Those are written as
//! two anchor readings at the start and end of the cylinder's use window.
//! Anything between anchors is left to [`interpolate_pressures`].

use crate::context::AnalysisContext;
use crate::gas::event_cylinder;
use crate::models::{EVENT_GASCHANGE, MAX_CYLINDERS};
use crate::series::DenseSeries;

/// When a cylinder was breathed from, as far as gas changes tell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CylinderWindow {
    pub cylinder: usize,
    /// First switch to the cylinder, 0 if it was never switched to.
    pub first_sec: i32,
    /// Last time it was switched away from; `i32::MAX` if still in use at the end.
    pub last_sec: i32,
    /// Mentioned by a gas change on this computer.
    pub seen: bool,
    /// Whether anchors were written for it.
    pub interesting: bool,
}

/// Determine each cylinder's use window and write its start and end
/// pressure onto the series.
///
/// A cylinder never switched to on this computer is skipped when its
/// pressures are missing or equal, or when another computer switches to it
/// (that computer's profile owns it).
pub fn reconstruct_gas_pressures(ctx: &AnalysisContext, series: &mut DenseSeries) -> Vec<CylinderWindow> {
    let cylinders = ctx.dive.tracked_cylinders();
    let mut windows: Vec<CylinderWindow> = (0..cylinders.len())
        .map(|cylinder| CylinderWindow {
            cylinder,
            first_sec: 0,
            last_sec: i32::MAX,
            seen: false,
            interesting: false,
        })
        .collect();
    if windows.is_empty() {
        return windows;
    }

    let mut prev = ctx.first_cylinder.min(windows.len() - 1);
    windows[prev].seen = true;
    for ev in ctx.dc.events_named(EVENT_GASCHANGE) {
        let cylinder = event_cylinder(ctx.dive, ev);
        if cylinder >= windows.len() {
            log::warn!("gas change at {}s to untracked cylinder {}", ev.time_sec, cylinder);
            continue;
        }
        windows[prev].last_sec = ev.time_sec;
        prev = cylinder;
        let window = &mut windows[cylinder];
        window.last_sec = ev.time_sec;
        if !window.seen {
            window.first_sec = ev.time_sec;
            window.seen = true;
        }
    }
    windows[prev].last_sec = i32::MAX;

    for window in windows.iter_mut() {
        let cyl = &cylinders[window.cylinder];
        window.interesting = window.seen || {
            let known_change = matches!(
                (cyl.start_mbar, cyl.end_mbar),
                (Some(start), Some(end)) if start > 0 && end > 0 && start != end
            );
            let owned_elsewhere = ctx
                .dive
                .computers
                .iter()
                .filter(|other| !std::ptr::eq(*other, ctx.dc))
                .any(|other| other.has_gaschange_to(window.cylinder));
            known_change && !owned_elsewhere
        };
        if !window.interesting {
            continue;
        }
        if let Some(start) = cyl.start_mbar.filter(|p| *p > 0) {
            add_plot_pressure(series, window.first_sec, window.cylinder, start);
        }
        if let Some(end) = cyl.end_mbar.filter(|p| *p > 0) {
            add_plot_pressure(series, window.last_sec, window.cylinder, end);
        }
    }
    windows
}

/// Write a reading at the first entry at or after `time_sec`, or at the
/// last entry when the series ends earlier.
fn add_plot_pressure(series: &mut DenseSeries, time_sec: i32, cylinder: usize, mbar: i32) {
    let Some(last) = series.entries.len().checked_sub(1) else {
        return;
    };
    let index = series
        .entries
        .iter()
        .position(|entry| entry.time_sec >= time_sec)
        .unwrap_or(last);
    series.entries[index].sensor_pressure[cylinder] = Some(mbar);
}

/// Cylinder being breathed at each entry.
fn active_cylinders(ctx: &AnalysisContext, series: &DenseSeries) -> Vec<usize> {
    let mut changes = ctx.dc.events_named(EVENT_GASCHANGE).peekable();
    let mut current = ctx.first_cylinder;
    series
        .entries
        .iter()
        .map(|entry| {
            while let Some(ev) = changes.next_if(|ev| ev.time_sec <= entry.time_sec) {
                current = event_cylinder(ctx.dive, ev);
            }
            current
        })
        .collect()
}

/// Fill the interpolated track between known readings of each cylinder.
///
/// Gas use is taken to be proportional to ambient pressure times time while
/// the cylinder is being breathed, so the fill is linear in that
/// "pressure-time" rather than in plain time. Known readings stay untouched
/// and nothing is extrapolated past the first or last of them.
pub fn interpolate_pressures(ctx: &AnalysisContext, series: &mut DenseSeries) {
    let ncyl = ctx.dive.tracked_cylinders().len().min(MAX_CYLINDERS);
    if series.entries.len() < 2 {
        return;
    }
    let active = active_cylinders(ctx, series);

    // Pressure-time (atm·s) of the segment ending at each entry, per cylinder use.
    let segment_weight: Vec<f64> = std::iter::once(0.0)
        .chain(series.entries.windows(2).map(|pair| {
            let dt = (pair[1].time_sec - pair[0].time_sec).max(0) as f64;
            let avg_depth = (pair[0].depth_mm + pair[1].depth_mm) / 2;
            ctx.surface.depth_to_atm(avg_depth) * dt
        }))
        .collect();

    for cylinder in 0..ncyl {
        let known: Vec<(usize, i32)> = series
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.sensor_pressure[cylinder].map(|p| (i, p)))
            .collect();

        for pair in known.windows(2) {
            let ((i0, p0), (i1, p1)) = (pair[0], pair[1]);
            if i1 <= i0 + 1 {
                continue;
            }
            let used = |k: usize| active[k - 1] == cylinder;
            let total: f64 = (i0 + 1..=i1).filter(|k| used(*k)).map(|k| segment_weight[k]).sum();
            let span_sec = (series.entries[i1].time_sec - series.entries[i0].time_sec) as f64;

            let mut so_far = 0.0;
            for k in i0 + 1..i1 {
                let fraction = if total > 0.0 {
                    if used(k) {
                        so_far += segment_weight[k];
                    }
                    so_far / total
                } else if span_sec > 0.0 {
                    (series.entries[k].time_sec - series.entries[i0].time_sec) as f64 / span_sec
                } else {
                    0.0
                };
                let mbar = p0 as f64 + (p1 - p0) as f64 * fraction;
                series.entries[k].interpolated_pressure[cylinder] = Some(mbar.round() as i32);
            }
        }
    }
}
