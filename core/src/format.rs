//! Text summaries of a single entry and of the span between two entries.

use serde::{Deserialize, Serialize};

use crate::context::AnalysisContext;
use crate::deco::buhlmann::N2_HALF_TIMES;
use crate::deco::solver::MAX_DECO_TIME_SEC;
use crate::gas::gas_volume;
use crate::series::{DenseEntry, DenseSeries, DiveType};
use crate::units::{div_up, DisplayUnits};

/// Apparent pressure gains above this (mbar) are treated as a cylinder
/// switch, not consumption.
const PRESSURE_GAIN_TOLERANCE_MBAR: i32 = 2_000;

fn minutes(seconds: i32) -> i32 {
    div_up(seconds, 60)
}

// ============================================================================
// Point Summary
// ============================================================================

/// One line per known quantity at entry `index`, in a fixed order.
/// Quantities that are zero or unknown are left out.
pub fn point_summary(series: &DenseSeries, index: usize, ctx: &AnalysisContext) -> Vec<String> {
    let Some(entry) = series.entries.get(index) else {
        return Vec::new();
    };
    let prefs = ctx.prefs;
    let units = &prefs.units;
    let depth = |mm: i32| units.depth(mm as f64);
    let mut lines = Vec::new();

    let (d, du) = depth(entry.depth_mm);
    lines.push(format!("@: {}:{:02}", entry.time_sec / 60, entry.time_sec % 60));
    lines.push(format!("D: {d:.1}{du}"));

    for (cylinder, cyl) in ctx.dive.tracked_cylinders().iter().enumerate() {
        if let Some(mbar) = entry.pressure(cylinder).filter(|p| *p != 0) {
            let (p, pu) = units.pressure(mbar);
            lines.push(format!("P: {p}{pu} ({})", cyl.gasmix));
        }
    }
    if entry.temperature_mk != 0 {
        let (t, tu) = units.temperature(entry.temperature_mk);
        lines.push(format!("T: {t:.1}{tu}"));
    }

    // Ascent is shown as positive.
    let (mut v, vu) = units.vertical_speed(entry.speed_mm_s.abs() as f64);
    if entry.speed_mm_s > 0 {
        v = -v;
    }
    lines.push(format!("V: {v:.1}{vu}"));

    if entry.sac_ml_min != 0 && prefs.show_sac {
        let (sac, decimals, unit) = units.volume(entry.sac_ml_min);
        lines.push(format!("SAC: {sac:.decimals$}{unit}/min"));
    }
    if entry.cns != 0 {
        lines.push(format!("CNS: {}%", entry.cns));
    }
    if prefs.pp_graphs.po2 && entry.pressures.o2 > 0.0 {
        lines.push(format!("pO₂: {:.2}bar", entry.pressures.o2));
    }
    if prefs.pp_graphs.pn2 && entry.pressures.n2 > 0.0 {
        lines.push(format!("pN₂: {:.2}bar", entry.pressures.n2));
    }
    if prefs.pp_graphs.phe && entry.pressures.he > 0.0 {
        lines.push(format!("pHe: {:.2}bar", entry.pressures.he));
    }
    if prefs.show_mod && entry.mod_mm > 0 {
        let (m, mu) = depth(entry.mod_mm);
        lines.push(format!("MOD: {}{mu}", m.round() as i32));
    }
    if prefs.show_ead {
        lines.extend(narcosis_lines(entry, series.dive_type, units));
    }

    lines.extend(device_deco_lines(entry, units));
    lines.extend(calculated_deco_lines(entry, prefs.deco.calc_ndl_tts, units));

    if entry.rbt_sec != 0 {
        lines.push(format!("RBT: {}min", minutes(entry.rbt_sec)));
    }
    if prefs.deco_info {
        if entry.surface_gf > 0.0 {
            lines.push(format!("Surface GF {:.0}%", entry.surface_gf));
        }
        if entry.ceiling_mm != 0 {
            let (c, cu) = depth(entry.ceiling_mm);
            lines.push(format!("Calculated ceiling {c:.0}{cu}"));
            if prefs.calc_all_tissues {
                for (half_time, ceiling) in N2_HALF_TIMES.iter().zip(entry.ceilings_mm) {
                    if ceiling != 0 {
                        let (c, cu) = depth(ceiling);
                        lines.push(format!("Tissue {half_time:.0}min: {c:.1}{cu}"));
                    }
                }
            }
        }
    }
    if entry.icd_warning {
        lines.push("ICD in leading tissue".to_string());
    }
    if entry.heartbeat != 0 && prefs.hr_graph {
        lines.push(format!("heart rate: {}", entry.heartbeat));
    }
    if let Some(bearing) = entry.bearing.filter(|b| *b >= 0) {
        lines.push(format!("bearing: {bearing}"));
    }
    if entry.running_sum != 0 {
        let (m, mu) = depth(entry.mean_depth_mm());
        lines.push(format!("mean depth to here {m:.1}{mu}"));
    }
    lines
}

/// Summary of the first entry at or after `time_sec`, padding excluded.
pub fn summary_at_time(series: &DenseSeries, time_sec: i32, ctx: &AnalysisContext) -> Option<Vec<String>> {
    series
        .entry_at_time(time_sec)
        .map(|index| point_summary(series, index, ctx))
}

fn narcosis_lines(entry: &DenseEntry, dive_type: DiveType, units: &DisplayUnits) -> Vec<String> {
    let rounded = |mm: i32| {
        let (v, u) = units.depth(mm as f64);
        (v.round() as i32, u)
    };
    let (eadd, du) = rounded(entry.eadd_mm);
    let density = entry.density;
    match dive_type {
        DiveType::Nitrox if entry.ead_mm > 0 => {
            let (ead, _) = rounded(entry.ead_mm);
            vec![format!("EAD: {ead}{du}"), format!("EADD: {eadd}{du} / {density:.1}g/ℓ")]
        }
        DiveType::Nitrox | DiveType::Trimix if entry.end_mm > 0 => {
            let (end, _) = rounded(entry.end_mm);
            vec![format!("END: {end}{du}"), format!("EADD: {eadd}{du} / {density:.1}g/ℓ")]
        }
        DiveType::Nitrox | DiveType::Trimix | DiveType::Air if density > 0.0 => {
            vec![format!("Density: {density:.1}g/ℓ")]
        }
        _ => Vec::new(),
    }
}

fn device_deco_lines(entry: &DenseEntry, units: &DisplayUnits) -> Vec<String> {
    let status = &entry.device;
    let mut lines = Vec::new();
    if status.stopdepth_mm != 0 {
        let (d, du) = units.depth(status.stopdepth_mm as f64);
        let kind = if status.ndl_sec.is_some_and(|ndl| ndl > 0) {
            "Safety stop"
        } else {
            "Deco"
        };
        if status.stoptime_sec != 0 {
            lines.push(format!("{kind}: {}min @ {d:.0}{du}", minutes(status.stoptime_sec)));
        } else {
            lines.push(format!("{kind}: unknown time @ {d:.0}{du}"));
        }
    } else if status.in_deco {
        lines.push("In deco".to_string());
    } else if let Some(ndl) = status.ndl_sec.filter(|ndl| *ndl >= 0) {
        lines.push(format!("NDL: {}min", minutes(ndl)));
    }
    if status.tts_sec != 0 {
        lines.push(format!("TTS: {}min", minutes(status.tts_sec)));
    }
    lines
}

fn calculated_deco_lines(entry: &DenseEntry, calc_ndl_tts: bool, units: &DisplayUnits) -> Vec<String> {
    let calc = &entry.calc;
    let mut lines = Vec::new();
    if calc.stopdepth_mm != 0 && calc.stoptime_sec != 0 {
        let (d, du) = units.depth(calc.stopdepth_mm as f64);
        lines.push(format!("Deco: {}min @ {d:.0}{du} (calc)", minutes(calc.stoptime_sec)));
    } else if calc.in_deco {
        // No NDL left but no stop either: a slow ascent clears it.
        lines.push("In deco (calc)".to_string());
    } else if let Some(ndl) = calc.ndl_sec.filter(|ndl| calc_ndl_tts && *ndl != 0) {
        if ndl < MAX_DECO_TIME_SEC {
            lines.push(format!("NDL: {}min (calc)", minutes(ndl)));
        } else {
            lines.push("NDL: >2h (calc)".to_string());
        }
    }
    if calc.tts_sec != 0 {
        if calc.tts_sec < MAX_DECO_TIME_SEC {
            lines.push(format!("TTS: {}min (calc)", minutes(calc.tts_sec)));
        } else {
            lines.push("TTS: >2h (calc)".to_string());
        }
    }
    lines
}

// ============================================================================
// Comparison
// ============================================================================

/// Statistics over the span between two entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub delta_time_sec: i32,
    pub delta_depth_mm: i32,
    pub min_depth_mm: i32,
    pub max_depth_mm: i32,
    /// Time weighted.
    pub avg_depth_mm: i32,
    pub max_descent_mm_s: i32,
    /// Negative, like the entry speeds.
    pub max_ascent_mm_s: i32,
    pub avg_speed_mm_s: i32,
    /// Drop on cylinder 0, 0 when no gas was used.
    pub pressure_used_mbar: i32,
    /// Only when cylinder 0 has a known size.
    pub sac_ml_min: Option<i32>,
}

/// Compare entries `a` and `b` in either order. With `sum`, the average
/// speed adds up absolute speeds instead of cancelling ascent and descent.
///
/// `None` when an index is out of range or both lie at the same time.
pub fn compare_entries(
    series: &DenseSeries,
    a: usize,
    b: usize,
    sum: bool,
    ctx: &AnalysisContext,
) -> Option<Comparison> {
    let entries = &series.entries;
    let (ea, eb) = (entries.get(a)?, entries.get(b)?);
    let (start, stop) = match ea.time_sec.cmp(&eb.time_sec) {
        std::cmp::Ordering::Less => (a, b),
        std::cmp::Ordering::Greater => (b, a),
        std::cmp::Ordering::Equal => return None,
    };
    let span = &entries[start..=stop];
    let first = &entries[start];
    let last = &entries[stop];
    let delta_time = last.time_sec - first.time_sec;

    let mut out = Comparison {
        delta_time_sec: delta_time,
        delta_depth_mm: (first.depth_mm - last.depth_mm).abs(),
        min_depth_mm: i32::MAX,
        ..Default::default()
    };
    let mut speed_time: i64 = 0;
    let mut depth_time: i64 = 0;
    let mut last_sec = first.time_sec;
    let mut last_pressure = first.pressure(0);

    for entry in span {
        let dt = (entry.time_sec - last_sec) as i64;
        let speed = if sum { entry.speed_mm_s.abs() } else { entry.speed_mm_s };
        speed_time += speed as i64 * dt;
        depth_time += entry.depth_mm as i64 * dt;

        out.max_descent_mm_s = out.max_descent_mm_s.max(entry.speed_mm_s);
        out.max_ascent_mm_s = out.max_ascent_mm_s.min(entry.speed_mm_s);
        out.min_depth_mm = out.min_depth_mm.min(entry.depth_mm);
        out.max_depth_mm = out.max_depth_mm.max(entry.depth_mm);

        let pressure = entry.pressure(0);
        if let (Some(before), Some(now)) = (last_pressure, pressure) {
            if now < before + PRESSURE_GAIN_TOLERANCE_MBAR {
                out.pressure_used_mbar += before - now;
            }
        }
        if pressure.is_some() {
            last_pressure = pressure;
        }
        last_sec = entry.time_sec;
    }
    out.avg_depth_mm = (depth_time / delta_time as i64) as i32;
    out.avg_speed_mm_s = (speed_time / delta_time as i64) as i32;

    if out.pressure_used_mbar != 0 {
        out.sac_ml_min = span_sac(span, out.avg_depth_mm, delta_time, ctx);
    }
    Some(out)
}

/// SAC over the span from the first to the last known pressure of
/// cylinder 0, at the span's average depth.
fn span_sac(span: &[DenseEntry], avg_depth_mm: i32, delta_time_sec: i32, ctx: &AnalysisContext) -> Option<i32> {
    let cyl = ctx.dive.cylinders.first().filter(|cyl| cyl.size_ml > 0)?;
    let first = span.iter().find_map(|e| e.pressure(0).filter(|p| *p != 0))?;
    let last = span.iter().rev().find_map(|e| e.pressure(0).filter(|p| *p != 0))?;
    let volume_used = gas_volume(cyl, first) - gas_volume(cyl, last);
    let atm = ctx.surface.depth_to_atm(avg_depth_mm);
    Some((volume_used as f64 / atm * 60.0 / delta_time_sec as f64).round() as i32)
}

/// Render a comparison as two lines: depths, then speeds and gas.
pub fn format_comparison(c: &Comparison, units: &DisplayUnits) -> String {
    let depth = |mm: i32| units.depth(mm as f64);
    let speed = |mm_s: i32| units.vertical_speed(mm_s.abs() as f64);

    let (dd, du) = depth(c.delta_depth_mm);
    let (min, _) = depth(c.min_depth_mm);
    let (max, _) = depth(c.max_depth_mm);
    let (avg, _) = depth(c.avg_depth_mm);
    let mut text = format!(
        "ΔT:{}:{:02}min ΔD:{dd:.1}{du} ↓D:{min:.1}{du} ↑D:{max:.1}{du} øD:{avg:.1}{du}\n",
        c.delta_time_sec / 60,
        c.delta_time_sec % 60
    );

    let (desc, vu) = speed(c.max_descent_mm_s);
    let (asc, _) = speed(c.max_ascent_mm_s);
    let (avg_v, _) = speed(c.avg_speed_mm_s);
    text.push_str(&format!("↓V:{desc:.2}{vu} ↑V:{asc:.2}{vu} øV:{avg_v:.2}{vu}"));

    if c.pressure_used_mbar != 0 {
        let (p, pu) = units.pressure(c.pressure_used_mbar);
        text.push_str(&format!(" ΔP:{p}{pu}"));
        if let Some(sac) = c.sac_ml_min {
            let (v, decimals, vu) = units.volume(sac);
            text.push_str(&format!(" SAC:{v:.decimals$}{vu}/min"));
        }
    }
    text
}
