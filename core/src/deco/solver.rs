//! Ceiling, NDL and TTS along a dense series.
//!
//! Bühlmann needs a single walk of the profile. VPM-B gradients depend on
//! the total decompression time, which is only known after a walk, so the
//! walk is repeated until that estimate settles or the iteration cap hits.

use super::gate::{ExclusiveAccess, SharedDecoModel};
use super::{DecoState, STOP_STEP_MM};
use crate::context::AnalysisContext;
use crate::gas::GasMix;
use crate::models::DiveMode;
use crate::prefs::DecoModel;
use crate::series::{DecoStatus, DecoSummary, DenseEntry, DenseSeries};
use crate::units::{interpolate, round_up, SurfaceConditions};

/// Longest NDL or TTS worth computing (seconds).
pub const MAX_DECO_TIME_SEC: i32 = 7_200;

/// Tissues are advanced in steps of at most this many seconds.
const TIME_STEP_SEC: i32 = 20;

/// NDL/TTS forecasts are recomputed at most this often (seconds).
const NDL_TTS_INTERVAL_SEC: i32 = 30;

/// Below this depth nobody accrues deco; NDL is reported as the maximum.
const NDL_FLOOR_MM: i32 = 3_000;

/// Surface interval added to the VPM-B deco time on the first walk.
const INITIAL_DECO_TIME_PAD_SEC: i32 = 1_800;

// ============================================================================
// Convergence
// ============================================================================

/// Bookkeeping for the repeated VPM-B profile walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceLoop {
    previous: i32,
    iterations: u32,
}

impl ConvergenceLoop {
    pub const MAX_ITERATIONS: u32 = 10;
    /// Estimates closer than this (seconds) count as converged.
    pub const TOLERANCE_SEC: i32 = 30;

    pub fn new() -> Self {
        ConvergenceLoop {
            previous: 10_000_000,
            iterations: 0,
        }
    }

    pub fn converged(&self, current: i32) -> bool {
        (self.previous - current).abs() < Self::TOLERANCE_SEC
    }

    pub fn keep_going(&self, current: i32) -> bool {
        !self.converged(current) && self.iterations < Self::MAX_ITERATIONS
    }

    /// Note the end of a walk that started from `previous`.
    pub fn record(&mut self, previous: i32) {
        self.previous = previous;
        self.iterations += 1;
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for ConvergenceLoop {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// NDL / TTS
// ============================================================================

/// Ceiling (mm, not rounded to stops) of the current tissues at `depth_mm`.
fn ceiling_at(ds: &mut DecoState, surface: &SurfaceConditions, depth_mm: i32) -> i32 {
    let tolerance = ds.tolerance(surface.depth_to_bar(depth_mm));
    ds.allowed_depth(tolerance, surface, true)
}

/// Forecast NDL, or stop depth, stop time and TTS, from `entry` onward.
///
/// Mutates `ds`: callers checkpoint before and restore after.
pub fn calculate_ndl_tts(
    ds: &mut DecoState,
    ctx: &AnalysisContext,
    entry: &mut DenseEntry,
    mix: &GasMix,
    mode: DiveMode,
) {
    let surface = &ctx.surface;
    let prefs = ctx.prefs;
    let po2 = entry.o2_pressure_mbar;
    let bar = |depth_mm: i32| surface.depth_to_bar(depth_mm);

    entry.calc = DecoStatus::default();
    let mut next_stop = round_up(ceiling_at(ds, surface, entry.depth_mm), STOP_STEP_MM);

    if next_stop == 0 {
        if entry.depth_mm < NDL_FLOOR_MM {
            entry.calc.ndl_sec = Some(MAX_DECO_TIME_SEC);
            return;
        }
        let mut ndl = 0;
        while ndl < MAX_DECO_TIME_SEC && ceiling_at(ds, surface, entry.depth_mm) <= 0 {
            ndl += 60;
            ds.add_segment(bar(entry.depth_mm), mix, 60, po2, mode, prefs);
        }
        entry.calc.ndl_sec = Some(ndl);
        return;
    }

    entry.calc.in_deco = true;
    let avg_depth = entry.mean_depth_mm();
    let mut ascent_depth = entry.depth_mm;
    let mut tts = 0;

    // Ascend to the first stop, offgassing on the way.
    while ascent_depth > next_stop {
        ds.add_segment(bar(ascent_depth), mix, 1, po2, mode, prefs);
        next_stop = round_up(ceiling_at(ds, surface, ascent_depth), STOP_STEP_MM);
        ascent_depth -= prefs.ascent.velocity(ascent_depth, avg_depth);
        tts += 1;
    }
    ascent_depth = next_stop;
    entry.calc.stopdepth_mm = next_stop;
    next_stop -= STOP_STEP_MM;

    while next_stop >= 0 {
        if ascent_depth == entry.calc.stopdepth_mm {
            entry.calc.stoptime_sec += 60;
        }
        tts += 60;
        if tts > MAX_DECO_TIME_SEC {
            break;
        }
        ds.add_segment(bar(ascent_depth), mix, 60, po2, mode, prefs);

        if ceiling_at(ds, surface, ascent_depth) <= next_stop {
            while ascent_depth > next_stop {
                ds.add_segment(bar(ascent_depth), mix, 1, po2, mode, prefs);
                ascent_depth -= prefs.ascent.velocity(ascent_depth, avg_depth);
                tts += 1;
            }
            ascent_depth = next_stop;
            next_stop -= STOP_STEP_MM;
        }
    }
    entry.calc.tts_sec = tts;
}

// ============================================================================
// Profile Walk
// ============================================================================

/// Per-walk bookkeeping, reset at the start of every iteration.
#[derive(Debug, Default)]
struct Walk {
    last_ndl_tts_calc_sec: i32,
    first_ceiling_mm: i32,
    last_ceiling_mm: i32,
    final_tts_sec: i32,
    time_clear_ceiling_sec: i32,
}

/// Fill ceilings, tissue data and the recalculated deco status on every
/// entry of `series`, holding `gate` for the duration.
pub fn calculate_deco_information(
    ctx: &AnalysisContext,
    series: &mut DenseSeries,
    gate: &dyn SharedDecoModel,
) -> DecoSummary {
    walk_until_settled(ctx, series, gate, |_, estimate| estimate)
}

/// The profile walk loop. `settle` receives the walk number (from 0) and
/// that walk's VPM-B deco time estimate, and returns the estimate to carry
/// into the next walk.
fn walk_until_settled(
    ctx: &AnalysisContext,
    series: &mut DenseSeries,
    gate: &dyn SharedDecoModel,
    mut settle: impl FnMut(u32, i32) -> i32,
) -> DecoSummary {
    let _access = ExclusiveAccess::new(gate);

    let prefs = ctx.prefs;
    let surface = &ctx.surface;
    let smooth = !prefs.deco.calc_ceiling_3m;
    let max_time = series.limits.max_time_sec;
    let Some(last_index) = series.entries.len().checked_sub(1) else {
        return DecoSummary::default();
    };
    let last_time = series.entries[last_index].time_sec;

    let mut ds = DecoState::new(&prefs.deco, surface);
    let vpmb = ds.model() == DecoModel::Vpmb;
    let initial = ds.checkpoint();
    let mut convergence = ConvergenceLoop::new();
    let mut first_iteration = true;
    let mut time_deep_ceiling = 0;

    while convergence.keep_going(ds.deco_time_sec) {
        let mut walk = Walk::default();
        if vpmb {
            ds.first_ceiling_pressure_mbar = surface.depth_to_mbar(0);
        }
        let mut gases = ctx.gas_tracker();
        let mut modes = ctx.mode_tracker();

        for i in 1..series.entries.len() {
            let (before, rest) = series.entries.split_at_mut(i);
            let prev = &before[i - 1];
            let entry = &mut rest[0];

            let mode = modes.at(entry.time_sec);
            let mix = gases.at(entry.time_sec);
            entry.ambient_bar = surface.depth_to_bar(entry.depth_mm);

            let (mut t0, mut t1) = (prev.time_sec, entry.time_sec);
            if t0 > t1 {
                log::warn!("non-monotonic sample times {t0}s > {t1}s at entry {i}");
                std::mem::swap(&mut t0, &mut t1);
            }
            let mut step = TIME_STEP_SEC;
            if t0 != t1 && t1 - t0 < step {
                step = t1 - t0;
            }
            let mut j = t0 + step;
            while j <= t1 {
                let depth = interpolate(prev.depth_mm, entry.depth_mm, j - t0, t1 - t0);
                ds.add_segment(
                    surface.depth_to_bar(depth),
                    &mix,
                    step,
                    entry.o2_pressure_mbar,
                    mode,
                    prefs,
                );
                entry.icd_warning = ds.icd_warning;
                if t1 - j < step && j < t1 {
                    step = t1 - j;
                }
                j += step;
            }

            if t0 == t1 {
                entry.ceiling_mm = prev.ceiling_mm;
            } else {
                if vpmb && walk.last_ceiling_mm >= walk.first_ceiling_mm && first_iteration {
                    ds.vpmb.nuclear_regeneration(t1);
                    ds.vpmb.start_gradient();
                }
                let tolerance = ds.tolerance(entry.ambient_bar);
                entry.ceiling_mm = ds.allowed_depth(tolerance, surface, smooth);
                let current_ceiling = if smooth {
                    entry.ceiling_mm
                } else {
                    ds.allowed_depth(tolerance, surface, true)
                };
                walk.last_ceiling_mm = current_ceiling;

                if vpmb {
                    if current_ceiling >= walk.first_ceiling_mm
                        || (time_deep_ceiling == t0 && entry.depth_mm == prev.depth_mm)
                    {
                        time_deep_ceiling = t1;
                        walk.first_ceiling_mm = current_ceiling;
                        ds.first_ceiling_pressure_mbar = surface.depth_to_mbar(current_ceiling);
                        if first_iteration {
                            ds.vpmb.nuclear_regeneration(t1);
                            ds.vpmb.start_gradient();
                            ds.relax_gradients(max_time - t1 + INITIAL_DECO_TIME_PAD_SEC);
                        }
                    }
                    if current_ceiling > 0 {
                        walk.time_clear_ceiling_sec = 0;
                    } else if walk.time_clear_ceiling_sec == 0 && t1 > time_deep_ceiling {
                        walk.time_clear_ceiling_sec = t1;
                    }
                }
            }

            entry.ceilings_mm = ds.tissue_ceilings(surface);
            entry.percentages = ds.tissue_percentages(entry.ambient_bar);
            entry.surface_gf = ds.surface_gf();

            let is_last = i == last_index;
            let wants_forecast =
                (prefs.wants_ndl_tts() && (!vpmb || !first_iteration)) || (vpmb && is_last);
            if !wants_forecast {
                continue;
            }
            if entry.time_sec - walk.last_ndl_tts_calc_sec < NDL_TTS_INTERVAL_SEC && !is_last {
                entry.calc = prev.calc;
                continue;
            }
            walk.last_ndl_tts_calc_sec = entry.time_sec;

            let checkpoint = ds.checkpoint();
            calculate_ndl_tts(&mut ds, ctx, entry, &mix, mode);
            if vpmb && is_last {
                walk.final_tts_sec = entry.calc.tts_sec;
            }
            ds.restore(&checkpoint);
        }

        let previous = ds.deco_time_sec;
        if vpmb {
            let walked = if walk.final_tts_sec > 0 {
                last_time - time_deep_ceiling + walk.final_tts_sec
            } else if walk.time_clear_ceiling_sec > 0 {
                round_up(walk.time_clear_ceiling_sec - time_deep_ceiling + 20, 60) + 20
            } else {
                previous
            };
            let estimate = settle(convergence.iterations(), walked);
            ds.relax_gradients(estimate);
            first_iteration = false;
            ds.restore_keeping_gradients(&initial);
            ds.deco_time_sec = estimate;
            log::debug!(
                "VPM-B walk {}: deco time {}s (was {}s)",
                convergence.iterations() + 1,
                estimate,
                previous
            );
        }
        convergence.record(previous);
    }

    let converged = convergence.converged(ds.deco_time_sec);
    if !converged {
        log::warn!(
            "VPM-B deco time did not settle after {} walks, last estimate {}s",
            convergence.iterations(),
            ds.deco_time_sec
        );
    }
    DecoSummary {
        iterations: convergence.iterations(),
        deco_time_sec: ds.deco_time_sec,
        converged,
    }
}
