//! The whole analysis pipeline for one dive computer of a dive.

use crate::analyze::analyze_plot_info;
use crate::context::AnalysisContext;
use crate::deco::{calculate_deco_information, SharedDecoModel, PLANNER_LOCK};
use crate::densify::{check_setpoint_events, populate_plot_entries};
use crate::error::{ProfileError, ProfileResult};
use crate::limits::{calculate_max_limits, plot_depth_bound, plot_time_bound};
use crate::models::Dive;
use crate::physiology::{calculate_gas_information, classify_dive_type, fill_o2_values, max_partial_pressure};
use crate::pressure::{interpolate_pressures, reconstruct_gas_pressures};
use crate::prefs::ProfilePrefs;
use crate::sac::calculate_sac;
use crate::series::DenseSeries;

/// Build the dense, annotated series for computer `dc_index` of `dive`.
///
/// `fast` skips the cylinder pressure interpolation, which only matters for
/// drawing pressure curves. `gate` serialises access to the decompression
/// model with anything else in the process that drives it.
pub fn create_plot_info(
    dive: &Dive,
    dc_index: usize,
    prefs: &ProfilePrefs,
    fast: bool,
    gate: &dyn SharedDecoModel,
) -> ProfileResult<DenseSeries> {
    let ctx = AnalysisContext::new(dive, dc_index, prefs)?;
    plot_context(&ctx, fast, gate)
}

/// [`create_plot_info`] for a context the caller already resolved.
pub fn plot_context(ctx: &AnalysisContext, fast: bool, gate: &dyn SharedDecoModel) -> ProfileResult<DenseSeries> {
    let prefs = ctx.prefs;
    prefs.validate()?;
    if ctx.dc.samples.is_empty() {
        return Err(ProfileError::NoSamples);
    }

    let limits = calculate_max_limits(ctx.dive);
    let mut series = populate_plot_entries(ctx, &limits)?;
    check_setpoint_events(ctx, &mut series);

    let windows = reconstruct_gas_pressures(ctx, &mut series);
    log::debug!(
        "{} of {} cylinders carry pressure anchors",
        windows.iter().filter(|w| w.interesting).count(),
        windows.len()
    );
    if !fast {
        interpolate_pressures(ctx, &mut series);
    }

    fill_o2_values(ctx, &mut series);
    calculate_sac(ctx, &mut series);
    series.deco = calculate_deco_information(ctx, &mut series, gate);
    calculate_gas_information(ctx, &mut series);

    series.dive_type = classify_dive_type(ctx, &series);
    series.max_pp = max_partial_pressure(&series, prefs);
    series.time_bound_sec = plot_time_bound(&series.limits, series.dive_type, prefs.zoomed_plot);
    series.depth_bound_mm = plot_depth_bound(&series.limits, series.max_pp, prefs.zoomed_plot);
    if series.mean_depth_mm == 0 {
        series.mean_depth_mm = series.interior().last().map_or(0, |e| e.mean_depth_mm());
    }
    analyze_plot_info(&mut series);
    Ok(series)
}

/// [`create_plot_info`] holding the process-wide planner lock.
pub fn analyze_dive(dive: &Dive, dc_index: usize, prefs: &ProfilePrefs) -> ProfileResult<DenseSeries> {
    create_plot_info(dive, dc_index, prefs, false, &PLANNER_LOCK)
}
