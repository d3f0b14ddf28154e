//! Foreign interface. Dives and preferences cross the boundary as JSON;
//! results come back as flat records in SI units.

use crate::context::AnalysisContext;
use crate::error::ProfileError;
use crate::format::{compare_entries, format_comparison, summary_at_time};
use crate::models::Dive;
use crate::prefs::ProfilePrefs;
use crate::deco::PLANNER_LOCK;
use crate::profile::{analyze_dive, plot_context};
use crate::series::{DenseEntry, DenseSeries, DiveType, Velocity};

#[derive(Debug, thiserror::Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum ProfileFfiError {
    #[error("malformed input: {0}")]
    Input(String),

    #[error("analysis failed: {0}")]
    Analysis(String),
}

impl From<ProfileError> for ProfileFfiError {
    fn from(e: ProfileError) -> Self {
        match e {
            ProfileError::Json(msg) => ProfileFfiError::Input(msg),
            other => ProfileFfiError::Analysis(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum VelocityClass {
    Stable,
    Slow,
    Moderate,
    Fast,
    Crazy,
}

impl From<Velocity> for VelocityClass {
    fn from(v: Velocity) -> Self {
        match v {
            Velocity::Stable => VelocityClass::Stable,
            Velocity::Slow => VelocityClass::Slow,
            Velocity::Moderate => VelocityClass::Moderate,
            Velocity::Fast => VelocityClass::Fast,
            Velocity::Crazy => VelocityClass::Crazy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum ProfileDiveType {
    Air,
    Nitrox,
    Trimix,
    Freedive,
}

impl From<DiveType> for ProfileDiveType {
    fn from(t: DiveType) -> Self {
        match t {
            DiveType::Air => ProfileDiveType::Air,
            DiveType::Nitrox => ProfileDiveType::Nitrox,
            DiveType::Trimix => ProfileDiveType::Trimix,
            DiveType::Freedive => ProfileDiveType::Freedive,
        }
    }
}

/// One entry of the analysed profile.
#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct ProfilePoint {
    pub t_sec: i32,
    pub depth_m: f32,
    pub smoothed_depth_m: f32,
    pub velocity: VelocityClass,
    /// Cylinder 0, logged or interpolated.
    pub pressure_bar: Option<f32>,
    pub sac_l_min: Option<f32>,
    pub po2_bar: f32,
    pub ceiling_m: Option<f32>,
    pub gf_surface_pct: f32,
    pub ndl_sec: Option<i32>,
    pub tts_sec: i32,
    pub stop_depth_m: Option<f32>,
    pub in_deco: bool,
}

impl From<&DenseEntry> for ProfilePoint {
    fn from(e: &DenseEntry) -> Self {
        let metres = |mm: i32| mm as f32 / 1000.0;
        ProfilePoint {
            t_sec: e.time_sec,
            depth_m: metres(e.depth_mm),
            smoothed_depth_m: metres(e.smoothed_mm),
            velocity: e.velocity.into(),
            pressure_bar: e.pressure(0).map(|mbar| mbar as f32 / 1000.0),
            sac_l_min: (e.sac_ml_min > 0).then(|| e.sac_ml_min as f32 / 1000.0),
            po2_bar: e.pressures.o2 as f32,
            ceiling_m: (e.ceiling_mm > 0).then(|| metres(e.ceiling_mm)),
            gf_surface_pct: e.surface_gf as f32,
            ndl_sec: e.calc.ndl_sec,
            tts_sec: e.calc.tts_sec,
            stop_depth_m: (e.calc.stopdepth_mm > 0).then(|| metres(e.calc.stopdepth_mm)),
            in_deco: e.calc.in_deco,
        }
    }
}

#[derive(Clone, Debug, PartialEq, uniffi::Record)]
pub struct ProfileAnalysis {
    pub points: Vec<ProfilePoint>,
    pub dive_type: ProfileDiveType,
    pub mean_depth_m: f32,
    pub max_pp_bar: f32,
    pub time_bound_sec: i32,
    pub depth_bound_m: f32,
    pub deco_iterations: u32,
    pub deco_converged: bool,
}

impl From<&DenseSeries> for ProfileAnalysis {
    fn from(series: &DenseSeries) -> Self {
        ProfileAnalysis {
            points: series.interior().iter().map(ProfilePoint::from).collect(),
            dive_type: series.dive_type.into(),
            mean_depth_m: series.mean_depth_mm as f32 / 1000.0,
            max_pp_bar: series.max_pp as f32,
            time_bound_sec: series.time_bound_sec,
            depth_bound_m: series.depth_bound_mm as f32 / 1000.0,
            deco_iterations: series.deco.iterations,
            deco_converged: series.deco.converged,
        }
    }
}

fn parse(dive_json: &str, prefs_json: &str) -> Result<(Dive, ProfilePrefs), ProfileFfiError> {
    let dive: Dive = serde_json::from_str(dive_json).map_err(ProfileError::from)?;
    let prefs: ProfilePrefs = if prefs_json.trim().is_empty() {
        ProfilePrefs::default()
    } else {
        ProfilePrefs::from_json(prefs_json)?
    };
    Ok((dive, prefs))
}

/// Analyse computer `computer_index` of a JSON encoded dive. An empty
/// `prefs_json` means default preferences.
#[uniffi::export]
pub fn analyze_dive_json(
    dive_json: String,
    prefs_json: String,
    computer_index: u32,
) -> Result<ProfileAnalysis, ProfileFfiError> {
    let (dive, prefs) = parse(&dive_json, &prefs_json)?;
    let series = analyze_dive(&dive, computer_index as usize, &prefs)?;
    Ok(ProfileAnalysis::from(&series))
}

/// Info box lines for the first entry at or after `t_sec`.
#[uniffi::export]
pub fn point_summary_json(
    dive_json: String,
    prefs_json: String,
    computer_index: u32,
    t_sec: i32,
) -> Result<Vec<String>, ProfileFfiError> {
    let (dive, prefs) = parse(&dive_json, &prefs_json)?;
    let ctx = AnalysisContext::new(&dive, computer_index as usize, &prefs)?;
    let series = plot_context(&ctx, false, &PLANNER_LOCK)?;
    Ok(summary_at_time(&series, t_sec, &ctx).unwrap_or_default())
}

/// Statistics between two times of the profile, rendered as text.
/// `None` when the times do not select two distinct entries.
#[uniffi::export]
pub fn compare_span_json(
    dive_json: String,
    prefs_json: String,
    computer_index: u32,
    from_sec: i32,
    to_sec: i32,
) -> Result<Option<String>, ProfileFfiError> {
    let (dive, prefs) = parse(&dive_json, &prefs_json)?;
    let ctx = AnalysisContext::new(&dive, computer_index as usize, &prefs)?;
    let series = plot_context(&ctx, false, &PLANNER_LOCK)?;
    let (Some(a), Some(b)) = (series.entry_at_time(from_sec), series.entry_at_time(to_sec)) else {
        return Ok(None);
    };
    Ok(compare_entries(&series, a, b, false, &ctx).map(|c| format_comparison(&c, &prefs.units)))
}
