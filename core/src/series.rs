//! The dense, uniformly analysable profile produced for one dive computer.

use serde::{Deserialize, Serialize};

use crate::deco::COMPARTMENTS;
use crate::gas::{GasMix, GasPressures};
use crate::limits::PlotLimits;
use crate::models::{DiveMode, MAX_CYLINDERS, MAX_O2_SENSORS};

/// Number of padding entries at each end of a series.
pub const PADDING_ENTRIES: usize = 2;

/// Vertical speed classes, ordered from calm to extreme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Velocity {
    #[default]
    Stable,
    Slow,
    Moderate,
    Fast,
    Crazy,
}

impl Velocity {
    /// Classify a vertical speed in mm/s. Ascent is negative.
    pub fn classify(speed_mm_s: i32) -> Self {
        match speed_mm_s {
            s if s < -304 => Velocity::Crazy,
            s if s < -152 => Velocity::Fast,
            s if s < -76 => Velocity::Moderate,
            s if s < -25 => Velocity::Slow,
            s if s < 25 => Velocity::Stable,
            s if s < 152 => Velocity::Slow,
            s if s < 304 => Velocity::Moderate,
            s if s < 507 => Velocity::Fast,
            _ => Velocity::Crazy,
        }
    }
}

/// Gas mix composition class of a whole dive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiveType {
    #[default]
    Air,
    Nitrox,
    Trimix,
    Freedive,
}

/// Decompression status either reported by the device or recalculated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoStatus {
    /// `None` when not known at this entry.
    pub ndl_sec: Option<i32>,
    pub tts_sec: i32,
    pub stopdepth_mm: i32,
    pub stoptime_sec: i32,
    pub in_deco: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DenseEntry {
    pub time_sec: i32,
    pub depth_mm: i32,
    pub smoothed_mm: i32,
    pub speed_mm_s: i32,
    pub velocity: Velocity,
    /// Area under the depth/time curve up to this entry (mm·s).
    pub running_sum: i64,
    /// Indices of the shallowest and deepest entries within ±4.5 minutes.
    pub min_idx: usize,
    pub max_idx: usize,

    /// Millikelvin; zero before the first reading.
    pub temperature_mk: u32,
    pub heartbeat: u8,
    pub bearing: Option<i32>,
    pub cns: u8,
    pub rbt_sec: i32,

    /// Direct sensor readings and reconstructed anchors, per cylinder.
    pub sensor_pressure: [Option<i32>; MAX_CYLINDERS],
    /// Linear fill between known readings; never set where `sensor_pressure` is.
    pub interpolated_pressure: [Option<i32>; MAX_CYLINDERS],
    pub sac_ml_min: i32,

    pub gasmix: GasMix,
    pub divemode: DiveMode,
    pub o2_pressure_mbar: i32,
    pub o2_setpoint_mbar: i32,
    pub o2_sensor_mbar: [i32; MAX_O2_SENSORS],
    /// Open-circuit pO2 a passive semi-closed diver would breathe on bailout.
    pub scr_oc_po2_mbar: i32,
    pub pressures: GasPressures,
    pub mod_mm: i32,
    pub ead_mm: i32,
    pub end_mm: i32,
    pub eadd_mm: i32,
    /// g/ℓ
    pub density: f64,

    pub ambient_bar: f64,
    pub ceiling_mm: i32,
    pub ceilings_mm: [i32; COMPARTMENTS],
    pub percentages: [i32; COMPARTMENTS],
    pub surface_gf: f64,
    pub icd_warning: bool,

    pub device: DecoStatus,
    pub calc: DecoStatus,
}

impl DenseEntry {
    /// Pressure of `cylinder`, preferring real readings over interpolation.
    pub fn pressure(&self, cylinder: usize) -> Option<i32> {
        if cylinder >= MAX_CYLINDERS {
            return None;
        }
        self.sensor_pressure[cylinder].or(self.interpolated_pressure[cylinder])
    }

    pub fn has_pressure(&self, cylinder: usize) -> bool {
        self.pressure(cylinder).is_some()
    }

    /// Running mean depth since the start of the dive.
    pub fn mean_depth_mm(&self) -> i32 {
        if self.time_sec > 0 {
            (self.running_sum / self.time_sec as i64) as i32
        } else {
            self.depth_mm
        }
    }
}

/// Outcome of the decompression pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DecoSummary {
    /// Whole-profile walks performed.
    pub iterations: u32,
    /// Total deco time estimate the walk converged on (seconds).
    pub deco_time_sec: i32,
    pub converged: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DenseSeries {
    pub entries: Vec<DenseEntry>,
    pub limits: PlotLimits,
    pub dive_type: DiveType,
    pub mean_depth_mm: i32,
    /// Largest partial pressure among the requested overlay graphs (bar).
    pub max_pp: f64,
    /// Time axis extent for drawing (seconds), padded per `zoomed_plot`.
    pub time_bound_sec: i32,
    /// Depth axis extent for drawing (mm), padded per `zoomed_plot`.
    pub depth_bound_mm: i32,
    /// Distinct event names, in the order first seen.
    pub event_names: Vec<String>,
    pub deco: DecoSummary,
}

impl DenseSeries {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries between the leading and trailing padding.
    pub fn interior(&self) -> &[DenseEntry] {
        if self.entries.len() < 2 * PADDING_ENTRIES {
            return &[];
        }
        &self.entries[PADDING_ENTRIES..self.entries.len() - PADDING_ENTRIES]
    }

    /// Index of the first non-padding entry at or after `time_sec`, falling
    /// back to the last non-padding entry.
    pub fn entry_at_time(&self, time_sec: i32) -> Option<usize> {
        if self.entries.len() <= 2 * PADDING_ENTRIES {
            return None;
        }
        let last = self.entries.len() - PADDING_ENTRIES - 1;
        let found = self.entries[PADDING_ENTRIES..=last]
            .iter()
            .position(|entry| entry.time_sec >= time_sec)
            .map(|offset| offset + PADDING_ENTRIES);
        Some(found.unwrap_or(last))
    }

    pub(crate) fn register_event_name(&mut self, name: &str) {
        if !self.event_names.iter().any(|known| known == name) {
            self.event_names.push(name.to_string());
        }
    }
}
