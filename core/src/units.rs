//! Unit conversions.
//!
//! Raw dive data is kept in integer SI sub-units: millimetres, millibar,
//! seconds and millikelvin. Physiology and tissue code works in bar.

use serde::{Deserialize, Serialize};

/// Standard atmosphere in millibar.
pub const STANDARD_PRESSURE_MBAR: i32 = 1013;

/// Seawater salinity in grams per 10 litres.
pub const SEAWATER_SALINITY: i32 = 10300;

/// Depths shallower than this count as "at the surface".
pub const SURFACE_THRESHOLD_MM: i32 = 750;

const ZERO_C_IN_MKELVIN: f64 = 273_150.0;
const MM_PER_FOOT: f64 = 304.8;
const PSI_PER_MBAR: f64 = 0.014_503_77;
const ML_PER_CUFT: f64 = 28_316.846_6;

/// Surface pressure and water density that depth conversions depend on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceConditions {
    pub surface_pressure_mbar: i32,
    /// Grams per 10 litres (10300 for seawater, 10000 for fresh water).
    pub salinity: i32,
}

impl Default for SurfaceConditions {
    fn default() -> Self {
        SurfaceConditions {
            surface_pressure_mbar: STANDARD_PRESSURE_MBAR,
            salinity: SEAWATER_SALINITY,
        }
    }
}

impl SurfaceConditions {
    /// Build from optional recorded values, falling back to sea level seawater.
    pub fn new(surface_pressure_mbar: Option<i32>, salinity: Option<i32>) -> Self {
        SurfaceConditions {
            surface_pressure_mbar: surface_pressure_mbar
                .filter(|p| *p > 0)
                .unwrap_or(STANDARD_PRESSURE_MBAR),
            salinity: salinity.filter(|s| *s > 0).unwrap_or(SEAWATER_SALINITY),
        }
    }

    /// Millibar per centimetre of water.
    fn specific_weight(&self) -> f64 {
        self.salinity as f64 / 10_000.0 * 0.981
    }

    pub fn surface_bar(&self) -> f64 {
        self.surface_pressure_mbar as f64 / 1000.0
    }

    pub fn depth_to_mbar(&self, depth_mm: i32) -> i32 {
        self.depth_to_mbar_f(depth_mm).round() as i32
    }

    pub fn depth_to_mbar_f(&self, depth_mm: i32) -> f64 {
        depth_mm as f64 / 10.0 * self.specific_weight() + self.surface_pressure_mbar as f64
    }

    pub fn depth_to_bar(&self, depth_mm: i32) -> f64 {
        self.depth_to_mbar_f(depth_mm) / 1000.0
    }

    pub fn depth_to_atm(&self, depth_mm: i32) -> f64 {
        self.depth_to_mbar_f(depth_mm) / 1013.25
    }

    /// Water column (mm) corresponding to a pressure above the surface.
    pub fn rel_mbar_to_depth(&self, mbar: i32) -> i32 {
        (mbar as f64 * 10.0 / self.specific_weight()).round() as i32
    }

    /// Depth (mm) at which the absolute pressure is `mbar`.
    pub fn mbar_to_depth(&self, mbar: i32) -> i32 {
        self.rel_mbar_to_depth(mbar - self.surface_pressure_mbar)
    }
}

/// Linear interpolation of `a..b` at `part` out of `whole`, rounded.
pub fn interpolate(a: i32, b: i32, part: i32, whole: i32) -> i32 {
    if whole == 0 {
        return a;
    }
    let x = a as f64 * (whole - part) as f64 + b as f64 * part as f64;
    (x / whole as f64).round() as i32
}

pub fn round_up(x: i32, y: i32) -> i32 {
    (x + y - 1) / y * y
}

pub fn div_up(x: i32, y: i32) -> i32 {
    (x + y - 1) / y
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LengthUnit {
    #[default]
    Meters,
    Feet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PressureUnit {
    #[default]
    Bar,
    Psi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VolumeUnit {
    #[default]
    Liter,
    Cuft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeUnit {
    #[default]
    Minutes,
    Seconds,
}

/// Unit system used by the text formatters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayUnits {
    pub length: LengthUnit,
    pub pressure: PressureUnit,
    pub temperature: TemperatureUnit,
    pub volume: VolumeUnit,
    pub vertical_speed_time: TimeUnit,
}

impl DisplayUnits {
    pub fn depth(&self, mm: f64) -> (f64, &'static str) {
        match self.length {
            LengthUnit::Meters => (mm / 1000.0, "m"),
            LengthUnit::Feet => (mm / MM_PER_FOOT, "ft"),
        }
    }

    pub fn pressure(&self, mbar: i32) -> (i32, &'static str) {
        match self.pressure {
            PressureUnit::Bar => ((mbar as f64 / 1000.0).round() as i32, "bar"),
            PressureUnit::Psi => ((mbar as f64 * PSI_PER_MBAR).round() as i32, "psi"),
        }
    }

    pub fn temperature(&self, mkelvin: u32) -> (f64, &'static str) {
        let celsius = (mkelvin as f64 - ZERO_C_IN_MKELVIN) / 1000.0;
        match self.temperature {
            TemperatureUnit::Celsius => (celsius, "°C"),
            TemperatureUnit::Fahrenheit => (celsius * 9.0 / 5.0 + 32.0, "°F"),
        }
    }

    /// Returns value, number of decimals worth showing, and unit.
    pub fn volume(&self, ml: i32) -> (f64, usize, &'static str) {
        match self.volume {
            VolumeUnit::Liter => (ml as f64 / 1000.0, 1, "ℓ"),
            VolumeUnit::Cuft => (ml as f64 / ML_PER_CUFT, 2, "cuft"),
        }
    }

    pub fn vertical_speed(&self, mm_per_sec: f64) -> (f64, &'static str) {
        let per_time = match self.vertical_speed_time {
            TimeUnit::Minutes => mm_per_sec * 60.0,
            TimeUnit::Seconds => mm_per_sec,
        };
        match (self.length, self.vertical_speed_time) {
            (LengthUnit::Meters, TimeUnit::Minutes) => (per_time / 1000.0, "m/min"),
            (LengthUnit::Meters, TimeUnit::Seconds) => (per_time / 1000.0, "m/s"),
            (LengthUnit::Feet, TimeUnit::Minutes) => (per_time / MM_PER_FOOT, "ft/min"),
            (LengthUnit::Feet, TimeUnit::Seconds) => (per_time / MM_PER_FOOT, "ft/s"),
        }
    }
}
