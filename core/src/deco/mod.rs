//! Tissue saturation model shared by the ceiling, NDL and TTS calculations.
//!
//! [`DecoState`] is a plain value: the 16 compartments, the derived
//! tolerances, and the VPM-B bubble state. Speculative work (an NDL or TTS
//! forecast from some point of the dive) runs on the live state between a
//! [`DecoState::checkpoint`] and a [`DecoState::restore`].

pub mod buhlmann;
pub mod gate;
pub mod solver;
pub mod vpmb;

use crate::gas::{fill_pressures, GasMix};
use crate::models::DiveMode;
use crate::prefs::{DecoModel, DecoPrefs, ProfilePrefs};
use crate::units::SurfaceConditions;

use buhlmann::{
    compartment_gf, mixed_coefficients, saturation_factor, GradientFactors, GF_LOW_POSITION_MIN_BAR,
    HE_HALF_TIMES, N2_HALF_TIMES,
};
use vpmb::{surface_n2_tension, VpmbState};

pub use gate::{ExclusiveAccess, PlannerLock, SharedDecoModel, PLANNER_LOCK};
pub use solver::{calculate_deco_information, calculate_ndl_tts, ConvergenceLoop};

/// Number of tissue compartments.
pub const COMPARTMENTS: usize = 16;

/// Water vapour pressure in the lungs (bar), at 37°C.
pub const WATER_VAPOUR_BAR: f64 = 0.0627;

/// Deco stops sit on multiples of this depth.
pub const STOP_STEP_MM: i32 = 3_000;

/// Tissue loading below ambient maps to 0..50, above it 50..100 at the M-value.
const AMB_PERCENTAGE: f64 = 50.0;

/// VPM-B tolerance iteration stops once successive estimates differ by less.
const VPMB_TOLERANCE_EPSILON_BAR: f64 = 0.01;
const VPMB_TOLERANCE_MAX_STEPS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct DecoState {
    model: DecoModel,
    gf_low: f64,
    gf_high: f64,
    satmult: f64,
    desatmult: f64,
    icd_ratio: f64,
    last_deco_stop_mm: i32,
    surface_bar: f64,

    /// Inert gas tensions (bar).
    pub(crate) tissue_n2: [f64; COMPARTMENTS],
    pub(crate) tissue_he: [f64; COMPARTMENTS],
    /// Lowest tolerated ambient pressure per compartment (bar), from the
    /// last [`DecoState::tolerance`] call.
    pub(crate) tolerated: [f64; COMPARTMENTS],
    a: [f64; COMPARTMENTS],
    b: [f64; COMPARTMENTS],
    pub(crate) guiding_tissue: usize,
    gf_low_pressure_this_dive: f64,

    /// VPM-B total decompression time estimate (seconds).
    pub deco_time_sec: i32,
    /// Pressure at the deepest ceiling so far (mbar), 0 before any.
    pub first_ceiling_pressure_mbar: i32,
    /// Set by the last segment when N2 gain outpaced He loss in the leading
    /// compartment.
    pub icd_warning: bool,

    pub(crate) vpmb: VpmbState,
}

/// Saved copy of a [`DecoState`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecoSnapshot(DecoState);

impl DecoState {
    /// Fresh tissues saturated on air at the surface.
    pub fn new(prefs: &DecoPrefs, surface: &SurfaceConditions) -> Self {
        let surface_bar = surface.surface_bar();
        DecoState {
            model: prefs.model,
            gf_low: prefs.gf_low,
            gf_high: prefs.gf_high,
            satmult: prefs.satmult,
            desatmult: prefs.desatmult,
            icd_ratio: prefs.icd_ratio,
            last_deco_stop_mm: prefs.last_deco_stop_mm,
            surface_bar,
            tissue_n2: [surface_n2_tension(surface_bar); COMPARTMENTS],
            tissue_he: [0.0; COMPARTMENTS],
            tolerated: [0.0; COMPARTMENTS],
            a: [0.0; COMPARTMENTS],
            b: [0.0; COMPARTMENTS],
            guiding_tissue: 0,
            gf_low_pressure_this_dive: surface_bar + GF_LOW_POSITION_MIN_BAR,
            deco_time_sec: 0,
            first_ceiling_pressure_mbar: 0,
            icd_warning: false,
            vpmb: VpmbState::new(prefs.vpmb_conservatism),
        }
    }

    pub fn model(&self) -> DecoModel {
        self.model
    }

    pub fn surface_bar(&self) -> f64 {
        self.surface_bar
    }

    pub fn guiding_tissue(&self) -> usize {
        self.guiding_tissue
    }

    pub fn checkpoint(&self) -> DecoSnapshot {
        DecoSnapshot(self.clone())
    }

    pub fn restore(&mut self, snapshot: &DecoSnapshot) {
        self.clone_from(&snapshot.0);
    }

    /// Restore the snapshot but carry over the VPM-B gradients and first
    /// ceiling pressure, which the next profile walk builds on.
    pub fn restore_keeping_gradients(&mut self, snapshot: &DecoSnapshot) {
        let gradients = self.vpmb.gradients();
        let first_ceiling_pressure_mbar = self.first_ceiling_pressure_mbar;
        self.restore(snapshot);
        self.vpmb.set_gradients(gradients);
        self.first_ceiling_pressure_mbar = first_ceiling_pressure_mbar;
    }

    /// Relax the VPM-B gradients for a total decompression time of
    /// `deco_time_sec` and remember that estimate.
    pub(crate) fn relax_gradients(&mut self, deco_time_sec: i32) {
        self.deco_time_sec = deco_time_sec;
        self.vpmb
            .next_gradient(deco_time_sec, self.surface_bar, &self.tissue_n2, &self.tissue_he);
    }

    /// Expose the tissues to `mix` at `ambient_bar` for `seconds`.
    pub fn add_segment(
        &mut self,
        ambient_bar: f64,
        mix: &GasMix,
        seconds: i32,
        o2_pressure_mbar: i32,
        mode: DiveMode,
        prefs: &ProfilePrefs,
    ) {
        let inspired = fill_pressures(
            ambient_bar - WATER_VAPOUR_BAR,
            mix,
            o2_pressure_mbar as f64 / 1000.0,
            mode,
            prefs,
        );
        let seconds = seconds as f64;
        self.icd_warning = false;
        for ci in 0..COMPARTMENTS {
            let n2_oversat = inspired.n2 - self.tissue_n2[ci];
            let he_oversat = inspired.he - self.tissue_he[ci];
            let n2_mult = if n2_oversat > 0.0 { self.satmult } else { self.desatmult };
            let he_mult = if he_oversat > 0.0 { self.satmult } else { self.desatmult };
            let n2_change = n2_mult * n2_oversat * saturation_factor(seconds, N2_HALF_TIMES[ci]);
            let he_change = he_mult * he_oversat * saturation_factor(seconds, HE_HALF_TIMES[ci]);

            // Isobaric counterdiffusion check on the leading compartment.
            if ci == self.guiding_tissue && n2_change > 0.0 && he_change < 0.0 {
                self.icd_warning = n2_change > -self.icd_ratio * he_change;
            }
            self.tissue_n2[ci] += n2_change;
            self.tissue_he[ci] += he_change;
        }
        if self.model == DecoModel::Vpmb {
            self.vpmb
                .calc_crushing_pressure(&self.tissue_n2, &self.tissue_he, ambient_bar);
        }
    }

    /// Lowest ambient pressure (bar) every compartment tolerates right now.
    ///
    /// Updates the per-compartment tolerances and the guiding tissue.
    pub fn tolerance(&mut self, ambient_bar: f64) -> f64 {
        for ci in 0..COMPARTMENTS {
            let (a, b) = mixed_coefficients(ci, self.tissue_n2[ci], self.tissue_he[ci]);
            self.a[ci] = a;
            self.b[ci] = b;
        }
        match self.model {
            DecoModel::Buhlmann => self.buhlmann_tolerance(),
            DecoModel::Vpmb => self.vpmb_tolerance(ambient_bar),
        }
    }

    fn buhlmann_tolerance(&mut self) -> f64 {
        let mut lowest_ceiling: f64 = 0.0;
        for ci in 0..COMPARTMENTS {
            let saturation = self.tissue_n2[ci] + self.tissue_he[ci];
            let gf = self.gradient_factors();
            lowest_ceiling = lowest_ceiling.max(gf.lowest_ceiling(saturation, self.a[ci], self.b[ci]));
        }
        self.gf_low_pressure_this_dive = self.gf_low_pressure_this_dive.max(lowest_ceiling);

        let gf = self.gradient_factors();
        let mut result: f64 = 0.0;
        for ci in 0..COMPARTMENTS {
            let saturation = self.tissue_n2[ci] + self.tissue_he[ci];
            let tolerated = gf.tolerated(saturation, self.a[ci], self.b[ci], result);
            self.tolerated[ci] = tolerated;
            if tolerated >= result {
                self.guiding_tissue = ci;
                result = tolerated;
            }
        }
        result
    }

    fn vpmb_tolerance(&mut self, ambient_bar: f64) -> f64 {
        let first_ceiling = (self.first_ceiling_pressure_mbar != 0)
            .then(|| self.first_ceiling_pressure_mbar as f64 / 1000.0);
        let mut result = ambient_bar;
        for _ in 0..VPMB_TOLERANCE_MAX_STEPS {
            let reference = result;
            result = 0.0;
            for ci in 0..COMPARTMENTS {
                let tolerated = self.vpmb.tolerated(
                    self.tissue_n2[ci],
                    self.tissue_he[ci],
                    ci,
                    reference,
                    first_ceiling,
                );
                self.tolerated[ci] = tolerated;
                if tolerated >= result {
                    self.guiding_tissue = ci;
                    result = tolerated;
                }
            }
            if (result - reference).abs() <= VPMB_TOLERANCE_EPSILON_BAR {
                break;
            }
        }
        result
    }

    fn gradient_factors(&self) -> GradientFactors {
        GradientFactors {
            low: self.gf_low,
            high: self.gf_high,
            surface: self.surface_bar,
            low_pressure: self.gf_low_pressure_this_dive,
        }
    }

    /// Ceiling (mm) for a tolerated pressure, honouring the last stop depth.
    pub fn allowed_depth(&self, tolerance_bar: f64, surface: &SurfaceConditions, smooth: bool) -> i32 {
        deco_allowed_depth(tolerance_bar, surface, smooth, self.last_deco_stop_mm)
    }

    /// Ceiling of each compartment (mm), not rounded to stops.
    pub fn tissue_ceilings(&self, surface: &SurfaceConditions) -> [i32; COMPARTMENTS] {
        std::array::from_fn(|ci| self.allowed_depth(self.tolerated[ci], surface, true))
    }

    /// Compartment loading on a 0..100 scale where 50 is ambient
    /// saturation and 100 the M-value at `ambient_bar`.
    pub fn tissue_percentages(&self, ambient_bar: f64) -> [i32; COMPARTMENTS] {
        std::array::from_fn(|ci| {
            let saturation = self.tissue_n2[ci] + self.tissue_he[ci];
            let percentage = if saturation < ambient_bar {
                saturation / ambient_bar * AMB_PERCENTAGE
            } else {
                let gf = compartment_gf(saturation, ambient_bar, self.a[ci], self.b[ci]);
                AMB_PERCENTAGE + gf * (100.0 - AMB_PERCENTAGE)
            };
            percentage.round() as i32
        })
    }

    /// Gradient factor (%) the leading compartment would surface with.
    pub fn surface_gf(&self) -> f64 {
        (0..COMPARTMENTS)
            .map(|ci| {
                let saturation = self.tissue_n2[ci] + self.tissue_he[ci];
                let (a, b) = mixed_coefficients(ci, self.tissue_n2[ci], self.tissue_he[ci]);
                100.0 * compartment_gf(saturation, self.surface_bar, a, b)
            })
            .fold(0.0, f64::max)
    }
}

/// Depth (mm) corresponding to a tolerated pressure.
///
/// Unless `smooth`, the result is rounded up to the 3 m stop grid. Anything
/// between the surface and `last_deco_stop_mm` is raised to that stop.
pub fn deco_allowed_depth(
    tolerance_bar: f64,
    surface: &SurfaceConditions,
    smooth: bool,
    last_deco_stop_mm: i32,
) -> i32 {
    let above_surface_mbar = ((tolerance_bar - surface.surface_bar()).max(0.0) * 1000.0).round() as i32;
    let mut depth = surface.rel_mbar_to_depth(above_surface_mbar);
    if !smooth {
        depth = crate::units::round_up(depth, STOP_STEP_MM);
    }
    if depth > 0 && depth < last_deco_stop_mm {
        depth = last_deco_stop_mm;
    }
    depth
}
