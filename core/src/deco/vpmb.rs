//! Varying permeability model with Boyle's law compensation (VPM-B).
//!
//! Bubble nuclei are crushed on descent, regenerate slowly and set the
//! allowed supersaturation gradient per compartment. The gradient depends on
//! the total decompression time, so the caller walks the profile repeatedly
//! until that time stops moving (see the solver).

use super::buhlmann::{HE_HALF_TIMES, N2_HALF_TIMES};
use super::{COMPARTMENTS, WATER_VAPOUR_BAR};
use crate::gas::N2_IN_AIR;

// ============================================================================
// Model Constants
// ============================================================================

/// Critical nucleus radius for N2 (µm).
const CRIT_RADIUS_N2: f64 = 0.55;
/// Critical nucleus radius for He (µm).
const CRIT_RADIUS_HE: f64 = 0.45;
/// Radius multiplier per conservatism level 0..=4.
const CONSERVATISM_MULTIPLIERS: [f64; 5] = [1.0, 1.05, 1.12, 1.22, 1.35];
/// Critical volume parameter λ (bar·min).
const CRIT_VOLUME_LAMBDA: f64 = 199.58;
/// Gradient above which nuclei become impermeable (bar).
const GRADIENT_ONSET_OF_IMPERM: f64 = 8.30865;
/// Skin surface tension γ (N/m scaled to bar·µm).
const SURFACE_TENSION_GAMMA: f64 = 0.18137175;
/// Skin compression surface tension γc.
const SKIN_COMPRESSION_GAMMA_C: f64 = 2.6040525;
/// Regeneration time constant (minutes).
const REGENERATION_TIME: f64 = 20160.0;
/// Metabolic O2, CO2 and water vapour held in tissue (bar).
pub(crate) const OTHER_GASES_PRESSURE: f64 = 0.1359888;
/// Nitrogen fraction used for surface phase desaturation.
const NITROGEN_FRACTION: f64 = 0.79;

const BISECTION_STEPS: usize = 64;

// ============================================================================
// State
// ============================================================================

/// Per-compartment allowed gradients (bar).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Gradients {
    pub bottom_n2: [f64; COMPARTMENTS],
    pub bottom_he: [f64; COMPARTMENTS],
    pub initial_n2: [f64; COMPARTMENTS],
    pub initial_he: [f64; COMPARTMENTS],
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VpmbState {
    crit_radius_n2: f64,
    crit_radius_he: f64,
    max_n2_crushing_pressure: [f64; COMPARTMENTS],
    max_he_crushing_pressure: [f64; COMPARTMENTS],
    crushing_onset_tension: [f64; COMPARTMENTS],
    n2_regen_radius: [f64; COMPARTMENTS],
    he_regen_radius: [f64; COMPARTMENTS],
    max_ambient_pressure: f64,
    gradients: Gradients,
}

impl VpmbState {
    pub fn new(conservatism: u8) -> Self {
        let multiplier = CONSERVATISM_MULTIPLIERS[usize::from(conservatism).min(4)];
        let crit_radius_n2 = CRIT_RADIUS_N2 * multiplier;
        let crit_radius_he = CRIT_RADIUS_HE * multiplier;
        VpmbState {
            crit_radius_n2,
            crit_radius_he,
            max_n2_crushing_pressure: [0.0; COMPARTMENTS],
            max_he_crushing_pressure: [0.0; COMPARTMENTS],
            crushing_onset_tension: [0.0; COMPARTMENTS],
            n2_regen_radius: [crit_radius_n2; COMPARTMENTS],
            he_regen_radius: [crit_radius_he; COMPARTMENTS],
            max_ambient_pressure: 0.0,
            gradients: Gradients {
                bottom_n2: [0.0; COMPARTMENTS],
                bottom_he: [0.0; COMPARTMENTS],
                initial_n2: [0.0; COMPARTMENTS],
                initial_he: [0.0; COMPARTMENTS],
            },
        }
    }

    pub fn gradients(&self) -> Gradients {
        self.gradients
    }

    pub fn set_gradients(&mut self, gradients: Gradients) {
        self.gradients = gradients;
    }

    /// Record how hard nuclei were squeezed by descending to `ambient` bar.
    ///
    /// Below the impermeability onset the crushing pressure is the plain
    /// gradient. Past it, gas no longer diffuses into the nucleus and the
    /// inner pressure follows Boyle's law from the onset radius.
    pub fn calc_crushing_pressure(&mut self, n2: &[f64; COMPARTMENTS], he: &[f64; COMPARTMENTS], ambient: f64) {
        for ci in 0..COMPARTMENTS {
            let tension = n2[ci] + he[ci] + OTHER_GASES_PRESSURE;
            let gradient = ambient - tension;
            let (n2_crushing, he_crushing) = if gradient <= GRADIENT_ONSET_OF_IMPERM {
                self.crushing_onset_tension[ci] = tension;
                (gradient, gradient)
            } else {
                if self.max_ambient_pressure >= ambient {
                    continue;
                }
                let onset = self.crushing_onset_tension[ci];
                let n2_inner = calc_inner_pressure(self.crit_radius_n2, onset, ambient);
                let he_inner = calc_inner_pressure(self.crit_radius_he, onset, ambient);
                (ambient - n2_inner, ambient - he_inner)
            };
            self.max_n2_crushing_pressure[ci] = self.max_n2_crushing_pressure[ci].max(n2_crushing);
            self.max_he_crushing_pressure[ci] = self.max_he_crushing_pressure[ci].max(he_crushing);
        }
        self.max_ambient_pressure = self.max_ambient_pressure.max(ambient);
    }

    /// Let crushed nuclei grow back towards their critical radius over
    /// `time_sec` seconds.
    pub fn nuclear_regeneration(&mut self, time_sec: i32) {
        let minutes = time_sec as f64 / 60.0;
        let regrowth = 1.0 - (-minutes / REGENERATION_TIME).exp();
        let spread = 2.0 * (SKIN_COMPRESSION_GAMMA_C - SURFACE_TENSION_GAMMA);
        for ci in 0..COMPARTMENTS {
            let crushed_n2 = 1.0 / (self.max_n2_crushing_pressure[ci] / spread + 1.0 / self.crit_radius_n2);
            let crushed_he = 1.0 / (self.max_he_crushing_pressure[ci] / spread + 1.0 / self.crit_radius_he);
            self.n2_regen_radius[ci] = crushed_n2 + (self.crit_radius_n2 - crushed_n2) * regrowth;
            self.he_regen_radius[ci] = crushed_he + (self.crit_radius_he - crushed_he) * regrowth;
        }
    }

    /// Gradients implied by the regenerated radii, before any relaxation.
    pub fn start_gradient(&mut self) {
        let factor = 2.0 * (SURFACE_TENSION_GAMMA / SKIN_COMPRESSION_GAMMA_C)
            * (SKIN_COMPRESSION_GAMMA_C - SURFACE_TENSION_GAMMA);
        for ci in 0..COMPARTMENTS {
            let n2 = factor / self.n2_regen_radius[ci];
            let he = factor / self.he_regen_radius[ci];
            self.gradients.initial_n2[ci] = n2;
            self.gradients.bottom_n2[ci] = n2;
            self.gradients.initial_he[ci] = he;
            self.gradients.bottom_he[ci] = he;
        }
    }

    /// Relax the bottom gradients for a decompression lasting
    /// `deco_time_sec` plus the time to desaturate at the surface.
    pub fn next_gradient(
        &mut self,
        deco_time_sec: i32,
        surface_bar: f64,
        n2: &[f64; COMPARTMENTS],
        he: &[f64; COMPARTMENTS],
    ) {
        let gamma_ratio = SURFACE_TENSION_GAMMA / SKIN_COMPRESSION_GAMMA_C;
        let deco_minutes = deco_time_sec as f64 / 60.0;
        for ci in 0..COMPARTMENTS {
            let desat_time = deco_minutes
                + calc_surface_phase(
                    surface_bar,
                    he[ci],
                    n2[ci],
                    std::f64::consts::LN_2 / HE_HALF_TIMES[ci],
                    std::f64::consts::LN_2 / N2_HALF_TIMES[ci],
                );
            if desat_time <= 0.0 {
                continue;
            }
            let relax = |initial: f64, max_crushing: f64| {
                let b = initial + CRIT_VOLUME_LAMBDA * SURFACE_TENSION_GAMMA
                    / (SKIN_COMPRESSION_GAMMA_C * desat_time);
                let c = gamma_ratio * gamma_ratio * CRIT_VOLUME_LAMBDA * max_crushing / desat_time;
                0.5 * (b + (b * b - 4.0 * c).max(0.0).sqrt())
            };
            let g = &mut self.gradients;
            g.bottom_n2[ci] = relax(g.initial_n2[ci], self.max_n2_crushing_pressure[ci]);
            g.bottom_he[ci] = relax(g.initial_he[ci], self.max_he_crushing_pressure[ci]);
        }
    }

    /// Tolerated ambient pressure of compartment `ci` when ascending towards
    /// `reference` bar. Below the first ceiling the gradient shrinks as the
    /// bubble expands on the way up.
    pub fn tolerated(&self, n2: f64, he: f64, ci: usize, reference: f64, first_ceiling: Option<f64>) -> f64 {
        let g = &self.gradients;
        let (n2_gradient, he_gradient) = match first_ceiling {
            Some(fc) if reference < fc => (
                update_gradient(reference, fc, g.bottom_n2[ci]),
                update_gradient(reference, fc, g.bottom_he[ci]),
            ),
            _ => (g.bottom_n2[ci], g.bottom_he[ci]),
        };
        let inert = n2 + he;
        let total_gradient = if inert > 0.0 {
            (n2_gradient * n2 + he_gradient * he) / inert
        } else {
            n2_gradient
        };
        inert + OTHER_GASES_PRESSURE - total_gradient
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Gradient at `next_stop` bar for a bubble that had `gradient` at the first
/// ceiling, following Boyle's law.
fn update_gradient(next_stop: f64, first_ceiling: f64, gradient: f64) -> f64 {
    let cubed = gradient * gradient * gradient;
    let b = cubed / (first_ceiling + gradient);
    let c = next_stop * cubed / (first_ceiling + gradient);
    solve_cubic(b, c)
}

/// Real root of `x³ - b·x - c = 0`, 0 when the discriminant is negative.
pub(crate) fn solve_cubic(b: f64, c: f64) -> f64 {
    let discriminant = 27.0 * c * c - 4.0 * b * b * b;
    if discriminant < 0.0 {
        return 0.0;
    }
    let denominator = (9.0 * c + (3.0 * discriminant).sqrt()).cbrt();
    if denominator == 0.0 {
        return 0.0;
    }
    (2.0_f64 / 3.0).cbrt() * b / denominator + denominator / 18.0_f64.cbrt()
}

/// Minutes needed at the surface for the compartment to return to air
/// saturation, integrated over the exponential washout.
fn calc_surface_phase(surface_bar: f64, he: f64, n2: f64, he_time_constant: f64, n2_time_constant: f64) -> f64 {
    let inspired_n2 = (surface_bar - WATER_VAPOUR_BAR) * NITROGEN_FRACTION;
    if n2 > inspired_n2 {
        return (he / he_time_constant + (n2 - inspired_n2) / n2_time_constant)
            / (he + n2 - inspired_n2);
    }
    if he > 0.0 && he + n2 >= inspired_n2 {
        let decay_time = 1.0 / (n2_time_constant - he_time_constant)
            * ((inspired_n2 - n2) / he).ln();
        let integral_gradient = he / he_time_constant * (1.0 - (-he_time_constant * decay_time).exp())
            + (n2 - inspired_n2) / n2_time_constant * (1.0 - (-n2_time_constant * decay_time).exp());
        let denominator = he + n2 - inspired_n2;
        if denominator <= 0.0 {
            return 0.0;
        }
        return integral_gradient / denominator;
    }
    0.0
}

/// Pressure inside a nucleus crushed past the impermeability onset,
/// from `A·r³ - B·r² - C = 0` solved by bisection.
fn calc_inner_pressure(crit_radius: f64, onset_tension: f64, ambient: f64) -> f64 {
    let spread = 2.0 * (SKIN_COMPRESSION_GAMMA_C - SURFACE_TENSION_GAMMA);
    let onset_radius = 1.0 / (GRADIENT_ONSET_OF_IMPERM / spread + 1.0 / crit_radius);
    let a = ambient - GRADIENT_ONSET_OF_IMPERM + spread / onset_radius;
    let c = onset_tension * onset_radius.powi(3);
    if a <= 0.0 {
        return onset_tension;
    }
    let f = |r: f64| a * r.powi(3) - spread * r * r - c;
    let (mut low, mut high) = (spread / a, onset_radius);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (low + high);
        if f(mid) < 0.0 {
            low = mid;
        } else {
            high = mid;
        }
    }
    let radius = 0.5 * (low + high);
    onset_tension * onset_radius.powi(3) / radius.powi(3)
}

/// N2 tension of a compartment saturated on air at `surface_bar`.
pub(crate) fn surface_n2_tension(surface_bar: f64) -> f64 {
    (surface_bar - WATER_VAPOUR_BAR) * N2_IN_AIR as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: f64 = 1.013;

    fn saturated() -> ([f64; COMPARTMENTS], [f64; COMPARTMENTS]) {
        ([surface_n2_tension(SURFACE); COMPARTMENTS], [0.0; COMPARTMENTS])
    }

    #[test]
    fn test_solve_cubic_finds_root() {
        let (b, c) = (3.0, 5.0);
        let x = solve_cubic(b, c);
        assert!((x * x * x - b * x - c).abs() < 1e-9, "x={x} is not a root");
        assert_eq!(solve_cubic(3.0, 0.1), 0.0, "negative discriminant has no single real root");
    }

    #[test]
    fn test_update_gradient_is_identity_at_first_ceiling() {
        let g = update_gradient(2.0, 2.0, 0.5);
        assert!((g - 0.5).abs() < 1e-9, "got {g}");
        assert!(update_gradient(1.5, 2.0, 0.5) < 0.5);
    }

    #[test]
    fn test_conservatism_widens_radius() {
        let liberal = VpmbState::new(0);
        let strict = VpmbState::new(4);
        assert!(strict.crit_radius_n2 > liberal.crit_radius_n2);
        assert_eq!(VpmbState::new(9).crit_radius_n2, strict.crit_radius_n2);
    }

    #[test]
    fn test_crushing_and_regeneration() {
        let (n2, he) = saturated();
        let mut state = VpmbState::new(3);
        state.calc_crushing_pressure(&n2, &he, 5.0);
        assert!(state.max_n2_crushing_pressure.iter().all(|p| *p > 0.0));
        let crushed = state.max_n2_crushing_pressure;
        // Shallower afterwards must not lower the recorded maximum.
        state.calc_crushing_pressure(&n2, &he, 2.0);
        assert_eq!(state.max_n2_crushing_pressure, crushed);

        state.nuclear_regeneration(3_600);
        assert!(state.n2_regen_radius.iter().all(|r| *r < state.crit_radius_n2));
        state.start_gradient();
        let g = state.gradients();
        assert!(g.bottom_n2.iter().all(|x| *x > 0.0));
        assert_eq!(g.bottom_n2, g.initial_n2);
    }

    #[test]
    fn test_impermeable_crush_uses_boyle() {
        let (n2, he) = saturated();
        let mut state = VpmbState::new(0);
        state.calc_crushing_pressure(&n2, &he, 5.0);
        state.calc_crushing_pressure(&n2, &he, 15.0);
        let crush = state.max_n2_crushing_pressure[0];
        let tension = n2[0] + OTHER_GASES_PRESSURE;
        assert!(crush > GRADIENT_ONSET_OF_IMPERM, "crush {crush}");
        assert!(crush < 15.0 - tension, "inner pressure must exceed tension");
    }

    #[test]
    fn test_longer_deco_relaxes_gradient() {
        let (n2, he) = saturated();
        let mut state = VpmbState::new(3);
        state.calc_crushing_pressure(&n2, &he, 4.0);
        state.nuclear_regeneration(1_800);
        state.start_gradient();
        let loaded = [2.5; COMPARTMENTS];

        state.next_gradient(600, SURFACE, &loaded, &he);
        let short = state.gradients().bottom_n2[4];
        state.next_gradient(6_000, SURFACE, &loaded, &he);
        let long = state.gradients().bottom_n2[4];
        assert!(long < short, "short {short}, long {long}");
        assert!(long > state.gradients().initial_n2[4]);
    }

    #[test]
    fn test_surface_phase() {
        let inspired = (SURFACE - WATER_VAPOUR_BAR) * NITROGEN_FRACTION;
        assert_eq!(calc_surface_phase(SURFACE, 0.0, inspired - 0.1, 0.1, 0.05), 0.0);
        assert!(calc_surface_phase(SURFACE, 0.0, inspired + 0.5, 0.1, 0.05) > 0.0);
        let mixed = calc_surface_phase(SURFACE, 0.5, inspired - 0.1, 0.2, 0.05);
        assert!(mixed.is_finite() && mixed > 0.0, "mixed {mixed}");
    }

    #[test]
    fn test_tolerated_below_tension() {
        let (n2, he) = saturated();
        let mut state = VpmbState::new(3);
        state.calc_crushing_pressure(&n2, &he, 4.0);
        state.nuclear_regeneration(600);
        state.start_gradient();
        let tol = state.tolerated(2.0, 0.0, 3, 3.0, None);
        assert!(tol < 2.0 + OTHER_GASES_PRESSURE);
        let tighter = state.tolerated(2.0, 0.0, 3, 1.5, Some(2.0));
        assert!(tighter > tol, "a smaller gradient tolerates less");
    }
}
