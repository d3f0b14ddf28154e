//! Bühlmann ZHL-16C coefficients and gradient factor arithmetic.
//!
//! Tolerances are expressed as the lowest ambient pressure a compartment
//! accepts. Gradient factors scale the M-value line linearly between
//! `gf_low` at the deepest ceiling of the dive and `gf_high` at the surface.

use super::COMPARTMENTS;

// ============================================================================
// ZHL-16C Compartment Constants (Bühlmann / Baker)
// ============================================================================

/// N2 half-times in minutes for compartments 1–16 (ZHL-16C).
pub(crate) const N2_HALF_TIMES: [f64; COMPARTMENTS] = [
    5.0, 8.0, 12.5, 18.5, 27.0, 38.3, 54.3, 77.0, 109.0, 146.0, 187.0, 239.0, 305.0, 390.0, 498.0,
    635.0,
];

/// He half-times in minutes for compartments 1–16 (ZHL-16C).
pub(crate) const HE_HALF_TIMES: [f64; COMPARTMENTS] = [
    1.88, 3.02, 4.72, 6.99, 10.21, 14.48, 20.53, 29.11, 41.20, 55.19, 70.69, 90.34, 115.29, 147.42,
    188.24, 240.03,
];

/// N2 'a' coefficients (bar) for ZHL-16C.
const A_N2: [f64; COMPARTMENTS] = [
    1.1696, 1.0000, 0.8618, 0.7562, 0.6200, 0.5043, 0.4410, 0.4000, 0.3750, 0.3500, 0.3295, 0.3065,
    0.2835, 0.2610, 0.2480, 0.2327,
];

/// N2 'b' coefficients (dimensionless) for ZHL-16C.
const B_N2: [f64; COMPARTMENTS] = [
    0.5578, 0.6514, 0.7222, 0.7825, 0.8126, 0.8434, 0.8693, 0.8910, 0.9092, 0.9222, 0.9319, 0.9403,
    0.9477, 0.9544, 0.9602, 0.9653,
];

/// He 'a' coefficients (bar) for ZHL-16C.
const A_HE: [f64; COMPARTMENTS] = [
    1.6189, 1.3830, 1.1919, 1.0458, 0.9220, 0.8205, 0.7305, 0.6502, 0.5950, 0.5545, 0.5333, 0.5189,
    0.5181, 0.5176, 0.5172, 0.5119,
];

/// He 'b' coefficients (dimensionless) for ZHL-16C.
const B_HE: [f64; COMPARTMENTS] = [
    0.4770, 0.5747, 0.6527, 0.7223, 0.7582, 0.7957, 0.8279, 0.8553, 0.8757, 0.8903, 0.8997, 0.9073,
    0.9122, 0.9171, 0.9217, 0.9267,
];

/// Lowest depth (bar above the surface) at which the gf_low anchor may sit.
pub(crate) const GF_LOW_POSITION_MIN_BAR: f64 = 1.0;

// ============================================================================
// Coefficients
// ============================================================================

/// Fraction of the remaining gradient taken up in `seconds` by a compartment
/// with the given half-time.
pub(crate) fn saturation_factor(seconds: f64, half_time_min: f64) -> f64 {
    1.0 - (-seconds / 60.0 * std::f64::consts::LN_2 / half_time_min).exp()
}

/// Inert-gas weighted (a, b) for compartment `ci`.
///
/// An empty compartment falls back to the N2 coefficients.
pub(crate) fn mixed_coefficients(ci: usize, n2: f64, he: f64) -> (f64, f64) {
    let total = n2 + he;
    if total > 1e-10 {
        (
            (A_N2[ci] * n2 + A_HE[ci] * he) / total,
            (B_N2[ci] * n2 + B_HE[ci] * he) / total,
        )
    } else {
        (A_N2[ci], B_N2[ci])
    }
}

// ============================================================================
// Gradient Factors
// ============================================================================

/// Gradient factor settings plus the dive's gf_low anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GradientFactors {
    pub low: f64,
    pub high: f64,
    /// Surface pressure (bar).
    pub surface: f64,
    /// Ambient pressure (bar) at which `low` applies.
    pub low_pressure: f64,
}

impl GradientFactors {
    /// Ambient pressure at which a compartment loaded to `saturation` sits
    /// exactly on its gf_low line.
    pub fn lowest_ceiling(&self, saturation: f64, a: f64, b: f64) -> f64 {
        (b * saturation - self.low * a * b) / ((1.0 - b) * self.low + b)
    }

    /// Tolerated ambient pressure with the gradient factor interpolated
    /// between the gf_low anchor and the surface.
    ///
    /// When the gf_high line is the more restrictive one already at the
    /// anchor, the anchor itself bounds the result and `fallback` is used.
    pub fn tolerated(&self, saturation: f64, a: f64, b: f64, fallback: f64) -> f64 {
        let (gfl, gfh) = (self.low, self.high);
        let (lp, sp) = (self.low_pressure, self.surface);
        if (sp / b + a - sp) * gfh + sp < (lp / b + a - lp) * gfl + lp {
            let numerator = -a * b * (gfh * lp - gfl * sp) - (1.0 - b) * (gfh - gfl) * lp * sp
                + b * (lp - sp) * saturation;
            let denominator =
                -a * b * (gfh - gfl) + (1.0 - b) * (gfl * lp - gfh * sp) + b * (lp - sp);
            numerator / denominator
        } else {
            fallback
        }
    }
}

/// Gradient factor (0 = ambient, 1 = M-value) of a compartment holding
/// `saturation` bar at `ambient` bar.
pub(crate) fn compartment_gf(saturation: f64, ambient: f64, a: f64, b: f64) -> f64 {
    let m_value = a + ambient / b;
    let denom = m_value - ambient;
    if denom > 1e-10 {
        (saturation - ambient) / denom
    } else {
        0.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: f64 = 1.013;

    #[test]
    fn test_saturation_factor_half_time() {
        let f = saturation_factor(5.0 * 60.0, 5.0);
        assert!((f - 0.5).abs() < 1e-12, "one half-time should give 0.5, got {f}");
        assert_eq!(saturation_factor(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_mixed_coefficients() {
        assert_eq!(mixed_coefficients(0, 0.0, 0.0), (A_N2[0], B_N2[0]));
        assert_eq!(mixed_coefficients(3, 1.0, 0.0), (A_N2[3], B_N2[3]));
        let (a, b) = mixed_coefficients(3, 1.0, 1.0);
        assert!((a - (A_N2[3] + A_HE[3]) / 2.0).abs() < 1e-12);
        assert!((b - (B_N2[3] + B_HE[3]) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_tolerated_gf_100_is_m_value_line() {
        let gf = GradientFactors {
            low: 1.0,
            high: 1.0,
            surface: SURFACE,
            low_pressure: 3.0,
        };
        let (a, b) = mixed_coefficients(4, 2.5, 0.0);
        let tol = gf.tolerated(2.5, a, b, 0.0);
        // Plain Bühlmann: P_tol = (P_t - a) * b
        let expected = (2.5 - a) * b;
        assert!((tol - expected).abs() < 1e-9, "expected {expected}, got {tol}");
    }

    #[test]
    fn test_lower_gf_is_more_conservative() {
        let (a, b) = mixed_coefficients(2, 2.8, 0.0);
        let lenient = GradientFactors {
            low: 0.9,
            high: 0.9,
            surface: SURFACE,
            low_pressure: 3.0,
        };
        let strict = GradientFactors {
            low: 0.3,
            high: 0.7,
            ..lenient
        };
        assert!(strict.tolerated(2.8, a, b, 0.0) > lenient.tolerated(2.8, a, b, 0.0));
    }

    #[test]
    fn test_compartment_gf_at_equilibrium() {
        let sat = (SURFACE - 0.0627) * 0.781;
        let (a, b) = mixed_coefficients(0, sat, 0.0);
        assert!(compartment_gf(sat, SURFACE, a, b) < 0.0);
        let (a, b) = mixed_coefficients(0, 2.0, 0.0);
        let at_m_value = a + SURFACE / b;
        assert!((compartment_gf(at_m_value, SURFACE, a, b) - 1.0).abs() < 1e-12);
    }
}
