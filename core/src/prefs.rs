//! Analysis preferences handed in by the caller.

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, ProfileResult};
use crate::units::DisplayUnits;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoModel {
    /// ZHL-16C with gradient factors.
    #[default]
    Buhlmann,
    /// Varying permeability model with Boyle's law compensation.
    Vpmb,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoPrefs {
    pub model: DecoModel,
    pub gf_low: f64,
    pub gf_high: f64,
    /// 0 (least) to 4 (most conservative).
    pub vpmb_conservatism: u8,
    /// Report ceilings on the 3 m stop grid instead of exact depths.
    pub calc_ceiling_3m: bool,
    pub calc_ndl_tts: bool,
    pub last_deco_stop_mm: i32,
    pub satmult: f64,
    pub desatmult: f64,
    /// N2 gain in the leading tissue tolerated per unit of He loss.
    pub icd_ratio: f64,
}

impl Default for DecoPrefs {
    fn default() -> Self {
        DecoPrefs {
            model: DecoModel::Buhlmann,
            gf_low: 0.30,
            gf_high: 0.75,
            vpmb_conservatism: 3,
            calc_ceiling_3m: false,
            calc_ndl_tts: true,
            last_deco_stop_mm: 3_000,
            satmult: 1.0,
            desatmult: 1.0,
            icd_ratio: 0.2,
        }
    }
}

/// Ascent rates (mm/min) by depth band relative to the running mean depth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AscentRates {
    /// Deeper than 75% of the mean depth.
    pub rate_75: i32,
    /// Between 50% and 75% of the mean depth.
    pub rate_50: i32,
    /// Shallower than 50% of the mean depth but deeper than 6 m.
    pub rate_stops: i32,
    pub rate_last_6m: i32,
}

impl Default for AscentRates {
    fn default() -> Self {
        AscentRates {
            rate_75: 9_000,
            rate_50: 6_000,
            rate_stops: 6_000,
            rate_last_6m: 1_000,
        }
    }
}

impl AscentRates {
    /// Ascent speed in mm/s at `depth_mm` for a dive averaging `avg_depth_mm`.
    pub fn velocity(&self, depth_mm: i32, avg_depth_mm: i32) -> i32 {
        let per_min = if depth_mm * 4 > avg_depth_mm * 3 {
            self.rate_75
        } else if depth_mm * 2 > avg_depth_mm {
            self.rate_50
        } else if depth_mm > 6_000 {
            self.rate_stops
        } else {
            self.rate_last_6m
        };
        (per_min / 60).max(1)
    }
}

/// Gas planning figures, used for the passive semi-closed loop estimate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasPrefs {
    pub bottom_sac_ml_min: i32,
    pub o2_consumption_ml_min: i32,
    /// Dump ratio in permille (100 = 1:10).
    pub pscr_ratio: i32,
}

impl Default for GasPrefs {
    fn default() -> Self {
        GasPrefs {
            bottom_sac_ml_min: 20_000,
            o2_consumption_ml_min: 720,
            pscr_ratio: 100,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialPressureGraphs {
    pub po2: bool,
    pub pn2: bool,
    pub phe: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePrefs {
    pub zoomed_plot: bool,
    pub deco: DecoPrefs,
    pub ascent: AscentRates,
    pub gas: GasPrefs,
    pub mod_po2_bar: f64,
    pub pp_graphs: PartialPressureGraphs,
    pub show_sac: bool,
    pub show_mod: bool,
    pub show_ead: bool,
    pub hr_graph: bool,
    pub deco_info: bool,
    pub calc_all_tissues: bool,
    pub units: DisplayUnits,
}

impl Default for ProfilePrefs {
    fn default() -> Self {
        ProfilePrefs {
            zoomed_plot: false,
            deco: DecoPrefs::default(),
            ascent: AscentRates::default(),
            gas: GasPrefs::default(),
            mod_po2_bar: 1.6,
            pp_graphs: PartialPressureGraphs::default(),
            show_sac: false,
            show_mod: false,
            show_ead: false,
            hr_graph: false,
            deco_info: true,
            calc_all_tissues: false,
            units: DisplayUnits::default(),
        }
    }
}

impl ProfilePrefs {
    /// Parse and validate preferences; missing keys take their defaults.
    pub fn from_json(json: &str) -> ProfileResult<Self> {
        let prefs: ProfilePrefs = serde_json::from_str(json)?;
        prefs.validate()?;
        Ok(prefs)
    }

    pub fn validate(&self) -> ProfileResult<()> {
        let deco = &self.deco;
        if !(0.0..=1.5).contains(&deco.gf_low) || !(0.0..=1.5).contains(&deco.gf_high) || deco.gf_high <= 0.0 {
            return Err(ProfileError::InvalidPrefs(format!(
                "gradient factors {}/{} out of range",
                deco.gf_low, deco.gf_high
            )));
        }
        if deco.gf_low > deco.gf_high {
            return Err(ProfileError::InvalidPrefs(
                "gf_low must not exceed gf_high".to_string(),
            ));
        }
        if deco.vpmb_conservatism > 4 {
            return Err(ProfileError::InvalidPrefs(format!(
                "VPM-B conservatism {} out of range 0..=4",
                deco.vpmb_conservatism
            )));
        }
        let rates = &self.ascent;
        if [rates.rate_75, rates.rate_50, rates.rate_stops, rates.rate_last_6m]
            .iter()
            .any(|r| *r <= 0)
        {
            return Err(ProfileError::InvalidPrefs(
                "ascent rates must be positive".to_string(),
            ));
        }
        if self.mod_po2_bar <= 0.0 {
            return Err(ProfileError::InvalidPrefs(
                "MOD pO2 must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn wants_ndl_tts(&self) -> bool {
        self.deco.calc_ndl_tts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ProfilePrefs::default().validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let prefs = ProfilePrefs::from_json(
            r#"{"zoomed_plot": true, "deco": {"model": "Vpmb", "vpmb_conservatism": 1}}"#,
        )
        .expect("prefs should parse");
        assert!(prefs.zoomed_plot);
        assert_eq!(prefs.deco.model, DecoModel::Vpmb);
        assert_eq!(prefs.deco.vpmb_conservatism, 1);
        assert_eq!(prefs.deco.gf_high, 0.75);
        assert_eq!(prefs.ascent, AscentRates::default());
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        let err = ProfilePrefs::from_json(r#"{"deco": {"gf_low": 0.9, "gf_high": 0.5}}"#)
            .unwrap_err();
        assert!(matches!(err, ProfileError::InvalidPrefs(_)));

        let err = ProfilePrefs::from_json(r#"{"deco": {"vpmb_conservatism": 7}}"#).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidPrefs(_)));

        let err = ProfilePrefs::from_json("{").unwrap_err();
        assert!(matches!(err, ProfileError::Json(_)));
    }

    #[test]
    fn test_gas_prefs_ignore_planner_only_keys() {
        let prefs = ProfilePrefs::from_json(
            r#"{"gas": {"bottom_sac_ml_min": 15000, "deco_sac_ml_min": 12000}}"#,
        )
        .expect("prefs should parse");
        assert_eq!(
            prefs.gas,
            GasPrefs {
                bottom_sac_ml_min: 15_000,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_ascent_velocity_bands() {
        let rates = AscentRates::default();
        // Deep relative to the mean depth: fastest band.
        assert_eq!(rates.velocity(30_000, 30_000), 150);
        assert_eq!(rates.velocity(20_000, 30_000), 100);
        assert_eq!(rates.velocity(10_000, 30_000), 100);
        assert_eq!(rates.velocity(5_000, 30_000), 16);
    }
}
