//! Oxygen sensor handling and per-entry gas physiology.

use crate::context::AnalysisContext;
use crate::gas::{fill_pressures, HE_DENSITY, N2_DENSITY, N2_IN_AIR, O2_DENSITY, O2_IN_AIR};
use crate::models::{DiveMode, MAX_O2_SENSORS};
use crate::prefs::ProfilePrefs;
use crate::series::{DenseEntry, DenseSeries, DiveType};

/// Sensors further apart than this (mbar) are outvoted.
pub const SENSOR_VOTE_LIMIT_MBAR: i32 = 100;

/// Loop pO2 (mbar) from up to three oxygen sensors.
///
/// With no valid reading the entry's current value is kept. One reading is
/// used as is and two are averaged. With three, an extreme reading that
/// differs from the middle one by the vote limit or more is discarded
/// before averaging.
pub fn calculate_ccr_po2(entry: &DenseEntry, sensor_count: usize) -> i32 {
    let readings: Vec<i32> = entry
        .o2_sensor_mbar
        .iter()
        .take(sensor_count.min(MAX_O2_SENSORS))
        .copied()
        .filter(|mbar| *mbar != 0)
        .collect();

    match readings.as_slice() {
        [] => entry.o2_pressure_mbar,
        [only] => *only,
        [a, b] => (a + b) / 2,
        [a, b, c] => {
            let sum = a + b + c;
            let max = *a.max(b).max(c);
            let min = *a.min(b).min(c);
            let mid = sum - max - min;
            let upper_ok = max - mid < SENSOR_VOTE_LIMIT_MBAR;
            let lower_ok = mid - min < SENSOR_VOTE_LIMIT_MBAR;
            match (upper_ok, lower_ok) {
                (true, false) => (sum - min) / 2,
                (false, true) => (sum - max) / 2,
                (true, true) | (false, false) => sum / 3,
            }
        }
        _ => 0,
    }
}

/// Forward-fill missing sensor readings and derive the loop pO2, never
/// above ambient pressure. Open circuit entries get a pO2 of zero.
pub fn fill_o2_values(ctx: &AnalysisContext, series: &mut DenseSeries) {
    if !ctx.uses_o2_sensors() {
        for entry in series.entries.iter_mut() {
            entry.o2_pressure_mbar = 0;
        }
        return;
    }

    let sensor_count = (ctx.dc.o2_sensor_count as usize).min(MAX_O2_SENSORS);
    let mut last_sensor = [0; MAX_O2_SENSORS];
    for (i, entry) in series.entries.iter_mut().enumerate() {
        for j in 0..sensor_count {
            if i == 0 || entry.o2_sensor_mbar[j] != 0 {
                last_sensor[j] = entry.o2_sensor_mbar[j];
            } else {
                entry.o2_sensor_mbar[j] = last_sensor[j];
            }
        }
        let ambient_mbar = ctx.surface.depth_to_mbar(entry.depth_mm);
        entry.o2_pressure_mbar = calculate_ccr_po2(entry, sensor_count).min(ambient_mbar);
    }
}

/// Partial pressures, equivalent depths, MOD and density for every entry.
pub fn calculate_gas_information(ctx: &AnalysisContext, series: &mut DenseSeries) {
    let mut gases = ctx.gas_tracker();
    let mut modes = ctx.mode_tracker();
    let surface = &ctx.surface;
    let mod_po2_mbar = (ctx.prefs.mod_po2_bar * 1000.0).round() as i32;
    let air_density = (O2_IN_AIR as f64 * O2_DENSITY + N2_IN_AIR as f64 * N2_DENSITY) / 1000.0;

    for entry in series.entries.iter_mut().skip(1) {
        let mix = gases.at(entry.time_sec);
        let mode = modes.at(entry.time_sec);
        entry.gasmix = mix;
        entry.divemode = mode;

        let amb = surface.depth_to_bar(entry.depth_mm);
        let depth_mbar = surface.depth_to_mbar_f(entry.depth_mm);
        let loop_po2 = match mode {
            DiveMode::OpenCircuit | DiveMode::Freedive => 0.0,
            DiveMode::ClosedCircuit | DiveMode::PassiveSemiClosed => entry.o2_pressure_mbar as f64 / 1000.0,
        };
        let pp = fill_pressures(amb, &mix, loop_po2, mode, ctx.prefs);
        entry.pressures = pp;

        let fn2 = (1000.0 * pp.n2 / amb) as i32;
        let fhe = (1000.0 * pp.he / amb) as i32;

        if ctx.divemode == DiveMode::PassiveSemiClosed {
            entry.scr_oc_po2_mbar = (depth_mbar * mix.o2() as f64 / 1000.0).round() as i32;
        }

        let to_depth = |mbar: f64| surface.mbar_to_depth(mbar.round() as i32);
        entry.mod_mm = mix.mod_depth(mod_po2_mbar, surface, 1).max(0);
        entry.end_mm = to_depth(depth_mbar * (1000 - fhe) as f64 / 1000.0).max(0);
        entry.ead_mm = to_depth(depth_mbar * fn2 as f64 / N2_IN_AIR as f64).max(0);
        let breathed_density =
            (pp.o2 * O2_DENSITY + pp.n2 * N2_DENSITY + pp.he * HE_DENSITY) / amb;
        entry.eadd_mm = to_depth(depth_mbar * breathed_density / air_density).max(0);
        entry.density = mix.density(depth_mbar.round() as i32);
    }
}

/// Classify the dive by the richest mix actually breathed.
pub fn classify_dive_type(ctx: &AnalysisContext, series: &DenseSeries) -> DiveType {
    if ctx.divemode == DiveMode::Freedive {
        return DiveType::Freedive;
    }
    let entries = series.entries.iter().skip(1);
    let mut dive_type = DiveType::Air;
    for entry in entries {
        if entry.gasmix.he() > 0 {
            return DiveType::Trimix;
        }
        if entry.gasmix.o2() > O2_IN_AIR + 1 {
            dive_type = DiveType::Nitrox;
        }
    }
    dive_type
}

/// Largest partial pressure (bar) among the overlays the caller asked for.
pub fn max_partial_pressure(series: &DenseSeries, prefs: &ProfilePrefs) -> f64 {
    let graphs = prefs.pp_graphs;
    series
        .entries
        .iter()
        .map(|entry| {
            let mut pp: f64 = 0.0;
            if graphs.po2 {
                pp = pp.max(entry.pressures.o2);
            }
            if graphs.pn2 {
                pp = pp.max(entry.pressures.n2);
            }
            if graphs.phe {
                pp = pp.max(entry.pressures.he);
            }
            pp
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::GasMix;
    use crate::models::{Cylinder, CylinderUse, Dive, DiveComputer, Event, EVENT_GASCHANGE};
    use crate::prefs::PartialPressureGraphs;

    fn with_sensors(readings: [i32; 3], previous: i32) -> DenseEntry {
        DenseEntry {
            o2_sensor_mbar: readings,
            o2_pressure_mbar: previous,
            ..Default::default()
        }
    }

    #[test]
    fn test_sensor_voting() {
        assert_eq!(calculate_ccr_po2(&with_sensors([0, 0, 0], 1_200), 3), 1_200);
        assert_eq!(calculate_ccr_po2(&with_sensors([1_300, 0, 0], 0), 3), 1_300);
        assert_eq!(calculate_ccr_po2(&with_sensors([1_200, 1_300, 0], 0), 3), 1_250);
        // All three agree.
        assert_eq!(calculate_ccr_po2(&with_sensors([1_200, 1_250, 1_290], 0), 3), 1_246);
        // High sensor drifts away.
        assert_eq!(calculate_ccr_po2(&with_sensors([1_200, 1_220, 1_600], 0), 3), 1_210);
        // Low sensor is failing.
        assert_eq!(calculate_ccr_po2(&with_sensors([700, 1_300, 1_320], 0), 3), 1_310);
        // Only the configured number of sensors is read.
        assert_eq!(calculate_ccr_po2(&with_sensors([1_200, 1_300, 900], 0), 2), 1_250);
    }

    fn ccr_dive() -> Dive {
        Dive {
            cylinders: vec![
                Cylinder {
                    gasmix: GasMix::new(1000, 0),
                    usage: CylinderUse::Oxygen,
                    ..Default::default()
                },
                Cylinder {
                    gasmix: GasMix::new(210, 350),
                    usage: CylinderUse::Diluent,
                    ..Default::default()
                },
            ],
            computers: vec![DiveComputer {
                divemode: DiveMode::ClosedCircuit,
                o2_sensor_count: 2,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_fill_o2_values_forward_fills_and_clamps() {
        let dive = ccr_dive();
        let prefs = ProfilePrefs::default();
        let ctx = AnalysisContext::new(&dive, 0, &prefs).expect("context");
        let mut series = DenseSeries {
            entries: vec![
                DenseEntry {
                    o2_sensor_mbar: [1_300, 1_320, 0],
                    depth_mm: 20_000,
                    ..Default::default()
                },
                DenseEntry {
                    o2_sensor_mbar: [0, 1_280, 0],
                    depth_mm: 20_000,
                    ..Default::default()
                },
                DenseEntry {
                    o2_sensor_mbar: [1_300, 1_300, 0],
                    depth_mm: 0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        fill_o2_values(&ctx, &mut series);
        assert_eq!(series.entries[1].o2_sensor_mbar[0], 1_300);
        assert_eq!(series.entries[1].o2_pressure_mbar, 1_290);
        // At the surface the loop cannot exceed ambient.
        assert_eq!(series.entries[2].o2_pressure_mbar, 1_013);
    }

    #[test]
    fn test_gas_information_on_air() {
        let dive = Dive {
            cylinders: vec![Cylinder::default()],
            computers: vec![DiveComputer::default()],
            ..Default::default()
        };
        let prefs = ProfilePrefs::default();
        let ctx = AnalysisContext::new(&dive, 0, &prefs).expect("context");
        let mut series = DenseSeries {
            entries: vec![
                DenseEntry::default(),
                DenseEntry {
                    depth_mm: 30_000,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        calculate_gas_information(&ctx, &mut series);
        let entry = &series.entries[1];
        let amb = ctx.surface.depth_to_bar(30_000);
        assert!((entry.pressures.o2 - 0.209 * amb).abs() < 1e-9);
        // Without helium END is the actual depth.
        assert!((entry.end_mm - 30_000).abs() < 50, "end {}", entry.end_mm);
        // The mix counts argon as nitrogen, so EAD and EADD read slightly deep.
        assert!((30_000..30_600).contains(&entry.ead_mm), "ead {}", entry.ead_mm);
        assert!((30_000..30_600).contains(&entry.eadd_mm), "eadd {}", entry.eadd_mm);
        assert!(entry.mod_mm > 60_000);
        assert!(entry.density > 4.0 && entry.density < 5.0);
        assert_eq!(classify_dive_type(&ctx, &series), DiveType::Air);
    }

    #[test]
    fn test_gas_switch_changes_partial_pressures() {
        let dive = Dive {
            cylinders: vec![
                Cylinder::default(),
                Cylinder {
                    gasmix: GasMix::new(500, 0),
                    ..Default::default()
                },
            ],
            computers: vec![DiveComputer {
                events: vec![Event {
                    name: EVENT_GASCHANGE.to_string(),
                    time_sec: 900,
                    value: 50,
                    cylinder: Some(1),
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let prefs = ProfilePrefs {
            pp_graphs: PartialPressureGraphs {
                po2: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let ctx = AnalysisContext::new(&dive, 0, &prefs).expect("context");
        let mut series = DenseSeries {
            entries: [0, 890, 900, 910]
                .iter()
                .map(|t| DenseEntry {
                    time_sec: *t,
                    depth_mm: 15_000,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        calculate_gas_information(&ctx, &mut series);
        assert!(series.entries[2].pressures.o2 > 2.0 * series.entries[1].pressures.o2);
        assert!(series.entries[2].pressures.n2 < series.entries[1].pressures.n2);
        assert!(series.entries[2].ead_mm < 15_000);
        assert_eq!(classify_dive_type(&ctx, &series), DiveType::Nitrox);
        let max_pp = max_partial_pressure(&series, &prefs);
        assert!((max_pp - series.entries[3].pressures.o2).abs() < 1e-12);
    }
}
