//! Gas mixes and everything derived from them: partial pressures at depth,
//! real-gas cylinder volumes, MOD and density.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Cylinder, Dive, DiveComputer, DiveMode, Event, EVENT_GASCHANGE, EVENT_MODECHANGE};
use crate::prefs::ProfilePrefs;
use crate::units::SurfaceConditions;

/// Permille of oxygen in air.
pub const O2_IN_AIR: i32 = 209;
/// Permille of nitrogen in air.
pub const N2_IN_AIR: i32 = 781;

/// Densities in g/ℓ at one bar.
pub const O2_DENSITY: f64 = 1.331;
pub const N2_DENSITY: f64 = 1.165;
pub const HE_DENSITY: f64 = 0.166;

/// Oxygen and helium content in permille. An oxygen value of zero means air.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasMix {
    pub o2_permille: i32,
    pub he_permille: i32,
}

impl GasMix {
    pub const AIR: GasMix = GasMix {
        o2_permille: O2_IN_AIR,
        he_permille: 0,
    };

    pub fn new(o2_permille: i32, he_permille: i32) -> Self {
        GasMix {
            o2_permille,
            he_permille,
        }
    }

    pub fn o2(&self) -> i32 {
        if self.o2_permille > 0 {
            self.o2_permille
        } else {
            O2_IN_AIR
        }
    }

    pub fn he(&self) -> i32 {
        self.he_permille
    }

    pub fn n2(&self) -> i32 {
        1000 - self.o2() - self.he()
    }

    pub fn is_air(&self) -> bool {
        self.he_permille == 0 && (self.o2_permille == 0 || (self.o2() - O2_IN_AIR).abs() <= 1)
    }

    pub fn same_as(&self, other: &GasMix) -> bool {
        self.o2() == other.o2() && self.he() == other.he()
    }

    /// Decode the mix carried in a gas change event: O2 percent in the low
    /// 16 bits, He percent in the high 16 bits.
    pub fn from_event_value(value: i32) -> Self {
        GasMix {
            o2_permille: (value & 0xffff) * 10,
            he_permille: ((value >> 16) & 0xffff) * 10,
        }
    }

    /// Compressibility factor Z of the mix at `bar`, from a per-gas virial fit.
    pub fn compressibility(&self, bar: f64) -> f64 {
        const O2_COEFFICIENTS: [f64; 3] = [-7.180_920_737_03e-4, 2.818_525_728_08e-6, -1.502_906_204_92e-9];
        const N2_COEFFICIENTS: [f64; 3] = [-2.192_603_532_92e-4, 2.928_448_455_32e-6, -2.076_134_820_75e-9];
        const HE_COEFFICIENTS: [f64; 3] = [4.873_200_264_68e-4, -8.836_329_210_53e-8, 5.333_045_436_46e-11];

        let virial = |c: &[f64; 3]| c[0] * bar + c[1] * bar * bar + c[2] * bar * bar * bar;
        let o2 = self.o2() as f64 / 1000.0;
        let he = self.he() as f64 / 1000.0;
        let n2 = 1.0 - o2 - he;
        virial(&O2_COEFFICIENTS) * o2 + virial(&HE_COEFFICIENTS) * he + virial(&N2_COEFFICIENTS) * n2 + 1.0
    }

    /// Maximum operating depth for a pO2 limit, rounded to `roundto_mm`.
    pub fn mod_depth(&self, po2_limit_mbar: i32, surface: &SurfaceConditions, roundto_mm: i32) -> i32 {
        let depth = surface.mbar_to_depth(po2_limit_mbar * 1000 / self.o2());
        let roundto = roundto_mm.max(1);
        (depth as f64 / roundto as f64).round() as i32 * roundto
    }

    /// Density in g/ℓ at an absolute pressure.
    pub fn density(&self, mbar: i32) -> f64 {
        (self.o2() as f64 * O2_DENSITY + self.he() as f64 * HE_DENSITY + self.n2() as f64 * N2_DENSITY)
            / 1000.0
            * mbar as f64
            / 1000.0
    }
}

impl fmt::Display for GasMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (o2, he) = ((self.o2() + 5) / 10, (self.he() + 5) / 10);
        if self.is_air() {
            write!(f, "air")
        } else if he == 0 && o2 == 100 {
            write!(f, "oxygen")
        } else if he == 0 {
            write!(f, "EAN{o2}")
        } else {
            write!(f, "{o2}/{he}")
        }
    }
}

/// Inspired partial pressures in bar.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GasPressures {
    pub o2: f64,
    pub he: f64,
    pub n2: f64,
}

/// Partial pressures breathed at `amb_bar` on `mix`.
///
/// `po2_bar` is the loop oxygen pressure for rebreathers; when it is zero a
/// rebreather falls back to open-circuit fractions.
pub fn fill_pressures(
    amb_bar: f64,
    mix: &GasMix,
    po2_bar: f64,
    mode: DiveMode,
    prefs: &ProfilePrefs,
) -> GasPressures {
    let fo2 = mix.o2() as f64 / 1000.0;
    let fhe = mix.he() as f64 / 1000.0;
    match mode {
        DiveMode::ClosedCircuit | DiveMode::PassiveSemiClosed if po2_bar > 0.0 => {
            if po2_bar >= amb_bar {
                GasPressures {
                    o2: amb_bar,
                    he: 0.0,
                    n2: 0.0,
                }
            } else if mix.o2() == 1000 {
                GasPressures {
                    o2: po2_bar,
                    he: 0.0,
                    n2: 0.0,
                }
            } else {
                let he = (amb_bar - po2_bar) * fhe / (1.0 - fo2);
                GasPressures {
                    o2: po2_bar,
                    he,
                    n2: amb_bar - po2_bar - he,
                }
            }
        }
        DiveMode::PassiveSemiClosed => {
            // Steady state loop: metabolic O2 use diluted by the dumped fraction.
            let dump = prefs.gas.bottom_sac_ml_min as f64 * prefs.gas.pscr_ratio as f64 / 1000.0;
            let drop = if dump > 0.0 {
                (1.0 - fo2) * prefs.gas.o2_consumption_ml_min as f64 / dump
            } else {
                0.0
            };
            let o2 = (fo2 * amb_bar - drop).max(0.0);
            if mix.o2() == 1000 {
                GasPressures {
                    o2,
                    he: 0.0,
                    n2: 0.0,
                }
            } else {
                GasPressures {
                    o2,
                    he: (amb_bar - o2) * fhe / (1.0 - fo2),
                    n2: (amb_bar - o2) * (1.0 - fo2 - fhe) / (1.0 - fo2),
                }
            }
        }
        DiveMode::OpenCircuit | DiveMode::ClosedCircuit | DiveMode::Freedive => GasPressures {
            o2: fo2 * amb_bar,
            he: fhe * amb_bar,
            n2: (1.0 - fo2 - fhe) * amb_bar,
        },
    }
}

/// Surface-equivalent gas volume (ml) in a cylinder at `mbar`.
pub fn gas_volume(cylinder: &Cylinder, mbar: i32) -> i32 {
    let bar = mbar as f64 / 1000.0;
    let z = cylinder.gasmix.compressibility(bar);
    (cylinder.size_ml as f64 * (bar / 1.013_25) / z).round() as i32
}

/// Index of the cylinder whose mix is closest to `mix`.
pub fn find_best_gasmix_match(mix: &GasMix, cylinders: &[Cylinder]) -> Option<usize> {
    cylinders
        .iter()
        .enumerate()
        .min_by_key(|(_, cyl)| {
            (cyl.gasmix.o2() - mix.o2()).abs() + (cyl.gasmix.he() - mix.he()).abs()
        })
        .map(|(i, _)| i)
}

/// Cylinder a gas change event switches to.
pub fn event_cylinder(dive: &Dive, ev: &Event) -> usize {
    if let Some(index) = ev.cylinder {
        return index;
    }
    log::warn!(
        "gas change at {}s has no cylinder index, matching by mix",
        ev.time_sec
    );
    find_best_gasmix_match(&GasMix::from_event_value(ev.value), &dive.cylinders).unwrap_or(0)
}

fn event_gasmix(dive: &Dive, ev: &Event) -> GasMix {
    match ev.cylinder {
        Some(index) => match dive.cylinders.get(index) {
            Some(cyl) => cyl.gasmix,
            None => {
                log::warn!(
                    "gas change at {}s names unknown cylinder {}",
                    ev.time_sec,
                    index
                );
                GasMix::from_event_value(ev.value)
            }
        },
        None => GasMix::from_event_value(ev.value),
    }
}

/// Walks gas change events forward in time. Queries must be non-decreasing.
pub struct GasTracker<'a> {
    dive: &'a Dive,
    events: Vec<&'a Event>,
    next: usize,
    current: GasMix,
}

impl<'a> GasTracker<'a> {
    pub fn new(dive: &'a Dive, dc: &'a DiveComputer, first_cylinder: usize) -> Self {
        let current = dive
            .cylinders
            .get(first_cylinder)
            .map(|cyl| cyl.gasmix)
            .unwrap_or(GasMix::AIR);
        GasTracker {
            dive,
            events: dc.events_named(EVENT_GASCHANGE).collect(),
            next: 0,
            current,
        }
    }

    pub fn at(&mut self, time_sec: i32) -> GasMix {
        while let Some(ev) = self.events.get(self.next) {
            if ev.time_sec > time_sec {
                break;
            }
            self.current = event_gasmix(self.dive, ev);
            self.next += 1;
        }
        self.current
    }
}

/// Walks "modechange" events forward in time.
pub struct ModeTracker<'a> {
    events: Vec<&'a Event>,
    next: usize,
    current: DiveMode,
}

impl<'a> ModeTracker<'a> {
    pub fn new(dc: &'a DiveComputer, initial: DiveMode) -> Self {
        ModeTracker {
            events: dc.events_named(EVENT_MODECHANGE).collect(),
            next: 0,
            current: initial,
        }
    }

    pub fn at(&mut self, time_sec: i32) -> DiveMode {
        while let Some(ev) = self.events.get(self.next) {
            if ev.time_sec > time_sec {
                break;
            }
            match DiveMode::from_event_value(ev.value) {
                Some(mode) => self.current = mode,
                None => log::warn!("ignoring unknown dive mode {} at {}s", ev.value, ev.time_sec),
            }
            self.next += 1;
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cylinder(o2: i32, he: i32, size_ml: i32) -> Cylinder {
        Cylinder {
            gasmix: GasMix::new(o2, he),
            size_ml,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_oxygen_means_air() {
        let mix = GasMix::default();
        assert_eq!(mix.o2(), O2_IN_AIR);
        assert!(mix.is_air());
        assert!(mix.same_as(&GasMix::AIR));
        assert!(!GasMix::new(320, 0).is_air());
    }

    #[test]
    fn test_mix_names() {
        assert_eq!(GasMix::AIR.to_string(), "air");
        assert_eq!(GasMix::new(500, 0).to_string(), "EAN50");
        assert_eq!(GasMix::new(1000, 0).to_string(), "oxygen");
        assert_eq!(GasMix::new(210, 350).to_string(), "21/35");
    }

    #[test]
    fn test_event_value_decoding() {
        let mix = GasMix::from_event_value(21 | (35 << 16));
        assert_eq!(mix, GasMix::new(210, 350));
    }

    #[test]
    fn test_open_circuit_partial_pressures() {
        let prefs = ProfilePrefs::default();
        let pp = fill_pressures(2.8, &GasMix::AIR, 0.0, DiveMode::OpenCircuit, &prefs);
        assert!((pp.o2 - 0.5852).abs() < 1e-9);
        assert!((pp.o2 + pp.n2 + pp.he - 2.8).abs() < 1e-9);
    }

    #[test]
    fn test_closed_circuit_uses_setpoint() {
        let prefs = ProfilePrefs::default();
        let diluent = GasMix::new(210, 350);
        let pp = fill_pressures(4.0, &diluent, 1.3, DiveMode::ClosedCircuit, &prefs);
        assert_eq!(pp.o2, 1.3);
        assert!((pp.he - 2.7 * 0.35 / 0.79).abs() < 1e-9);
        assert!((pp.o2 + pp.he + pp.n2 - 4.0).abs() < 1e-9);

        let shallow = fill_pressures(1.1, &diluent, 1.3, DiveMode::ClosedCircuit, &prefs);
        assert_eq!(shallow.o2, 1.1);
        assert_eq!(shallow.n2, 0.0);
    }

    #[test]
    fn test_closed_circuit_without_po2_falls_back() {
        let prefs = ProfilePrefs::default();
        let cc = fill_pressures(2.0, &GasMix::AIR, 0.0, DiveMode::ClosedCircuit, &prefs);
        let oc = fill_pressures(2.0, &GasMix::AIR, 0.0, DiveMode::OpenCircuit, &prefs);
        assert_eq!(cc, oc);
    }

    #[test]
    fn test_pscr_loop_is_leaner_than_supply() {
        let prefs = ProfilePrefs::default();
        let mix = GasMix::new(400, 0);
        let pp = fill_pressures(3.0, &mix, 0.0, DiveMode::PassiveSemiClosed, &prefs);
        assert!(pp.o2 < 1.2);
        assert!(pp.o2 > 0.0);
        assert!((pp.o2 + pp.n2 - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_pscr_loop_follows_bottom_sac() {
        let mut prefs = ProfilePrefs::default();
        let mix = GasMix::new(400, 0);
        let base = fill_pressures(3.0, &mix, 0.0, DiveMode::PassiveSemiClosed, &prefs);
        prefs.gas.bottom_sac_ml_min *= 2;
        let richer = fill_pressures(3.0, &mix, 0.0, DiveMode::PassiveSemiClosed, &prefs);
        // More gas through the loop means less O2 depletion.
        assert!(richer.o2 > base.o2);
    }

    #[test]
    fn test_compressibility_near_ideal_at_surface() {
        let z = GasMix::AIR.compressibility(1.0);
        assert!((z - 1.0).abs() < 0.001);
        // Air is more compressible than ideal around 200 bar.
        assert!(GasMix::AIR.compressibility(200.0) > 1.0 - 0.05);
    }

    #[test]
    fn test_gas_volume_scales_with_size() {
        let small = gas_volume(&cylinder(0, 0, 10_000), 200_000);
        let big = gas_volume(&cylinder(0, 0, 15_000), 200_000);
        assert!(small > 1_800_000 && small < 2_100_000, "got {small}");
        assert!((big as f64 / small as f64 - 1.5).abs() < 0.001);
        assert_eq!(gas_volume(&cylinder(0, 0, 0), 200_000), 0);
    }

    #[test]
    fn test_mod_and_density() {
        let surface = SurfaceConditions::default();
        let ean32 = GasMix::new(320, 0);
        let mod_mm = ean32.mod_depth(1_400, &surface, 1);
        assert!((mod_mm - 33_200).abs() < 300, "got {mod_mm}");
        let density = GasMix::AIR.density(1_000);
        assert!((density - 1.1982).abs() < 0.01, "got {density}");
    }

    #[test]
    fn test_gas_tracker_follows_events() {
        let dive = Dive {
            cylinders: vec![cylinder(0, 0, 12_000), cylinder(500, 0, 7_000)],
            ..Default::default()
        };
        let dc = DiveComputer {
            events: vec![Event {
                name: EVENT_GASCHANGE.to_string(),
                time_sec: 900,
                value: 50,
                cylinder: Some(1),
            }],
            ..Default::default()
        };
        let mut tracker = GasTracker::new(&dive, &dc, 0);
        assert!(tracker.at(0).is_air());
        assert!(tracker.at(899).is_air());
        assert_eq!(tracker.at(900).o2(), 500);
        assert_eq!(tracker.at(2_000).o2(), 500);
    }

    #[test]
    fn test_event_cylinder_matches_by_mix() {
        let dive = Dive {
            cylinders: vec![cylinder(0, 0, 12_000), cylinder(500, 0, 7_000)],
            ..Default::default()
        };
        let ev = Event {
            name: EVENT_GASCHANGE.to_string(),
            time_sec: 600,
            value: 50,
            cylinder: None,
        };
        assert_eq!(event_cylinder(&dive, &ev), 1);
    }

    #[test]
    fn test_mode_tracker() {
        let dc = DiveComputer {
            events: vec![Event {
                name: EVENT_MODECHANGE.to_string(),
                time_sec: 300,
                value: 0,
                cylinder: None,
            }],
            ..Default::default()
        };
        let mut modes = ModeTracker::new(&dc, DiveMode::ClosedCircuit);
        assert_eq!(modes.at(10), DiveMode::ClosedCircuit);
        assert_eq!(modes.at(300), DiveMode::OpenCircuit);
    }
}
