//! Momentary surface air consumption.

use crate::context::AnalysisContext;
use crate::gas::{gas_volume, GasMix};
use crate::models::{Cylinder, MAX_CYLINDERS};
use crate::series::{DenseEntry, DenseSeries};
use crate::units::{SurfaceConditions, SURFACE_THRESHOLD_MM};

/// How far back from an entry the window may reach (seconds).
const WINDOW_BEFORE_SEC: i32 = 30;
/// How far past the window start it may reach (seconds).
const WINDOW_LENGTH_SEC: i32 = 60;

/// Bit set of cylinder indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CylinderSet(u32);

impl CylinderSet {
    fn matching(mix: &GasMix, cylinders: &[Cylinder]) -> Self {
        let bits = cylinders
            .iter()
            .take(MAX_CYLINDERS)
            .enumerate()
            .filter(|(_, cyl)| cyl.gasmix.same_as(mix))
            .fold(0, |bits, (i, _)| bits | 1 << i);
        CylinderSet(bits)
    }

    fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_CYLINDERS).filter(move |i| self.0 & (1 << i) != 0)
    }

    /// Members for which `entry` has a pressure.
    fn with_pressure(self, entry: &DenseEntry) -> Self {
        CylinderSet(self.iter().filter(|i| entry.has_pressure(*i)).fold(0, |bits, i| bits | 1 << i))
    }

    /// Whether `entry` has a pressure for every member.
    fn all_have_pressure(self, entry: &DenseEntry) -> bool {
        self.iter().all(|i| entry.has_pressure(i))
    }

    fn is_empty(self) -> bool {
        self.0 == 0
    }
}

fn both_at_surface(a: &DenseEntry, b: &DenseEntry) -> bool {
    a.depth_mm < SURFACE_THRESHOLD_MM && b.depth_mm < SURFACE_THRESHOLD_MM
}

/// Ambient pressure integrated over `first..=last`, in atm·minutes.
fn pressure_time(entries: &[DenseEntry], first: usize, last: usize, surface: &SurfaceConditions) -> f64 {
    entries[first..=last]
        .windows(2)
        .map(|pair| {
            let depth = (pair[0].depth_mm + pair[1].depth_mm) / 2;
            let dt = (pair[1].time_sec - pair[0].time_sec) as f64;
            surface.depth_to_atm(depth) * dt
        })
        .sum::<f64>()
        / 60.0
}

/// SAC (ml/min) between two entries for the given cylinders. Pressure
/// increases are ignored, so a refill or sensor glitch does not count
/// as negative use.
fn sac_between(
    cylinders: &[Cylinder],
    entries: &[DenseEntry],
    first: usize,
    last: usize,
    gases: CylinderSet,
    surface: &SurfaceConditions,
) -> i32 {
    if first >= last {
        return 0;
    }
    let airuse: i32 = gases
        .iter()
        .filter_map(|i| {
            let cyl = cylinders.get(i)?;
            let a = entries[first].pressure(i)?;
            let b = entries[last].pressure(i)?;
            Some(gas_volume(cyl, a) - gas_volume(cyl, b))
        })
        .filter(|used| *used > 0)
        .sum();
    if airuse == 0 {
        return 0;
    }
    let atm_minutes = pressure_time(entries, first, last, surface);
    if atm_minutes <= 0.0 {
        return 0;
    }
    (airuse as f64 / atm_minutes).round() as i32
}

/// SAC for one entry from a window reaching up to 30 s back and 60 s
/// forward. The window stops where the diver was at the surface or where
/// one of the cylinders loses its pressure data.
fn fill_sac(ctx: &AnalysisContext, entries: &mut [DenseEntry], idx: usize, matching: CylinderSet) {
    if entries[idx].sac_ml_min != 0 {
        return;
    }
    let gases = matching.with_pressure(&entries[idx]);
    if gases.is_empty() {
        return;
    }

    let mut first = idx;
    let earliest = entries[idx].time_sec - WINDOW_BEFORE_SEC;
    while first > 0 {
        let (prev, entry) = (&entries[first - 1], &entries[first]);
        if both_at_surface(prev, entry) || prev.time_sec < earliest || !gases.all_have_pressure(prev) {
            break;
        }
        first -= 1;
    }

    let mut last = first;
    let latest = entries[first].time_sec + WINDOW_LENGTH_SEC;
    while last + 1 < entries.len() {
        let (entry, next) = (&entries[last], &entries[last + 1]);
        if both_at_surface(entry, next) || next.time_sec > latest || !gases.all_have_pressure(next) {
            break;
        }
        last += 1;
    }

    let cylinders = ctx.dive.tracked_cylinders();
    entries[idx].sac_ml_min = sac_between(cylinders, entries, first, last, gases, &ctx.surface);
}

/// Fill `sac_ml_min` on every entry that the device did not already rate.
pub fn calculate_sac(ctx: &AnalysisContext, series: &mut DenseSeries) {
    let cylinders = ctx.dive.tracked_cylinders();
    let mut gases = ctx.gas_tracker();
    let mut current: Option<GasMix> = None;
    let mut matching = CylinderSet::default();

    for idx in 0..series.entries.len() {
        let mix = gases.at(series.entries[idx].time_sec);
        if current.map_or(true, |known| !known.same_as(&mix)) {
            current = Some(mix);
            matching = CylinderSet::matching(&mix, cylinders);
        }
        fill_sac(ctx, &mut series.entries, idx, matching);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dive, DiveComputer};
    use crate::prefs::ProfilePrefs;

    fn entry(time_sec: i32, depth_mm: i32, mbar: Option<i32>) -> DenseEntry {
        let mut e = DenseEntry {
            time_sec,
            depth_mm,
            ..Default::default()
        };
        e.sensor_pressure[0] = mbar;
        e
    }

    fn dive_with_cylinder(size_ml: i32) -> Dive {
        Dive {
            cylinders: vec![Cylinder {
                size_ml,
                ..Default::default()
            }],
            computers: vec![DiveComputer::default()],
            ..Default::default()
        }
    }

    #[test]
    fn test_cylinder_set() {
        let cylinders = vec![
            Cylinder::default(),
            Cylinder {
                gasmix: GasMix::new(500, 0),
                ..Default::default()
            },
            Cylinder {
                gasmix: GasMix::new(209, 0),
                ..Default::default()
            },
        ];
        let set = CylinderSet::matching(&GasMix::AIR, &cylinders);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 2]);
        let mut e = DenseEntry::default();
        e.sensor_pressure[2] = Some(100_000);
        assert_eq!(set.with_pressure(&e).iter().collect::<Vec<_>>(), vec![2]);
        assert!(!set.all_have_pressure(&e));
    }

    #[test]
    fn test_constant_depth_sac() {
        let dive = dive_with_cylinder(10_000);
        let prefs = ProfilePrefs::default();
        let ctx = AnalysisContext::new(&dive, 0, &prefs).expect("context");
        // 10 m, one bar drop every 10 s on a 10 ℓ cylinder.
        let entries: Vec<DenseEntry> = (0..20)
            .map(|i| entry(i * 10, 10_000, Some(200_000 - i * 1_000)))
            .collect();
        let mut series = DenseSeries {
            entries,
            ..Default::default()
        };
        calculate_sac(&ctx, &mut series);
        // The window around t=100 runs from t=70 to t=130 at constant depth.
        let cyl = &dive.cylinders[0];
        let used = gas_volume(cyl, 193_000) - gas_volume(cyl, 187_000);
        let expected = (used as f64 / ctx.surface.depth_to_atm(10_000)).round() as i32;
        let sac = series.entries[10].sac_ml_min;
        assert!((sac - expected).abs() <= 1, "sac {sac}, expected {expected}");
        assert!((20_000..30_000).contains(&sac), "sac {sac}");
        assert!(series.entries.iter().all(|e| e.sac_ml_min >= 0));
    }

    #[test]
    fn test_no_pressure_means_zero() {
        let dive = dive_with_cylinder(10_000);
        let prefs = ProfilePrefs::default();
        let ctx = AnalysisContext::new(&dive, 0, &prefs).expect("context");
        let mut series = DenseSeries {
            entries: (0..10).map(|i| entry(i * 10, 10_000, None)).collect(),
            ..Default::default()
        };
        calculate_sac(&ctx, &mut series);
        assert!(series.entries.iter().all(|e| e.sac_ml_min == 0));
    }

    #[test]
    fn test_device_sac_is_kept_and_gains_ignored() {
        let dive = dive_with_cylinder(10_000);
        let prefs = ProfilePrefs::default();
        let ctx = AnalysisContext::new(&dive, 0, &prefs).expect("context");
        let mut entries: Vec<DenseEntry> = (0..10)
            .map(|i| entry(i * 10, 10_000, Some(150_000 + i * 1_000)))
            .collect();
        entries[3].sac_ml_min = 17_000;
        let mut series = DenseSeries {
            entries,
            ..Default::default()
        };
        calculate_sac(&ctx, &mut series);
        assert_eq!(series.entries[3].sac_ml_min, 17_000);
        assert_eq!(series.entries[5].sac_ml_min, 0);
    }

    #[test]
    fn test_window_stops_at_surface() {
        let surface = SurfaceConditions::default();
        let cylinders = vec![Cylinder {
            size_ml: 10_000,
            ..Default::default()
        }];
        let entries = vec![
            entry(0, 0, Some(200_000)),
            entry(10, 0, Some(199_000)),
            entry(20, 5_000, Some(198_000)),
        ];
        let gases = CylinderSet(1);
        assert_eq!(sac_between(&cylinders, &entries, 1, 1, gases, &surface), 0);
        assert!(sac_between(&cylinders, &entries, 1, 2, gases, &surface) > 0);
    }
}
