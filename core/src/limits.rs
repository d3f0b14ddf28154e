//! Global extrema across every dive computer of a dive, used to size the
//! dense series and to bound the plot axes.

use crate::models::Dive;
use crate::series::DiveType;
use crate::units::{round_up, SURFACE_THRESHOLD_MM};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlotLimits {
    pub max_depth_mm: i32,
    /// Last time worth plotting: the last event, or the last sample near
    /// which the diver was below the surface threshold.
    pub max_time_sec: i32,
    pub min_pressure_mbar: i32,
    pub max_pressure_mbar: i32,
    pub min_heartbeat: u8,
    pub max_heartbeat: u8,
    pub min_temp_mk: u32,
    pub max_temp_mk: u32,
}

/// Scan all computers of `dive`, not only the one being plotted, so that
/// every computer's profile shares the same axes.
pub fn calculate_max_limits(dive: &Dive) -> PlotLimits {
    let mut max_depth = dive.max_depth_mm;
    let mut max_time = 0;
    let mut max_pressure = 0;
    let mut min_pressure = i32::MAX;
    let mut max_hr = 0u8;
    let mut min_hr = u8::MAX;
    let mut min_temp = dive.min_temp_mk;
    let mut max_temp = dive.max_temp_mk;

    // Manually entered cylinder pressures bound the range too.
    for cyl in &dive.cylinders {
        if let Some(start) = cyl.start_mbar {
            max_pressure = max_pressure.max(start);
        }
        if let Some(end) = cyl.end_mbar.filter(|p| *p > 0) {
            min_pressure = min_pressure.min(end);
        }
    }

    for dc in &dive.computers {
        max_time = dc
            .events
            .iter()
            .map(|ev| ev.time_sec)
            .fold(max_time, i32::max);

        let mut found_sample_beyond_last_event = false;
        let mut last_depth = 0;
        for sample in &dc.samples {
            for reading in sample.pressures.iter().flatten() {
                if reading.mbar > 0 {
                    min_pressure = min_pressure.min(reading.mbar);
                }
                max_pressure = max_pressure.max(reading.mbar);
            }
            if let Some(temp) = sample.temperature_mk.filter(|t| *t > 0) {
                if min_temp == 0 || temp < min_temp {
                    min_temp = temp;
                }
                max_temp = max_temp.max(temp);
            }
            if let Some(hr) = sample.heartbeat.filter(|hr| *hr > 0) {
                max_hr = max_hr.max(hr);
                min_hr = min_hr.min(hr);
            }
            max_depth = max_depth.max(sample.depth_mm);

            // Always take the first sample past the last event, otherwise
            // the final raster segment would be cut short.
            let underwater =
                sample.depth_mm > SURFACE_THRESHOLD_MM || last_depth > SURFACE_THRESHOLD_MM;
            if (underwater || !found_sample_beyond_last_event) && sample.time_sec > max_time {
                found_sample_beyond_last_event = true;
                max_time = sample.time_sec;
            }
            last_depth = sample.depth_mm;
        }
    }

    if min_pressure > max_pressure {
        min_pressure = 0;
    }
    if min_hr > max_hr {
        min_hr = max_hr;
    }

    PlotLimits {
        max_depth_mm: max_depth,
        max_time_sec: max_time,
        min_pressure_mbar: min_pressure,
        max_pressure_mbar: max_pressure,
        min_heartbeat: min_hr,
        max_heartbeat: max_hr,
        min_temp_mk: min_temp,
        max_temp_mk: max_temp,
    }
}

/// Time axis extent in seconds.
///
/// A zoomed plot is rounded up to a minute with a quarter of the dive time
/// (capped at 2.5 minutes) to spare. Otherwise the axis covers at least 30
/// minutes in 5 minute steps. Freedives use 1 minute and 30 second grains.
pub fn plot_time_bound(limits: &PlotLimits, dive_type: DiveType, zoomed: bool) -> i32 {
    let seconds = limits.max_time_sec;
    let (threshold, ceiling) = match dive_type {
        DiveType::Freedive => (60, 30),
        DiveType::Air | DiveType::Nitrox | DiveType::Trimix => (600, 60),
    };
    if zoomed {
        if seconds < threshold {
            round_up(seconds + seconds / 4, ceiling)
        } else {
            round_up(seconds + threshold / 4, ceiling)
        }
    } else {
        (30 * 60).max(round_up(seconds + threshold / 4, ceiling * 5))
    }
}

/// Depth axis extent in mm: 3 m to spare rounded up to 10 m, at least 30 m
/// unless zoomed, plus room for the partial pressure overlay.
pub fn plot_depth_bound(limits: &PlotLimits, max_pp: f64, zoomed: bool) -> i32 {
    let rounded = round_up(limits.max_depth_mm + 3_000, 10_000);
    let depth = if zoomed { rounded } else { rounded.max(30_000) };
    depth + (max_pp * 9_000.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cylinder, DiveComputer, Event, Sample, SensorReading};

    fn sample(time_sec: i32, depth_mm: i32) -> Sample {
        Sample {
            time_sec,
            depth_mm,
            ..Default::default()
        }
    }

    #[test]
    fn test_limits_span_all_computers() {
        let mut deep = sample(600, 32_000);
        deep.pressures[0] = Some(SensorReading {
            cylinder: 0,
            mbar: 180_000,
        });
        deep.temperature_mk = Some(285_000);
        deep.heartbeat = Some(95);
        let first = DiveComputer {
            samples: vec![sample(0, 0), deep, sample(1_200, 5_000), sample(1_300, 0)],
            ..Default::default()
        };
        let second = DiveComputer {
            samples: vec![sample(0, 0), sample(1_400, 3_000), sample(1_500, 0)],
            events: vec![Event {
                name: "bookmark".to_string(),
                time_sec: 1_450,
                ..Default::default()
            }],
            ..Default::default()
        };
        let dive = Dive {
            cylinders: vec![Cylinder {
                start_mbar: Some(200_000),
                end_mbar: Some(60_000),
                ..Default::default()
            }],
            computers: vec![first, second],
            ..Default::default()
        };

        let limits = calculate_max_limits(&dive);
        assert_eq!(limits.max_depth_mm, 32_000);
        assert_eq!(limits.max_pressure_mbar, 200_000);
        assert_eq!(limits.min_pressure_mbar, 60_000);
        assert_eq!(limits.min_temp_mk, 285_000);
        assert_eq!(limits.max_heartbeat, 95);
        assert_eq!(limits.min_heartbeat, 95);
        // The surface sample right after a submerged one still counts.
        assert_eq!(limits.max_time_sec, 1_500);
    }

    #[test]
    fn test_trailing_surface_samples_are_ignored() {
        let dc = DiveComputer {
            samples: vec![
                sample(0, 0),
                sample(60, 10_000),
                sample(120, 0),
                sample(600, 0),
                sample(900, 0),
            ],
            ..Default::default()
        };
        let dive = Dive {
            computers: vec![dc],
            ..Default::default()
        };
        let limits = calculate_max_limits(&dive);
        assert_eq!(limits.max_time_sec, 120);
        assert_eq!(limits.min_pressure_mbar, 0);
    }

    #[test]
    fn test_time_bound() {
        let limits = PlotLimits {
            max_time_sec: 2_400,
            ..Default::default()
        };
        assert_eq!(plot_time_bound(&limits, DiveType::Air, false), 2_700);
        assert_eq!(plot_time_bound(&limits, DiveType::Air, true), 2_580);

        let short = PlotLimits {
            max_time_sec: 400,
            ..Default::default()
        };
        assert_eq!(plot_time_bound(&short, DiveType::Air, false), 1_800);
        assert_eq!(plot_time_bound(&short, DiveType::Air, true), 540);
        assert_eq!(plot_time_bound(&short, DiveType::Freedive, true), 420);
    }

    #[test]
    fn test_depth_bound() {
        let limits = PlotLimits {
            max_depth_mm: 18_000,
            ..Default::default()
        };
        assert_eq!(plot_depth_bound(&limits, 0.0, false), 30_000);
        assert_eq!(plot_depth_bound(&limits, 0.0, true), 30_000);
        let shallow = PlotLimits {
            max_depth_mm: 5_000,
            ..Default::default()
        };
        assert_eq!(plot_depth_bound(&shallow, 0.0, true), 10_000);
        assert_eq!(plot_depth_bound(&shallow, 1.6, false), 30_000 + 14_400);
    }
}
