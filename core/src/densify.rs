//! Turns a sparse sample/event stream into the dense entry raster.
//!
//! Between two samples an entry is synthesised every 10 seconds with
//! linearly interpolated depth, and every event gets an entry at its exact
//! time. The series is framed by two padding entries at either end.

use crate::context::AnalysisContext;
use crate::error::{ProfileError, ProfileResult};
use crate::limits::PlotLimits;
use crate::models::{Sample, EVENT_SETPOINT_CHANGE, MAX_CYLINDERS};
use crate::series::{DenseEntry, DenseSeries, PADDING_ENTRIES};
use crate::units::interpolate;

/// Spacing of synthesised entries in seconds.
pub const RASTER_SEC: i32 = 10;

/// Leading and trailing padding plus rounding.
const SLACK_ENTRIES: usize = 6;

struct Densifier {
    entries: Vec<DenseEntry>,
}

impl Densifier {
    fn last(&self) -> &DenseEntry {
        // Never empty: the leading padding is pushed first.
        &self.entries[self.entries.len() - 1]
    }

    /// Push a synthesised entry that carries the previous entry's state
    /// forward, except for readings that only hold at a real sample.
    fn insert(&mut self, time_sec: i32, depth_mm: i32, sac_ml_min: i32) {
        let prev = self.last();
        let mut entry = prev.clone();
        entry.running_sum = prev.running_sum + trapezoid(prev.time_sec, prev.depth_mm, time_sec, depth_mm);
        entry.time_sec = time_sec;
        entry.depth_mm = depth_mm;
        entry.sensor_pressure = [None; MAX_CYLINDERS];
        entry.interpolated_pressure = [None; MAX_CYLINDERS];
        entry.sac_ml_min = sac_ml_min;
        entry.device.ndl_sec = None;
        entry.bearing = None;
        self.entries.push(entry);
    }

    /// Push the entry for a real sample.
    fn push_sample(&mut self, ctx: &AnalysisContext, sample: &Sample, time_sec: i32, temperature_mk: u32) {
        let prev = self.last();
        let mut entry = DenseEntry {
            time_sec,
            depth_mm: sample.depth_mm,
            running_sum: prev.running_sum
                + trapezoid(prev.time_sec, prev.depth_mm, time_sec, sample.depth_mm),
            temperature_mk,
            heartbeat: sample.heartbeat.unwrap_or(0),
            bearing: sample.bearing,
            cns: sample.cns,
            rbt_sec: sample.rbt_sec,
            sac_ml_min: sample.sac_ml_min,
            ..Default::default()
        };
        entry.device.stopdepth_mm = sample.stopdepth_mm;
        entry.device.stoptime_sec = sample.stoptime_sec;
        entry.device.ndl_sec = sample.ndl_sec;
        entry.device.tts_sec = sample.tts_sec;
        entry.device.in_deco = sample.in_deco;

        if ctx.uses_o2_sensors() {
            entry.o2_pressure_mbar = sample.setpoint_mbar;
            entry.o2_setpoint_mbar = sample.setpoint_mbar;
            entry.o2_sensor_mbar = sample.o2_sensor_mbar;
        }

        let tracked = ctx.dive.tracked_cylinders().len();
        for reading in sample.pressures.iter().flatten() {
            if reading.mbar <= 0 {
                continue;
            }
            if reading.cylinder < tracked {
                entry.sensor_pressure[reading.cylinder] = Some(reading.mbar);
            } else {
                log::warn!(
                    "pressure reading at {}s for unknown cylinder {}",
                    time_sec,
                    reading.cylinder
                );
            }
        }
        self.entries.push(entry);
    }

    fn push_padding(&mut self, time_sec: i32) {
        self.entries.push(DenseEntry {
            time_sec,
            ..Default::default()
        });
    }
}

fn trapezoid(t0: i32, d0: i32, t1: i32, d1: i32) -> i64 {
    (t1 - t0) as i64 * (d0 as i64 + d1 as i64) / 2
}

/// Build the dense series for the context's dive computer.
///
/// Samples whose timestamp does not advance are treated as lasting one
/// second. Nothing past `limits.max_time_sec` is rasterised.
pub fn populate_plot_entries(ctx: &AnalysisContext, limits: &PlotLimits) -> ProfileResult<DenseSeries> {
    let dc = ctx.dc;
    let max_time = limits.max_time_sec;
    let capacity =
        dc.samples.len() + SLACK_ENTRIES + (max_time.max(0) / RASTER_SEC) as usize + dc.events.len();

    let mut entries = Vec::new();
    entries
        .try_reserve_exact(capacity)
        .map_err(|_| ProfileError::Allocation { entries: capacity })?;

    let mut series = DenseSeries {
        limits: *limits,
        mean_depth_mm: dc.mean_depth_mm,
        ..Default::default()
    };
    for ev in &dc.events {
        series.register_event_name(&ev.name);
    }

    let mut dense = Densifier { entries };
    for _ in 0..PADDING_ENTRIES {
        dense.push_padding(0);
    }

    // Events at the very start are covered by the first sample.
    let mut events = dc.events.iter().skip_while(|ev| ev.time_sec == 0).peekable();
    let mut last_time = 0;
    let mut last_depth = 0;
    let mut last_temp = 0;

    for sample in &dc.samples {
        let mut time = sample.time_sec;
        let depth = sample.depth_mm;
        let sac = sample.sac_ml_min;

        let mut delta = time - last_time;
        if delta <= 0 {
            if delta < 0 {
                log::warn!("sample time went backwards from {}s to {}s", last_time, time);
            }
            time = last_time;
            delta = 1;
        }

        let mut offset = RASTER_SEC;
        while offset < delta {
            let raster_time = last_time + offset;
            if raster_time > max_time {
                break;
            }
            while let Some(ev) = events.next_if(|ev| ev.time_sec < raster_time) {
                let event_time = ev.time_sec.max(dense.last().time_sec);
                let part = event_time - last_time;
                dense.insert(event_time, interpolate(last_depth, depth, part, delta), sac);
            }
            dense.insert(raster_time, interpolate(last_depth, depth, offset, delta), sac);
            while events.next_if(|ev| ev.time_sec == raster_time).is_some() {}
            offset += RASTER_SEC;
        }

        while let Some(ev) = events.next_if(|ev| ev.time_sec < time) {
            let event_time = ev.time_sec.max(dense.last().time_sec);
            let part = event_time - last_time;
            dense.insert(event_time, interpolate(last_depth, depth, part, delta), sac);
        }

        if let Some(temp) = sample.temperature_mk.filter(|t| *t > 0) {
            last_temp = temp;
        }
        dense.push_sample(ctx, sample, time, last_temp);

        while events.next_if(|ev| ev.time_sec == time).is_some() {}
        last_time = time;
        last_depth = depth;

        if time > max_time {
            break;
        }
    }

    // Events logged after the last sample sit at the surface.
    let sac = dense.last().sac_ml_min;
    for ev in events {
        if ev.time_sec > last_time {
            dense.insert(ev.time_sec, 0, sac);
            last_time = ev.time_sec;
        }
    }

    dense.push_padding(last_time + 1);
    dense.push_padding(last_time + 2);

    series.entries = dense.entries;
    Ok(series)
}

/// Apply "SP change" events: from each event on, the loop pO2 is the
/// event's setpoint until the next one. Entries before the first event keep
/// what the samples reported.
pub fn check_setpoint_events(ctx: &AnalysisContext, series: &mut DenseSeries) {
    let mut setpoints = ctx.dc.events_named(EVENT_SETPOINT_CHANGE).peekable();
    let mut current: Option<i32> = None;
    for entry in series.entries.iter_mut() {
        while let Some(ev) = setpoints.next_if(|ev| ev.time_sec <= entry.time_sec) {
            current = Some(ev.value);
        }
        if let Some(mbar) = current {
            entry.o2_pressure_mbar = mbar;
            entry.o2_setpoint_mbar = mbar;
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::tests::{densify, sample};
    use super::*;
    use crate::models::{Dive, DiveComputer, Event};
    use proptest::prelude::*;

    fn dive_from(steps: &[(i32, i32)], event_times: &[i32]) -> Dive {
        let mut time = 0;
        let mut samples = vec![sample(0, 0)];
        for (dt, depth) in steps {
            time += dt;
            samples.push(sample(time, *depth));
        }
        let mut events: Vec<Event> = event_times
            .iter()
            .map(|t| Event {
                name: "bookmark".to_string(),
                time_sec: *t,
                ..Default::default()
            })
            .collect();
        events.sort_by_key(|ev| ev.time_sec);
        Dive {
            computers: vec![DiveComputer {
                samples,
                events,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    proptest! {
        #[test]
        fn times_are_monotonic_and_padded(
            steps in prop::collection::vec((0_i32..90, 0_i32..40_000), 0..40),
            event_times in prop::collection::vec(0_i32..4_000, 0..6),
        ) {
            let series = densify(&dive_from(&steps, &event_times));
            prop_assert!(series.len() >= 4);
            prop_assert!(series.entries.windows(2).all(|w| w[0].time_sec <= w[1].time_sec));
            let n = series.len();
            prop_assert_eq!(series.entries[n - 1].time_sec, series.entries[n - 2].time_sec + 1);
        }

        #[test]
        fn every_event_has_an_entry(
            steps in prop::collection::vec((1_i32..90, 0_i32..40_000), 1..40),
            event_times in prop::collection::vec(1_i32..4_000, 0..6),
        ) {
            let series = densify(&dive_from(&steps, &event_times));
            for t in event_times {
                prop_assert!(series.entries.iter().any(|e| e.time_sec == t), "no entry at {}", t);
            }
        }

        #[test]
        fn raster_depth_is_linear(steps in prop::collection::vec((11_i32..90, 0_i32..40_000), 1..30)) {
            let dive = dive_from(&steps, &[]);
            let series = densify(&dive);
            for pair in dive.computers[0].samples.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                let t = a.time_sec + RASTER_SEC;
                if t > series.limits.max_time_sec {
                    continue;
                }
                let expected = interpolate(a.depth_mm, b.depth_mm, RASTER_SEC, b.time_sec - a.time_sec);
                let entry = series.interior().iter().find(|e| e.time_sec == t);
                prop_assert_eq!(entry.map(|e| e.depth_mm), Some(expected));
            }
        }
    }
}
