//! Per-call analysis context.
//!
//! Everything a pipeline stage needs to know about "which dive, which
//! computer, which settings" travels in this value instead of in globals.

use crate::error::{ProfileError, ProfileResult};
use crate::gas::{event_cylinder, GasTracker, ModeTracker};
use crate::models::{CylinderUse, Dive, DiveComputer, DiveMode, EVENT_GASCHANGE, EVENT_SETPOINT_CHANGE};
use crate::prefs::ProfilePrefs;
use crate::units::SurfaceConditions;

pub struct AnalysisContext<'a> {
    pub dive: &'a Dive,
    pub dc: &'a DiveComputer,
    pub prefs: &'a ProfilePrefs,
    pub surface: SurfaceConditions,
    /// Dive mode at the start of the dive, after setpoint events are considered.
    pub divemode: DiveMode,
    pub first_cylinder: usize,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(dive: &'a Dive, dc_index: usize, prefs: &'a ProfilePrefs) -> ProfileResult<Self> {
        let dc = dive
            .computers
            .get(dc_index)
            .ok_or(ProfileError::NoSuchComputer {
                index: dc_index,
                available: dive.computers.len(),
            })?;

        let divemode = if dc
            .events_named(EVENT_SETPOINT_CHANGE)
            .any(|ev| ev.value != 0)
        {
            DiveMode::ClosedCircuit
        } else {
            dc.divemode
        };

        let surface = SurfaceConditions::new(
            dc.surface_pressure_mbar.or(dive.surface_pressure_mbar),
            dive.salinity,
        );

        let mut ctx = AnalysisContext {
            dive,
            dc,
            prefs,
            surface,
            divemode,
            first_cylinder: 0,
        };
        ctx.first_cylinder = ctx.explicit_first_cylinder();
        Ok(ctx)
    }

    /// Cylinder breathed at the start: a gas change logged with the first
    /// sample, else the first diluent on a rebreather, else cylinder 0.
    fn explicit_first_cylinder(&self) -> usize {
        let first_sample_time = self.dc.samples.first().map(|s| s.time_sec);
        if let Some(ev) = self.dc.events_named(EVENT_GASCHANGE).next() {
            if Some(ev.time_sec) == first_sample_time || ev.time_sec <= 1 {
                return event_cylinder(self.dive, ev);
            }
        }
        if self.divemode == DiveMode::ClosedCircuit {
            if let Some(index) = self
                .dive
                .cylinders
                .iter()
                .position(|cyl| cyl.usage == CylinderUse::Diluent)
            {
                return index;
            }
        }
        0
    }

    /// Rebreathers with O2 sensors get their loop pO2 from sensor voting.
    pub fn uses_o2_sensors(&self) -> bool {
        match self.divemode {
            DiveMode::ClosedCircuit => true,
            DiveMode::PassiveSemiClosed => self.dc.o2_sensor_count > 0,
            DiveMode::OpenCircuit | DiveMode::Freedive => false,
        }
    }

    pub fn gas_tracker(&self) -> GasTracker<'a> {
        GasTracker::new(self.dive, self.dc, self.first_cylinder)
    }

    pub fn mode_tracker(&self) -> ModeTracker<'a> {
        ModeTracker::new(self.dc, self.divemode)
    }
}
