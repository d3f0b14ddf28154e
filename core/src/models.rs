//! Raw dive records consumed by the profile engine.
//!
//! These are owned by the log-keeping collaborators; the engine only ever
//! borrows them.

use serde::{Deserialize, Serialize};

use crate::gas::GasMix;

/// Upper bound on cylinders tracked per dive.
pub const MAX_CYLINDERS: usize = 20;

/// Upper bound on rebreather oxygen sensors per computer.
pub const MAX_O2_SENSORS: usize = 3;

pub const EVENT_GASCHANGE: &str = "gaschange";
pub const EVENT_SETPOINT_CHANGE: &str = "SP change";
pub const EVENT_MODECHANGE: &str = "modechange";

/// Breathing apparatus in use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiveMode {
    #[default]
    OpenCircuit,
    ClosedCircuit,
    PassiveSemiClosed,
    Freedive,
}

impl DiveMode {
    /// Decode the value carried by a "modechange" event.
    pub fn from_event_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(DiveMode::OpenCircuit),
            1 => Some(DiveMode::ClosedCircuit),
            2 => Some(DiveMode::PassiveSemiClosed),
            3 => Some(DiveMode::Freedive),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CylinderUse {
    #[default]
    OpenCircuit,
    Diluent,
    Oxygen,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cylinder {
    pub gasmix: GasMix,
    /// Water capacity in millilitres.
    pub size_ml: i32,
    pub start_mbar: Option<i32>,
    pub end_mbar: Option<i32>,
    pub usage: CylinderUse,
}

/// A pressure reading and the cylinder its transmitter is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    pub cylinder: usize,
    pub mbar: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sample {
    pub time_sec: i32,
    pub depth_mm: i32,
    pub pressures: [Option<SensorReading>; 2],
    pub temperature_mk: Option<u32>,
    pub heartbeat: Option<u8>,
    pub bearing: Option<i32>,
    pub stopdepth_mm: i32,
    pub stoptime_sec: i32,
    pub ndl_sec: Option<i32>,
    pub tts_sec: i32,
    pub rbt_sec: i32,
    pub in_deco: bool,
    pub cns: u8,
    pub setpoint_mbar: i32,
    pub o2_sensor_mbar: [i32; MAX_O2_SENSORS],
    /// SAC already computed by the device, if any.
    pub sac_ml_min: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub name: String,
    pub time_sec: i32,
    pub value: i32,
    /// Explicit cylinder index for gas changes.
    pub cylinder: Option<usize>,
}

impl Event {
    pub fn is_gaschange(&self) -> bool {
        self.name == EVENT_GASCHANGE
    }
}

/// One recording device's view of a dive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiveComputer {
    pub model: String,
    pub divemode: DiveMode,
    pub o2_sensor_count: u8,
    pub surface_pressure_mbar: Option<i32>,
    pub mean_depth_mm: i32,
    pub samples: Vec<Sample>,
    /// Time ordered.
    pub events: Vec<Event>,
}

impl DiveComputer {
    pub fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |ev| ev.name == name)
    }

    pub fn has_gaschange_to(&self, cylinder: usize) -> bool {
        self.events_named(EVENT_GASCHANGE)
            .any(|ev| ev.cylinder == Some(cylinder))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dive {
    pub cylinders: Vec<Cylinder>,
    pub computers: Vec<DiveComputer>,
    pub max_depth_mm: i32,
    pub min_temp_mk: u32,
    pub max_temp_mk: u32,
    pub surface_pressure_mbar: Option<i32>,
    pub salinity: Option<i32>,
}

impl Dive {
    /// Cylinders that fit in the per-entry pressure tracks.
    pub fn tracked_cylinders(&self) -> &[Cylinder] {
        &self.cylinders[..self.cylinders.len().min(MAX_CYLINDERS)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divemode_from_event_value() {
        assert_eq!(DiveMode::from_event_value(1), Some(DiveMode::ClosedCircuit));
        assert_eq!(DiveMode::from_event_value(3), Some(DiveMode::Freedive));
        assert_eq!(DiveMode::from_event_value(9), None);
    }

    #[test]
    fn test_has_gaschange_to() {
        let dc = DiveComputer {
            events: vec![
                Event {
                    name: EVENT_GASCHANGE.to_string(),
                    time_sec: 900,
                    value: 50,
                    cylinder: Some(1),
                },
                Event {
                    name: "bookmark".to_string(),
                    time_sec: 950,
                    value: 0,
                    cylinder: Some(2),
                },
            ],
            ..Default::default()
        };
        assert!(dc.has_gaschange_to(1));
        assert!(!dc.has_gaschange_to(2));
    }

    #[test]
    fn test_sample_deserializes_with_defaults() {
        let sample: Sample = serde_json::from_str(r#"{"time_sec": 60, "depth_mm": 18000}"#)
            .expect("sample should parse");
        assert_eq!(sample.time_sec, 60);
        assert_eq!(sample.depth_mm, 18_000);
        assert_eq!(sample.pressures, [None, None]);
        assert_eq!(sample.ndl_sec, None);
    }

    #[test]
    fn test_tracked_cylinders_is_bounded() {
        let dive = Dive {
            cylinders: vec![Cylinder::default(); MAX_CYLINDERS + 3],
            ..Default::default()
        };
        assert_eq!(dive.tracked_cylinders().len(), MAX_CYLINDERS);
    }
}
