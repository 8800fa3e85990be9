use std::collections::HashMap;

use strum_macros::{Display, EnumIter};


/// Passive values decoded from query responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Sensor {
    /// Unit's own room temperature (T1)
    InternalTemperature,
    /// Indoor coil inlet (T2A)
    CoilInletTemperature,
    /// Indoor coil outlet (T2B)
    CoilOutletTemperature,
    /// Outdoor condenser (T3)
    CondenserTemperature,
    OutdoorTemperature,
    Current,
    /// Minutes
    TimerStart,
    /// Minutes
    TimerStop,
    ErrorFlags,
    ProtectFlags,
    CommunicationErrors,
    StaticPressure,
    CompressorFrequency,
}


/// Last published value of every sensor.
#[derive(Clone, Debug, Default)]
pub struct TelemetryCache {
    values: HashMap<Sensor, f32>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value`, returning `true` if it differs from what was last
    /// published (or nothing was).
    pub fn publish(&mut self, sensor: Sensor, value: f32) -> bool {
        if value.is_nan() {
            return false
        }

        match self.values.insert(sensor, value) {
            Some(previous) => previous != value,
            None => true,
        }
    }

    pub fn get(&self, sensor: Sensor) -> Option<f32> {
        self.values.get(&sensor).copied()
    }
}
