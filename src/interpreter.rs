//! Maps decoded response payloads onto the semantic climate model.

use log::debug;

use crate::climate::{Action, ClimateMode, ClimateSnapshot, FanSpeed, Preset};
use crate::protocol::commands::{ExtendedQueryResponse, FanMode, ModeFlags, OperationMode, QueryResponse, TemperatureUnit};
use crate::telemetry::Sensor;


/// Everything a query response says about the unit.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryReport {
    pub mode: ClimateMode,

    /// What the unit is doing while in auto
    pub sub_mode: Option<OperationMode>,

    pub fan: FanSpeed,
    pub fan_running: bool,
    pub target_temperature: f32,

    /// T1, the unit's own room temperature
    pub internal_temperature: f32,

    pub swing: bool,
    pub preset: Preset,
    pub telemetry: Vec<(Sensor, f32)>,
}

pub fn interpret_query(response: &QueryResponse) -> QueryReport {
    let mode = match OperationMode::decode(response.operation_mode) {
        Some(mode) => mode.into(),
        None => {
            debug!("unknown operation mode {:#04x}, assuming off", response.operation_mode);
            ClimateMode::Off
        }
    };

    let fan = FanMode::decode(response.fan_mode)
        .map(FanSpeed::from)
        .unwrap_or(FanSpeed::Auto);

    let flags = response.mode_flags();

    let preset = if flags.contains(ModeFlags::AUX_HEAT) {
        Preset::Boost
    } else if flags.contains(ModeFlags::ECO) {
        Preset::Sleep
    } else {
        Preset::None
    };

    let telemetry = vec![
        (Sensor::InternalTemperature, response.t1.celsius()),
        (Sensor::CoilInletTemperature, response.t2a.celsius()),
        (Sensor::CoilOutletTemperature, response.t2b.celsius()),
        (Sensor::CondenserTemperature, response.t3.celsius()),
        (Sensor::Current, response.current as f32),
        (Sensor::TimerStart, response.timer_start().minutes() as f32),
        (Sensor::TimerStop, response.timer_stop().minutes() as f32),
        (Sensor::ErrorFlags, response.error_flags as f32),
        (Sensor::ProtectFlags, response.protect_flags as f32),
        (Sensor::CommunicationErrors, response.ccm_errors as f32),
    ];

    let report = QueryReport {
        mode,
        sub_mode: OperationMode::sub_mode(response.operation_mode),
        fan,
        fan_running: FanMode::is_running(response.fan_mode),
        target_temperature: response.target_temperature.celsius(),
        internal_temperature: response.t1.celsius(),
        swing: flags.contains(ModeFlags::SWING),
        preset,
        telemetry,
    };

    debug!("query: {report:?}");

    report
}

/// Works out what the unit is doing from the mode it is in and whether its
/// fan is spinning. Actions not implied by either are kept.
pub fn derive_action(mode: ClimateMode, sub_mode: Option<OperationMode>, fan_running: bool, current: Action) -> Action {
    let mut action = current;

    if mode == ClimateMode::Heat && fan_running {
        action = Action::Heating;
    } else if action != Action::Idle && !fan_running {
        action = Action::Idle;
    }

    if mode == ClimateMode::Auto {
        match sub_mode {
            Some(OperationMode::Cool) => action = Action::Cooling,
            Some(OperationMode::Fan) => action = Action::Fan,
            Some(OperationMode::Heat) => action = Action::Heating,
            _ => {}
        }
    }

    action
}

/// Merge a query report into `snapshot`, returning whether anything changed.
///
/// While the unit is off only the mode is taken (and the action idled once
/// the fan stops), unless `force` is set. `remote_temperature` takes
/// precedence over the unit's own sensor for the current temperature.
pub fn apply_query(snapshot: &mut ClimateSnapshot, report: &QueryReport, force: bool, remote_temperature: Option<f32>) -> bool {
    let before = snapshot.clone();

    snapshot.mode = report.mode;

    if report.mode != ClimateMode::Off || force {
        snapshot.current_temperature = remote_temperature
            .filter(|t| t.is_finite())
            .or(Some(report.internal_temperature));

        snapshot.target_temperature = report.target_temperature;
        snapshot.fan = report.fan;
        snapshot.action = derive_action(report.mode, report.sub_mode, report.fan_running, snapshot.action);
        snapshot.swing = report.swing;
        snapshot.preset = report.preset;
    } else if !report.fan_running {
        snapshot.action = Action::Idle;
    }

    *snapshot != before
}


/// Everything an extended query response says about the unit.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtendedReport {
    pub outdoor_temperature: f32,
    pub static_pressure: u8,
    pub compressor_running: bool,
    pub target_temperature: f32,
    pub telemetry: Vec<(Sensor, f32)>,
}

pub fn interpret_extended(response: &ExtendedQueryResponse, unit: TemperatureUnit) -> ExtendedReport {
    let outdoor_temperature = response.outdoor_temperature.celsius();

    let report = ExtendedReport {
        outdoor_temperature,
        static_pressure: response.static_pressure,
        compressor_running: response.compressor_running,
        target_temperature: unit.decode_setpoint(response.target_temperature),
        telemetry: vec![
            (Sensor::OutdoorTemperature, outdoor_temperature),
            (Sensor::StaticPressure, response.static_pressure as f32),
            (Sensor::CompressorFrequency, response.compressor_frequency as f32),
        ],
    };

    if !response.subsystems_ok() {
        debug!("extended query reports subsystem fault: {:02x?}", response.subsystems);
    }

    debug!("extended query: {report:?}");

    report
}
