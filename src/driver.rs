//! The command state machine.
//!
//! [`Driver`] does no I/O of its own. Whoever owns the port asks it for the
//! next frame with [`Driver::poll_transmit`], writes it, waits out the
//! response window and hands back whatever bytes arrived with
//! [`Driver::handle_response`]. State changes come out of
//! [`Driver::drain_events`].

use std::collections::VecDeque;

use log::{debug, error, info, warn};
use packed_struct::PackingError;
use thiserror::Error;
use tokio::time::Instant;

use crate::climate::{ClimateMode, ClimateSnapshot, ClimateTraits, ControlRequest, FanSpeed, Preset};
use crate::config::DriverConfig;
use crate::follow_me::FollowMeSession;
use crate::interpreter::{apply_query, interpret_extended, interpret_query};
use crate::protocol::codec::{FramingError, RxFrame, TxFrame, RX_FRAME_SIZE};
use crate::protocol::commands::*;
use crate::telemetry::{Sensor, TelemetryCache};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    /// A frame is on the wire, its answer not yet handled.
    AwaitingResponse { sent: CommandCode },
    SendSet,
    SendFollowMe,
    SendQuery,
    SendQueryExtended,
}

impl ControlState {
    /// Where the cycle goes after an exchange of `sent` completes.
    fn after(sent: CommandCode) -> Self {
        match sent {
            CommandCode::Query => ControlState::SendQueryExtended,
            CommandCode::QueryExtended => ControlState::SendSet,
            CommandCode::Set => ControlState::SendFollowMe,
            CommandCode::FollowMe
            | CommandCode::Lock
            | CommandCode::Unlock => ControlState::SendQuery,
        }
    }
}


#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("unexpected response length to {sent} (expected 32, actual: {actual})")]
    InvalidLength {
        sent: CommandCode,
        actual: usize,
    },
    #[error("invalid response to {sent}: {source}")]
    InvalidFrame {
        sent: CommandCode,
        #[source]
        source: FramingError,
    },
    #[error("failed to pack or unpack a payload: {0}")]
    Packing(#[from] PackingError),
    #[error("no exchange in flight")]
    NotAwaiting,
}


#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("cannot set static pressure {0} > 15")]
    StaticPressureOutOfRange(u8),
    #[error("cannot set static pressure while the unit is running")]
    UnitRunning,
}


/// Something observers may want to know about.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Climate(ClimateSnapshot),
    Telemetry(Sensor, f32),
}


pub struct Driver {
    config: DriverConfig,
    traits: ClimateTraits,

    state: ControlState,
    pending: Option<ControlState>,

    snapshot: ClimateSnapshot,
    last_on_mode: ClimateMode,

    /// Host requests not yet carried by a transmitted set frame
    requested: ControlRequest,

    /// Operation byte that keeps the unit in the mode it last reported
    reported_mode: Option<u8>,

    /// At least one query response has been seen
    synced: bool,

    /// Apply the next query response even if the unit is off
    force_refresh: bool,

    follow_me: FollowMeSession,
    telemetry: TelemetryCache,
    events: VecDeque<Event>,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        let follow_me = FollowMeSession::new(config.follow_me_interval, config.follow_me_min_interval);

        Self {
            config,
            traits: ClimateTraits::default(),
            state: ControlState::SendQuery,
            pending: None,
            snapshot: ClimateSnapshot::default(),
            last_on_mode: ClimateMode::Auto,
            requested: ControlRequest::default(),
            reported_mode: None,
            synced: false,
            force_refresh: true,
            follow_me,
            telemetry: TelemetryCache::new(),
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn pending(&self) -> Option<ControlState> {
        self.pending
    }

    pub fn snapshot(&self) -> &ClimateSnapshot {
        &self.snapshot
    }

    pub fn traits(&self) -> &ClimateTraits {
        &self.traits
    }

    pub fn telemetry(&self) -> &TelemetryCache {
        &self.telemetry
    }

    pub fn follow_me(&self) -> &FollowMeSession {
        &self.follow_me
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }

    /// Go to `target` now, or once the exchange in flight completes.
    fn schedule(&mut self, target: ControlState) {
        match self.state {
            ControlState::AwaitingResponse { .. } => self.pending = Some(target),
            _ => self.state = target,
        }
    }

    fn publish_climate(&mut self) {
        self.events.push_back(Event::Climate(self.snapshot.clone()));
    }

    fn publish_telemetry(&mut self, telemetry: Vec<(Sensor, f32)>) {
        for (sensor, value) in telemetry {
            if self.telemetry.publish(sensor, value) {
                self.events.push_back(Event::Telemetry(sensor, value));
            }
        }
    }

    fn unit_on(&self) -> bool {
        self.snapshot.mode != ClimateMode::Off
    }


    /// Called on every tick. Returns the frame to transmit, if any.
    ///
    /// Nothing is returned while an exchange is in flight.
    pub fn poll_transmit(&mut self, now: Instant) -> Result<Option<TxFrame>, ExchangeError> {
        if let Some(temperature) = self.follow_me.sensor() {
            if self.follow_me.periodic_due(now) {
                self.report_follow_me(temperature, now);
            }
        }

        loop {
            let frame = match self.state {
                ControlState::AwaitingResponse { .. } => return Ok(None),
                ControlState::SendQuery => TxFrame::pack(QueryRequest::default())?,
                ControlState::SendQueryExtended => TxFrame::pack(QueryExtendedRequest::default())?,
                ControlState::SendSet => {
                    if !self.synced {
                        // don't send defaults before we know what the unit is doing
                        if !self.requested.is_empty() {
                            self.pending = Some(ControlState::SendSet);
                        }
                        self.state = ControlState::SendQuery;
                        continue;
                    }

                    let request = self.set_request();
                    TxFrame::pack(request)?
                },
                ControlState::SendFollowMe => {
                    match self.follow_me.take_request(self.unit_on()) {
                        Some(request) => TxFrame::pack(request)?,
                        None => {
                            self.state = self.pending.take().unwrap_or(ControlState::SendQuery);
                            continue;
                        }
                    }
                },
            };

            let sent = frame.id.command().unwrap_or(CommandCode::Query);
            debug!("sending {sent}: {:02x?}", frame.payload);
            self.state = ControlState::AwaitingResponse { sent };

            return Ok(Some(frame))
        }
    }

    fn set_request(&mut self) -> SetRequest {
        let requested = std::mem::take(&mut self.requested);

        // the snapshot can't tell off-after-auto from auto, nor carry modes it
        // doesn't know, so unless asked the unit stays in its own mode
        let operation_mode = match (requested.mode, self.reported_mode) {
            (None, Some(raw)) => raw,
            _ => OperationMode::from(self.snapshot.mode) as u8,
        };

        // auto is full auto, the fan can't be chosen
        if operation_mode == OperationMode::Auto as u8 && self.snapshot.fan != FanSpeed::Auto {
            self.snapshot.fan = FanSpeed::Auto;
            self.publish_climate();
        }

        let fan_mode = match self.snapshot.fan {
            FanSpeed::Off => FanMode::Auto,
            other => other.into(),
        };

        let mode_flags = ModeFlags::default()
            .with(ModeFlags::AUX_HEAT, self.snapshot.preset == Preset::Boost)
            .with(ModeFlags::ECO, self.snapshot.preset == Preset::Sleep)
            .with(ModeFlags::SWING, self.snapshot.swing);

        SetRequest {
            operation_mode,
            fan_mode: fan_mode as u8,
            target_temperature: self.config.temperature_unit.encode_setpoint(self.snapshot.target_temperature),
            mode_flags: mode_flags.0,
            ..Default::default()
        }
    }


    /// Hand over the bytes that arrived during the response window.
    ///
    /// The state always moves on, to the pending command if there is one,
    /// otherwise along the cycle (or back to query if the exchange failed).
    pub fn handle_response(&mut self, bytes: &[u8], now: Instant) -> Result<(), ExchangeError> {
        let ControlState::AwaitingResponse { sent } = self.state else {
            return Err(ExchangeError::NotAwaiting)
        };

        let result = self.process_response(sent, bytes);

        let next = match &result {
            Ok(()) => ControlState::after(sent),
            Err(err) => {
                error!("{err}");
                ControlState::SendQuery
            }
        };

        self.state = self.pending.take().unwrap_or(next);
        debug!("{sent} exchange done at {now:?}, next: {:?}", self.state);

        result
    }

    fn process_response(&mut self, sent: CommandCode, bytes: &[u8]) -> Result<(), ExchangeError> {
        if bytes.len() != RX_FRAME_SIZE {
            return Err(ExchangeError::InvalidLength { sent, actual: bytes.len() })
        }

        let frame = RxFrame::decode(bytes)
            .map_err(|source| ExchangeError::InvalidFrame { sent, source })?;

        // set responses carry nothing we don't already know
        if sent == CommandCode::Set {
            return Ok(())
        }

        if frame.id.command() != Some(sent) {
            debug!("response to {sent} carries command {:#04x}", frame.id.cmd);
        }

        match frame.response()? {
            Response::Query(response) => self.apply_query_response(&response),
            Response::ExtendedQuery(response) => self.apply_extended_response(&response),
            _ => {}
        }

        Ok(())
    }

    fn apply_query_response(&mut self, response: &QueryResponse) {
        let report = interpret_query(response);

        let mut changed = apply_query(&mut self.snapshot, &report, self.force_refresh, self.follow_me.sensor());

        // the unit hasn't seen these yet
        if !self.requested.is_empty() {
            self.requested.apply(&mut self.snapshot);
            changed = true;
        }

        if report.mode != ClimateMode::Off {
            self.last_on_mode = report.mode;
        }

        self.reported_mode = Some(OperationMode::setting(response.operation_mode));
        self.synced = true;
        self.force_refresh = false;

        if changed {
            self.publish_climate();
        }

        self.publish_telemetry(report.telemetry);
    }

    fn apply_extended_response(&mut self, response: &ExtendedQueryResponse) {
        let report = interpret_extended(response, self.config.temperature_unit);

        let refresh_target = self.config.target_from_extended_query
            && (self.unit_on() || self.force_refresh)
            && self.requested.target_temperature.is_none();

        if refresh_target && report.target_temperature != self.snapshot.target_temperature {
            self.snapshot.target_temperature = report.target_temperature;
            self.publish_climate();
        }

        self.publish_telemetry(report.telemetry);
    }


    /// Apply a host request to the snapshot and schedule a set.
    pub fn control(&mut self, request: ControlRequest) {
        if request.is_empty() {
            return
        }

        debug!("control: {request:?}");

        if request.apply(&mut self.snapshot) {
            self.follow_me.reset();
        }

        if self.unit_on() {
            self.last_on_mode = self.snapshot.mode;
        }

        self.requested.merge(&request);
        self.publish_climate();
        self.schedule(ControlState::SendSet);
    }

    /// Switch the unit on (in the last mode it ran in) or off.
    pub fn set_power(&mut self, on: bool) {
        let mode = if on { self.last_on_mode } else { ClimateMode::Off };

        if mode == self.snapshot.mode {
            return
        }

        self.control(ControlRequest {
            mode: Some(mode),
            ..Default::default()
        });
    }

    pub fn toggle_power(&mut self) {
        self.set_power(!self.unit_on());
    }

    /// Queue a follow-me report of `temperature`.
    ///
    /// Returns `false` when nothing was scheduled: the reading is NaN, or
    /// the unit is off.
    pub fn report_follow_me(&mut self, temperature: f32, now: Instant) -> bool {
        let Some(rounded) = self.follow_me.queue_temperature(temperature, now) else {
            return false
        };

        if !self.unit_on() {
            debug!("unit is off, not sending follow-me");
            return false
        }

        info!("queued follow-me {rounded}C");
        self.schedule(ControlState::SendFollowMe);

        true
    }

    /// A new reading from the remote temperature sensor.
    pub fn on_remote_temperature(&mut self, temperature: f32, now: Instant) {
        if temperature.is_nan() {
            return
        }

        let due = self.follow_me.update_sensor(temperature, now);

        if self.snapshot.current_temperature != Some(temperature) {
            self.snapshot.current_temperature = Some(temperature);
            self.publish_climate();
        }

        if due {
            self.report_follow_me(temperature, now);
        }
    }

    /// Set the static pressure of a ducted unit. Only accepted while it is off.
    pub fn set_static_pressure(&mut self, pressure: u8) -> Result<(), ControlError> {
        if pressure > 15 {
            let err = ControlError::StaticPressureOutOfRange(pressure);
            warn!("{err}");
            return Err(err)
        }

        if self.unit_on() {
            let err = ControlError::UnitRunning;
            warn!("{err}");
            return Err(err)
        }

        self.follow_me.queue_static_pressure(pressure);
        self.schedule(ControlState::SendFollowMe);
        info!("queued setting static pressure to {pressure}");

        Ok(())
    }
}
