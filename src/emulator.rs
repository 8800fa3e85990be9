//! An indoor unit that answers XYE requests, for bench testing without
//! hardware.

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use futures::{SinkExt, TryStreamExt};
use log::{debug, info};
use packed_struct::prelude::*;

use crate::config::PortStream;
use crate::protocol::codec::{BusFrame, RxFrame, TxFrame, RX_PAYLOAD_SIZE};
use crate::protocol::commands::*;


#[derive(Clone, Debug, PartialEq)]
pub struct UnitState {
    /// [OperationMode] as last set
    pub mode: OperationMode,

    /// Ran in auto before being switched off
    pub was_auto: bool,

    /// [FanMode] as last set
    pub fan_mode: FanMode,

    /// Raw setpoint byte
    pub target_temperature: u8,

    pub mode_flags: ModeFlags,

    pub room_temperature: Temperature,
    pub outdoor_temperature: Temperature,

    pub static_pressure: u8,
    pub follow_me_temperature: Option<u8>,
    pub follow_me_initialized: bool,
    pub locked: bool,
}

impl Default for UnitState {
    fn default() -> Self {
        Self {
            mode: OperationMode::Off,
            was_auto: false,
            fan_mode: FanMode::Auto,
            target_temperature: Temperature::from_celsius(24.0).raw,
            mode_flags: ModeFlags::default(),
            room_temperature: Temperature::from_celsius(22.5),
            outdoor_temperature: Temperature::from_celsius(11.0),
            static_pressure: 0,
            follow_me_temperature: None,
            follow_me_initialized: false,
            locked: false,
        }
    }
}

impl UnitState {
    fn operation_mode(&self) -> u8 {
        match self.mode {
            // running auto, currently cooling
            OperationMode::Auto => OperationMode::Cool as u8 | OperationMode::AUTO_FLAG,
            OperationMode::Off if self.was_auto => OperationMode::AUTO_FLAG,
            other => other as u8,
        }
    }

    fn fan_mode(&self) -> u8 {
        match (self.mode, self.fan_mode) {
            (OperationMode::Off, _) => FanMode::Off as u8,
            // auto, spinning at medium
            (_, FanMode::Auto) => FanMode::Auto as u8 | FanMode::Medium as u8,
            (_, other) => other as u8,
        }
    }

    pub fn query_response(&self) -> QueryResponse {
        QueryResponse {
            capabilities: Capabilities::EXTERNAL_TEMP | Capabilities::SWING,
            operation_mode: self.operation_mode(),
            fan_mode: self.fan_mode(),
            target_temperature: Temperature::from_raw(self.target_temperature),
            t1: self.room_temperature,
            t2a: Temperature::from_celsius(18.0),
            t2b: Temperature::from_celsius(16.0),
            t3: self.outdoor_temperature,
            mode_flags: self.mode_flags.0,
            ..Default::default()
        }
    }

    pub fn extended_query_response(&self) -> ExtendedQueryResponse {
        ExtendedQueryResponse {
            compressor_running: self.mode != OperationMode::Off,
            outdoor_temperature: self.outdoor_temperature,
            target_temperature: self.target_temperature,
            static_pressure: self.static_pressure,
            compressor_frequency: if self.mode != OperationMode::Off { 58 } else { 0 },
            ..Default::default()
        }
    }

    fn apply_set(&mut self, request: &SetRequest) {
        let mode = OperationMode::from_repr(request.operation_mode).unwrap_or(OperationMode::Off);

        self.was_auto = mode == OperationMode::Off && (self.mode == OperationMode::Auto || self.was_auto);
        self.mode = mode;
        self.fan_mode = FanMode::decode(request.fan_mode).unwrap_or(FanMode::Auto);
        self.target_temperature = request.target_temperature;
        self.mode_flags = ModeFlags(request.mode_flags);
    }

    fn apply_follow_me(&mut self, request: &FollowMeRequest) {
        match request.subcommand() {
            Some(FollowMeSubcommand::StaticPressure) => {
                self.static_pressure = request.static_pressure & 0x0f;
            },
            Some(FollowMeSubcommand::Init) => {
                self.follow_me_initialized = true;
                self.follow_me_temperature = Some(request.temperature);
            },
            Some(FollowMeSubcommand::Update) if self.follow_me_initialized => {
                self.follow_me_temperature = Some(request.temperature);
            },
            _ => {
                debug!("ignoring follow-me {:#04x}", request.subcommand);
            }
        }
    }

    /// Answer a request from the controller, updating the unit as it asks.
    pub fn respond(&mut self, frame: &TxFrame) -> Result<Option<RxFrame>, PackingError> {
        let Some(cmd) = frame.id.command() else {
            return Ok(None)
        };

        let echo = RxFrame::new(cmd.into(), [0x00; RX_PAYLOAD_SIZE]);

        let response = match cmd {
            CommandCode::Query => RxFrame::pack(self.query_response())?,
            CommandCode::QueryExtended => RxFrame::pack(self.extended_query_response())?,
            CommandCode::Set => {
                self.apply_set(&frame.unpack_as::<SetRequest>()?);
                RxFrame::new(cmd.into(), self.query_response().pack()?)
            },
            CommandCode::FollowMe => {
                self.apply_follow_me(&frame.unpack_as::<FollowMeRequest>()?);
                echo
            },
            CommandCode::Lock => {
                self.locked = true;
                echo
            },
            CommandCode::Unlock => {
                self.locked = false;
                echo
            },
        };

        Ok(Some(response))
    }
}


/// Answer requests arriving on `port` until it closes.
pub async fn serve<S>(mut port: S, unit: Arc<Mutex<UnitState>>) -> Result<()> where
    S: PortStream
{
    while let Some(frame) = port.try_next().await? {
        let BusFrame::Tx(frame) = frame else {
            // another unit (or our own echo)
            continue
        };

        let response = {
            let mut unit = unit.lock().map_err(|_| anyhow!("unit state poisoned"))?;
            let response = unit.respond(&frame)?;
            info!("{:?} -> {:?}", frame.id.command(), unit);
            response
        };

        if let Some(response) = response {
            port.send(response.into()).await?;
        }
    }

    Ok(())
}
