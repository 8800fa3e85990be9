use std::fmt::Debug;

use packed_struct::prelude::*;
use strum_macros::{Display, EnumIter, EnumString, FromRepr};

use crate::climate::{ClimateMode, FanSpeed};


/*
    Commands (controller -> unit, echoed back in the response header):

    [0xc0] = "Query"
    [0xc3] = "Set"
    [0xc4] = "Query (extended)"
    [0xc6] = "Follow-Me"
    [0xcc] = "Lock"
    [0xcd] = "Unlock"

    Every request payload ends in the complement of its command code.
*/

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromRepr, Display, EnumIter)]
#[repr(u8)]
pub enum CommandCode {
    Query = 0xc0,
    Set = 0xc3,
    QueryExtended = 0xc4,
    FollowMe = 0xc6,
    Lock = 0xcc,
    Unlock = 0xcd,
}

impl CommandCode {
    /// The trailing payload byte of every request carrying this command.
    pub fn complement(self) -> u8 {
        0xff - self as u8
    }
}

impl From<CommandCode> for u8 {
    fn from(value: CommandCode) -> Self {
        value as u8
    }
}


pub trait Command {
    const ID: CommandCode;
}


/// Operation mode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr, Display, EnumIter)]
#[repr(u8)]
pub enum OperationMode {
    Off = 0x00,
    Auto = 0x80,
    Fan = 0x81,
    Dry = 0x82,
    Heat = 0x84,
    Cool = 0x88,
}

impl OperationMode {
    /// Set by the unit while running (and after running) in auto.
    pub const AUTO_FLAG: u8 = 0x10;

    /// Decode a raw operation mode byte as reported by the unit.
    ///
    /// Any value carrying [`Self::AUTO_FLAG`] is auto, including the bare
    /// `0x10` the unit reports after being switched off from auto.
    pub fn decode(raw: u8) -> Option<Self> {
        if raw & Self::AUTO_FLAG != 0 {
            return Some(Self::Auto)
        }

        Self::from_repr(raw)
    }

    /// What the unit is actually doing while in auto.
    pub fn sub_mode(raw: u8) -> Option<Self> {
        Self::from_repr(raw & !Self::AUTO_FLAG)
    }

    /// The set byte that leaves a unit reporting `raw` as it is.
    ///
    /// Bare [`Self::AUTO_FLAG`] means off (after auto), so it maps to
    /// [`Self::Off`] rather than back to auto.
    pub fn setting(raw: u8) -> u8 {
        if raw & Self::AUTO_FLAG == 0 {
            return raw
        }

        match raw & !Self::AUTO_FLAG {
            0x00 => Self::Off as u8,
            _ => Self::Auto as u8,
        }
    }
}

impl From<ClimateMode> for OperationMode {
    fn from(value: ClimateMode) -> Self {
        match value {
            ClimateMode::Off => Self::Off,
            ClimateMode::Auto => Self::Auto,
            ClimateMode::FanOnly => Self::Fan,
            ClimateMode::Dry => Self::Dry,
            ClimateMode::Heat => Self::Heat,
            ClimateMode::Cool => Self::Cool,
        }
    }
}

impl From<OperationMode> for ClimateMode {
    fn from(value: OperationMode) -> Self {
        match value {
            OperationMode::Off => Self::Off,
            OperationMode::Auto => Self::Auto,
            OperationMode::Fan => Self::FanOnly,
            OperationMode::Dry => Self::Dry,
            OperationMode::Heat => Self::Heat,
            OperationMode::Cool => Self::Cool,
        }
    }
}


/// Fan mode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum FanMode {
    Off = 0x00,
    High = 0x01,
    Medium = 0x02,
    LowAlt = 0x03,
    Low = 0x04,
    Auto = 0x80,
}

impl FanMode {
    pub const SPEED_MASK: u8 = 0x0f;

    /// The auto bit wins over whatever speed is in the low nibble.
    pub fn decode(raw: u8) -> Option<Self> {
        if raw & Self::Auto as u8 != 0 {
            return Some(Self::Auto)
        }

        Self::from_repr(raw & Self::SPEED_MASK)
    }

    /// Whether the fan is actually spinning, going by the low nibble.
    pub fn is_running(raw: u8) -> bool {
        raw & Self::SPEED_MASK != 0
    }
}

impl From<FanSpeed> for FanMode {
    fn from(value: FanSpeed) -> Self {
        match value {
            FanSpeed::Off => Self::Off,
            FanSpeed::Auto => Self::Auto,
            FanSpeed::Low => Self::Low,
            FanSpeed::Medium => Self::Medium,
            FanSpeed::High => Self::High,
        }
    }
}

impl From<FanMode> for FanSpeed {
    fn from(value: FanMode) -> Self {
        match value {
            FanMode::Off => Self::Off,
            FanMode::Auto => Self::Auto,
            FanMode::Low | FanMode::LowAlt => Self::Low,
            FanMode::Medium => Self::Medium,
            FanMode::High => Self::High,
        }
    }
}


macro_rules! flags {
    ($(#[$meta:meta])* $name:ident { $($(#[$flag_meta:meta])* $flag:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name(pub u8);

        impl $name {
            $(
                $(#[$flag_meta])*
                pub const $flag: u8 = $value;
            )+

            pub fn contains(&self, flag: u8) -> bool {
                self.0 & flag == flag
            }

            pub fn with(self, flag: u8, enabled: bool) -> Self {
                if enabled {
                    Self(self.0 | flag)
                } else {
                    Self(self.0 & !flag)
                }
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:#04x})", stringify!($name), self.0)
            }
        }
    };
}

flags!(
    /// Mode flags, as carried in both set requests and query responses.
    ModeFlags {
        /// Sleep preset
        ECO = 0x01,
        /// Boost preset
        AUX_HEAT = 0x02,
        SWING = 0x04,
        VENTILATION = 0x88,
    }
);

flags!(
    Capabilities {
        EXTERNAL_TEMP = 0x80,
        SWING = 0x10,
    }
);

flags!(
    OperationFlags {
        WATER_PUMP = 0x04,
        WATER_LOCK = 0x80,
    }
);


/// Timer byte: a sum of fixed duration buckets.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Timer(pub u8);

impl Timer {
    pub const NOT_SET: u8 = 0x80;

    /// Bucket bits, largest first.
    const BUCKETS: [(u8, u32); 7] = [
        (0x40, 960),
        (0x20, 480),
        (0x10, 240),
        (0x08, 120),
        (0x04, 60),
        (0x02, 30),
        (0x01, 15),
    ];

    pub const MAX_MINUTES: u32 = 1905;

    /// Encodes `minutes`, rounded down to the nearest representable 15 minute
    /// step and clamped to [`Self::MAX_MINUTES`].
    pub fn from_minutes(minutes: u32) -> Self {
        let mut remaining = minutes.min(Self::MAX_MINUTES);
        let mut raw = 0x00;

        for (bit, duration) in Self::BUCKETS {
            if remaining >= duration {
                raw |= bit;
                remaining -= duration;
            }
        }

        Self(raw)
    }

    pub fn minutes(&self) -> u32 {
        Self::BUCKETS.iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, duration)| duration)
            .sum()
    }

    pub fn is_set(&self) -> bool {
        self.0 & Self::NOT_SET == 0
    }
}

impl Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_set() {
            write!(f, "{}min", self.minutes())
        } else {
            write!(f, "not set")
        }
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum FollowMeSubcommand {
    Update = 0x02,
    StaticPressure = 0x04,
    Init = 0x06,
}


/// Temperature byte: half degree steps offset by `0x28`.
#[derive(PackedStruct, Clone, Copy, Default, PartialEq, Eq)]
#[packed_struct(bit_numbering="msb0")]
pub struct Temperature {
    #[packed_field(bytes="0")]
    pub raw: u8
}

impl Temperature {
    const OFFSET: f32 = 40.0;

    pub fn from_raw(raw: u8) -> Self {
        Self { raw }
    }

    pub fn from_celsius(celsius: f32) -> Self {
        let raw = (celsius * 2.0 + Self::OFFSET).round().clamp(0.0, 255.0);
        Self { raw: raw as u8 }
    }

    pub fn celsius(&self) -> f32 {
        (self.raw as f32 - Self::OFFSET) / 2.0
    }
}

impl Debug for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}C", self.celsius())
    }
}


/// Offset applied to whole degrees Fahrenheit in setpoint bytes.
const FAHRENHEIT_OFFSET: u8 = 0x87;

/// Encodes a setpoint for a unit configured to display Fahrenheit.
pub fn fahrenheit_setpoint(celsius: f32) -> u8 {
    let fahrenheit = (9.0 / 5.0 * celsius + 32.0).trunc();
    (fahrenheit as i32 + FAHRENHEIT_OFFSET as i32).clamp(0, 255) as u8
}

/// Decodes a Fahrenheit setpoint byte back to degrees Celsius.
pub fn fahrenheit_setpoint_celsius(raw: u8) -> f32 {
    ((raw as f32 - FAHRENHEIT_OFFSET as f32) - 32.0) * 5.0 / 9.0
}


/// Scale the unit's setpoint bytes are expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn encode_setpoint(&self, celsius: f32) -> u8 {
        match self {
            TemperatureUnit::Celsius => Temperature::from_celsius(celsius).raw,
            TemperatureUnit::Fahrenheit => fahrenheit_setpoint(celsius),
        }
    }

    pub fn decode_setpoint(&self, raw: u8) -> f32 {
        match self {
            TemperatureUnit::Celsius => Temperature::from_raw(raw).celsius(),
            TemperatureUnit::Fahrenheit => fahrenheit_setpoint_celsius(raw),
        }
    }
}


/// Define an 8 byte request that carries nothing but the complement
macro_rules! empty_request {
    ($(#[$meta:meta])* $name:ident, $id:expr) => {
        $(#[$meta])*
        #[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
        #[packed_struct(bit_numbering="msb0")]
        pub struct $name {
            #[packed_field(bytes="0..=6")]
            _empty: [u8; 7],

            #[packed_field(bytes="7")]
            complement: u8,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    _empty: [0x00; 7],
                    complement: $id.complement()
                }
            }
        }

        impl Command for $name {
            const ID: CommandCode = $id;
        }
    }
}

empty_request!(
    /// Command `0xc0` (request).
    ///
    /// Unit replies with [QueryResponse].
    QueryRequest,
    CommandCode::Query);

empty_request!(
    /// Command `0xc4` (request).
    ///
    /// Unit replies with [ExtendedQueryResponse].
    QueryExtendedRequest,
    CommandCode::QueryExtended);

empty_request!(LockRequest, CommandCode::Lock);

empty_request!(UnlockRequest, CommandCode::Unlock);


/// Command `0xc3` -- Set (request).
///
/// Carries the complete desired state. The unit answers with the same layout
/// as a [QueryResponse].
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[packed_struct(bit_numbering="msb0")]
pub struct SetRequest {
    /// [OperationMode] byte
    #[packed_field(bytes="0")]
    pub operation_mode: u8,

    /// [FanMode] byte
    #[packed_field(bytes="1")]
    pub fan_mode: u8,

    /// Setpoint, either a [Temperature] byte or a [fahrenheit_setpoint]
    #[packed_field(bytes="2")]
    pub target_temperature: u8,

    #[packed_field(bytes="3")]
    pub timer_start: u8,

    #[packed_field(bytes="4")]
    pub timer_stop: u8,

    /// [ModeFlags] byte
    #[packed_field(bytes="5")]
    pub mode_flags: u8,

    #[packed_field(bytes="6")]
    pub reserved: u8,

    #[packed_field(bytes="7")]
    pub complement: u8,
}

impl Default for SetRequest {
    fn default() -> Self {
        Self {
            operation_mode: OperationMode::Off as u8,
            fan_mode: FanMode::Auto as u8,
            target_temperature: 0x00,
            timer_start: 0x00,
            timer_stop: 0x00,
            mode_flags: 0x00,
            reserved: 0x00,
            complement: CommandCode::Set.complement(),
        }
    }
}

impl Command for SetRequest {
    const ID: CommandCode = CommandCode::Set;
}


/// Command `0xc6` -- Follow-Me (request).
///
/// Reports the remote room temperature, or sets the static pressure of ducted
/// units.
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[packed_struct(bit_numbering="msb0")]
pub struct FollowMeRequest {
    #[packed_field(bytes="0..=1")]
    _unknown0: [u8; 2],

    /// `0x10 | pressure` when setting static pressure
    #[packed_field(bytes="2")]
    pub static_pressure: u8,

    #[packed_field(bytes="3")]
    _unknown3: u8,

    /// [FollowMeSubcommand] byte
    #[packed_field(bytes="4")]
    pub subcommand: u8,

    /// Remote temperature, whole degrees
    #[packed_field(bytes="5")]
    pub temperature: u8,

    #[packed_field(bytes="6")]
    _unknown6: u8,

    #[packed_field(bytes="7")]
    pub complement: u8,
}

impl FollowMeRequest {
    const STATIC_PRESSURE_FLAG: u8 = 0x10;

    pub fn report(subcommand: FollowMeSubcommand, temperature: u8) -> Self {
        Self {
            subcommand: subcommand as u8,
            temperature,
            ..Default::default()
        }
    }

    /// `pressure` is masked to the low nibble.
    pub fn static_pressure(pressure: u8, temperature: u8) -> Self {
        Self {
            static_pressure: Self::STATIC_PRESSURE_FLAG | (pressure & 0x0f),
            subcommand: FollowMeSubcommand::StaticPressure as u8,
            temperature,
            ..Default::default()
        }
    }

    pub fn subcommand(&self) -> Option<FollowMeSubcommand> {
        FollowMeSubcommand::from_repr(self.subcommand)
    }
}

impl Default for FollowMeRequest {
    fn default() -> Self {
        Self {
            _unknown0: [0x00; 2],
            static_pressure: 0x00,
            _unknown3: 0x00,
            subcommand: 0x00,
            temperature: 0x00,
            _unknown6: 0x00,
            complement: CommandCode::FollowMe.complement(),
        }
    }
}

impl Command for FollowMeRequest {
    const ID: CommandCode = CommandCode::FollowMe;
}


/// Command `0xc0` (response).
///
/// Sent from the unit in response to a [QueryRequest], and to a [SetRequest].
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[packed_struct(bit_numbering="msb0")]
pub struct QueryResponse {
    #[packed_field(bytes="0")]
    pub unknown_byte0: u8,

    /// [Capabilities] byte
    #[packed_field(bytes="1")]
    pub capabilities: u8,

    /// [OperationMode] byte, possibly carrying [OperationMode::AUTO_FLAG]
    #[packed_field(bytes="2")]
    pub operation_mode: u8,

    /// [FanMode] byte
    #[packed_field(bytes="3")]
    pub fan_mode: u8,

    #[packed_field(bytes="4")]
    pub target_temperature: Temperature,

    /// Indoor room temperature
    #[packed_field(bytes="5")]
    pub t1: Temperature,

    /// Indoor coil inlet
    #[packed_field(bytes="6")]
    pub t2a: Temperature,

    /// Indoor coil outlet
    #[packed_field(bytes="7")]
    pub t2b: Temperature,

    /// Outdoor condenser
    #[packed_field(bytes="8")]
    pub t3: Temperature,

    #[packed_field(bytes="9")]
    pub current: u8,

    #[packed_field(bytes="10")]
    pub unknown_byte10: u8,

    #[packed_field(bytes="11")]
    pub timer_start: u8,

    #[packed_field(bytes="12")]
    pub timer_stop: u8,

    #[packed_field(bytes="13")]
    pub unknown_byte13: u8,

    /// [ModeFlags] byte
    #[packed_field(bytes="14")]
    pub mode_flags: u8,

    /// [OperationFlags] byte
    #[packed_field(bytes="15")]
    pub operation_flags: u8,

    #[packed_field(bytes="16..=17", endian="lsb")]
    pub error_flags: u16,

    #[packed_field(bytes="18..=19", endian="lsb")]
    pub protect_flags: u16,

    /// Communication error between the unit's boards
    #[packed_field(bytes="20")]
    pub ccm_errors: u8,

    #[packed_field(bytes="21..=23")]
    pub unknown_tail: [u8; 3],
}

impl QueryResponse {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities(self.capabilities)
    }

    pub fn mode_flags(&self) -> ModeFlags {
        ModeFlags(self.mode_flags)
    }

    pub fn operation_flags(&self) -> OperationFlags {
        OperationFlags(self.operation_flags)
    }

    pub fn timer_start(&self) -> Timer {
        Timer(self.timer_start)
    }

    pub fn timer_stop(&self) -> Timer {
        Timer(self.timer_stop)
    }
}

impl Default for QueryResponse {
    fn default() -> Self {
        Self {
            unknown_byte0: 0x00,
            capabilities: 0x00,
            operation_mode: OperationMode::Off as u8,
            fan_mode: FanMode::Off as u8,
            target_temperature: Temperature::default(),
            t1: Temperature::default(),
            t2a: Temperature::default(),
            t2b: Temperature::default(),
            t3: Temperature::default(),
            current: 0x00,
            unknown_byte10: 0x00,
            timer_start: Timer::NOT_SET,
            timer_stop: Timer::NOT_SET,
            unknown_byte13: 0x00,
            mode_flags: 0x00,
            operation_flags: 0x00,
            error_flags: 0x0000,
            protect_flags: 0x0000,
            ccm_errors: 0x00,
            unknown_tail: [0x00; 3],
        }
    }
}

impl Command for QueryResponse {
    const ID: CommandCode = CommandCode::Query;
}


/// Command `0xc4` (response).
///
/// Engineering data. Sent from the unit in response to a [QueryExtendedRequest].
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[packed_struct(bit_numbering="msb0")]
pub struct ExtendedQueryResponse {
    #[packed_field(bytes="0")]
    pub indoor_fan_pwm: u8,

    #[packed_field(bytes="1")]
    pub indoor_fan_tach: u8,

    // byte 2

    #[packed_field(bits="16")]
    pub compressor_running: bool,

    #[packed_field(bits="17:23")]
    pub compressor_flags: u8,

    #[packed_field(bytes="3")]
    pub esp_profile: u8,

    #[packed_field(bytes="4")]
    pub protection_flags: u8,

    #[packed_field(bytes="5")]
    pub coil_inlet: Temperature,

    #[packed_field(bytes="6")]
    pub coil_outlet: Temperature,

    #[packed_field(bytes="7")]
    pub discharge: Temperature,

    #[packed_field(bytes="8")]
    pub expansion_valve: u8,

    #[packed_field(bytes="9")]
    pub unknown_byte9: u8,

    #[packed_field(bytes="10")]
    pub system_status: u8,

    #[packed_field(bytes="11")]
    pub indoor_unit_address: u8,

    /// Setpoint, either a [Temperature] byte or a [fahrenheit_setpoint]
    #[packed_field(bytes="12")]
    pub target_temperature: u8,

    #[packed_field(bytes="13..=14", endian="msb")]
    pub compressor_frequency: u16,

    #[packed_field(bytes="15")]
    pub outdoor_temperature: Temperature,

    #[packed_field(bytes="16..=17")]
    pub unknown_bytes16: [u8; 2],

    // byte 18

    #[packed_field(bits="144:147")]
    pub unknown_bits144: u8,

    #[packed_field(bits="148:151")]
    pub static_pressure: u8,

    #[packed_field(bytes="19")]
    pub unknown_byte19: u8,

    /// `0x80` per subsystem that reports OK
    #[packed_field(bytes="20..=23")]
    pub subsystems: [u8; 4],
}

impl ExtendedQueryResponse {
    pub const SUBSYSTEM_OK: u8 = 0x80;

    pub fn subsystems_ok(&self) -> bool {
        self.subsystems.iter().all(|flag| flag & Self::SUBSYSTEM_OK != 0)
    }
}

impl Default for ExtendedQueryResponse {
    fn default() -> Self {
        Self {
            indoor_fan_pwm: 0x00,
            indoor_fan_tach: 0x00,
            compressor_running: false,
            compressor_flags: 0x00,
            esp_profile: 0x00,
            protection_flags: 0x00,
            coil_inlet: Temperature::default(),
            coil_outlet: Temperature::default(),
            discharge: Temperature::default(),
            expansion_valve: 0x00,
            unknown_byte9: 0x00,
            system_status: 0x00,
            indoor_unit_address: 0x00,
            target_temperature: 0x00,
            compressor_frequency: 0x0000,
            outdoor_temperature: Temperature::default(),
            unknown_bytes16: [0x00; 2],
            unknown_bits144: 0x00,
            static_pressure: 0x00,
            unknown_byte19: 0x00,
            subsystems: [Self::SUBSYSTEM_OK; 4],
        }
    }
}

impl Command for ExtendedQueryResponse {
    const ID: CommandCode = CommandCode::QueryExtended;
}


/// A receive payload, keyed by the command echoed in its header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Query(QueryResponse),
    ExtendedQuery(ExtendedQueryResponse),
    Set(QueryResponse),
    FollowMe([u8; 24]),
    Lock([u8; 24]),
    Unlock([u8; 24]),
    Unknown(u8, [u8; 24]),
}

impl Response {
    pub fn unpack(cmd: u8, payload: &[u8; 24]) -> Result<Self, PackingError> {
        Ok(match CommandCode::from_repr(cmd) {
            Some(CommandCode::Query) => Response::Query(QueryResponse::unpack(payload)?),
            Some(CommandCode::QueryExtended) => Response::ExtendedQuery(ExtendedQueryResponse::unpack(payload)?),
            Some(CommandCode::Set) => Response::Set(QueryResponse::unpack(payload)?),
            Some(CommandCode::FollowMe) => Response::FollowMe(*payload),
            Some(CommandCode::Lock) => Response::Lock(*payload),
            Some(CommandCode::Unlock) => Response::Unlock(*payload),
            None => Response::Unknown(cmd, *payload),
        })
    }

    pub fn command(&self) -> Option<CommandCode> {
        match self {
            Response::Query(_) => Some(CommandCode::Query),
            Response::ExtendedQuery(_) => Some(CommandCode::QueryExtended),
            Response::Set(_) => Some(CommandCode::Set),
            Response::FollowMe(_) => Some(CommandCode::FollowMe),
            Response::Lock(_) => Some(CommandCode::Lock),
            Response::Unlock(_) => Some(CommandCode::Unlock),
            Response::Unknown(..) => None,
        }
    }
}


#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_temperature_transform() {
        assert_eq!(Temperature::from_raw(0x58).celsius(), 24.0);
        assert_eq!(Temperature::from_celsius(24.0).raw, 0x58);
        assert_eq!(Temperature::from_celsius(21.5).raw, 0x53);
        assert_eq!(Temperature::from_raw(0x28).celsius(), 0.0);
        assert_eq!(Temperature::from_raw(0x00).celsius(), -20.0);
    }

    #[test]
    fn test_temperature_quantization_within_half_degree() {
        let mut celsius = 17.0f32;
        while celsius <= 30.0 {
            let decoded = Temperature::from_celsius(celsius).celsius();
            assert!((decoded - celsius).abs() <= 0.5, "{celsius} decoded as {decoded}");
            celsius += 0.1;
        }
    }

    #[test]
    fn test_complement() {
        assert_eq!(CommandCode::Query.complement(), 0x3f);
        assert_eq!(CommandCode::Set.complement(), 0x3c);

        for cmd in CommandCode::iter() {
            assert_eq!(cmd as u8 + cmd.complement(), 0xff);
        }
    }

    #[test]
    fn test_operation_mode_decode() {
        assert_eq!(OperationMode::decode(0x00), Some(OperationMode::Off));
        assert_eq!(OperationMode::decode(0x88), Some(OperationMode::Cool));
        assert_eq!(OperationMode::decode(0x84), Some(OperationMode::Heat));
        assert_eq!(OperationMode::decode(0x42), None);
    }

    #[test]
    fn test_operation_mode_auto_flag() {
        // off, but the unit was last running in auto
        assert_eq!(OperationMode::decode(0x10), Some(OperationMode::Auto));

        // auto, currently cooling
        assert_eq!(OperationMode::decode(0x98), Some(OperationMode::Auto));
        assert_eq!(OperationMode::sub_mode(0x98), Some(OperationMode::Cool));
        assert_eq!(OperationMode::sub_mode(0x94), Some(OperationMode::Heat));
    }

    #[test]
    fn test_operation_mode_setting() {
        assert_eq!(OperationMode::setting(0x10), OperationMode::Off as u8);
        assert_eq!(OperationMode::setting(0x98), OperationMode::Auto as u8);
        assert_eq!(OperationMode::setting(0x94), OperationMode::Auto as u8);
        assert_eq!(OperationMode::setting(0x84), OperationMode::Heat as u8);
        assert_eq!(OperationMode::setting(0x00), OperationMode::Off as u8);

        // whatever the unit says, it gets back
        assert_eq!(OperationMode::setting(0x42), 0x42);
    }

    #[test]
    fn test_fan_mode_decode() {
        assert_eq!(FanMode::decode(0x00), Some(FanMode::Off));
        assert_eq!(FanMode::decode(0x01), Some(FanMode::High));
        assert_eq!(FanMode::decode(0x02), Some(FanMode::Medium));
        assert_eq!(FanMode::decode(0x03), Some(FanMode::LowAlt));
        assert_eq!(FanMode::decode(0x04), Some(FanMode::Low));
        assert_eq!(FanMode::decode(0x84), Some(FanMode::Auto));

        assert_eq!(FanSpeed::from(FanMode::LowAlt), FanSpeed::Low);
        assert!(FanMode::is_running(0x84));
        assert!(!FanMode::is_running(0x80));
    }

    #[test]
    fn test_timer_buckets() {
        assert_eq!(Timer::from_minutes(135).0, 0x09);
        assert_eq!(Timer::from_minutes(135).minutes(), 135);

        assert_eq!(Timer::from_minutes(0).minutes(), 0);
        assert_eq!(Timer::from_minutes(14).minutes(), 0);
        assert_eq!(Timer::from_minutes(100).minutes(), 90);
        assert_eq!(Timer::from_minutes(5000).minutes(), Timer::MAX_MINUTES);
        assert_eq!(Timer::from_minutes(5000).0, 0x7f);

        assert!(!Timer(Timer::NOT_SET).is_set());
        assert!(Timer::from_minutes(60).is_set());
    }

    #[test]
    fn test_fahrenheit_setpoint() {
        // 24C = 75.2F
        assert_eq!(fahrenheit_setpoint(24.0), 75 + 0x87);

        let celsius = fahrenheit_setpoint_celsius(75 + 0x87);
        assert!((celsius - 23.888).abs() < 0.01);
    }

    #[test]
    fn test_setpoint_units() {
        assert_eq!(TemperatureUnit::Celsius.encode_setpoint(24.0), 0x58);
        assert_eq!(TemperatureUnit::Celsius.decode_setpoint(0x58), 24.0);
        assert_eq!(TemperatureUnit::Fahrenheit.encode_setpoint(24.0), 75 + 0x87);
        assert_eq!("fahrenheit".parse::<TemperatureUnit>(), Ok(TemperatureUnit::Fahrenheit));
    }

    #[test]
    fn test_flags() {
        let flags = ModeFlags::default()
            .with(ModeFlags::SWING, true)
            .with(ModeFlags::ECO, true);

        assert_eq!(flags.0, 0x05);
        assert!(flags.contains(ModeFlags::SWING));
        assert!(!flags.contains(ModeFlags::AUX_HEAT));
        assert_eq!(flags.with(ModeFlags::ECO, false).0, 0x04);
    }

    #[test]
    fn test_requests_carry_complement() {
        assert_eq!(QueryRequest::default().pack().expect("pack")[7], 0x3f);
        assert_eq!(QueryExtendedRequest::default().pack().expect("pack"), [0, 0, 0, 0, 0, 0, 0, 0x3b]);
        assert_eq!(LockRequest::default().pack().expect("pack")[7], 0x33);
        assert_eq!(SetRequest::default().pack().expect("pack")[7], 0x3c);
        assert_eq!(FollowMeRequest::default().pack().expect("pack")[7], 0x39);
    }

    #[test]
    fn test_follow_me_layout() {
        let report = FollowMeRequest::report(FollowMeSubcommand::Init, 22).pack().expect("pack");
        assert_eq!(report, [0x00, 0x00, 0x00, 0x00, 0x06, 22, 0x00, 0x39]);

        let pressure = FollowMeRequest::static_pressure(7, 22).pack().expect("pack");
        assert_eq!(pressure, [0x00, 0x00, 0x17, 0x00, 0x04, 22, 0x00, 0x39]);
    }

    #[test]
    fn test_query_response_layout() {
        let mut payload = [0x00; 24];
        payload[1] = 0x90;
        payload[2] = 0x98;
        payload[3] = 0x84;
        payload[4] = 0x58;
        payload[5] = 0x54;
        payload[11] = 0x09;
        payload[12] = 0x80;
        payload[14] = 0x06;
        payload[16] = 0x34;
        payload[17] = 0x12;
        payload[18] = 0x01;
        payload[19] = 0x80;
        payload[20] = 0x05;

        let response = QueryResponse::unpack(&payload).expect("unpack");

        assert!(response.capabilities().contains(Capabilities::EXTERNAL_TEMP));
        assert!(response.capabilities().contains(Capabilities::SWING));
        assert_eq!(response.operation_mode, 0x98);
        assert_eq!(response.fan_mode, 0x84);
        assert_eq!(response.target_temperature.celsius(), 24.0);
        assert_eq!(response.t1.celsius(), 22.0);
        assert_eq!(response.timer_start().minutes(), 135);
        assert!(!response.timer_stop().is_set());
        assert!(response.mode_flags().contains(ModeFlags::AUX_HEAT));
        assert_eq!(response.error_flags, 0x1234);
        assert_eq!(response.protect_flags, 0x8001);
        assert_eq!(response.ccm_errors, 0x05);
    }

    #[test]
    fn test_extended_response_layout() {
        let mut payload = [0x80; 24];
        payload[2] = 0x80;
        payload[12] = 0x58;
        payload[13] = 0x01;
        payload[14] = 0x02;
        payload[15] = 0x3c;
        payload[18] = 0xf7;

        let response = ExtendedQueryResponse::unpack(&payload).expect("unpack");

        assert!(response.compressor_running);
        assert_eq!(response.compressor_frequency, 0x0102);
        assert_eq!(response.outdoor_temperature.celsius(), 10.0);
        assert_eq!(response.static_pressure, 0x07);
        assert_eq!(response.target_temperature, 0x58);
        assert!(response.subsystems_ok());
    }

    #[test]
    fn test_response_dispatch() {
        let payload = [0x00; 24];

        assert!(matches!(Response::unpack(0xc0, &payload), Ok(Response::Query(_))));
        assert!(matches!(Response::unpack(0xc4, &payload), Ok(Response::ExtendedQuery(_))));
        assert!(matches!(Response::unpack(0xc3, &payload), Ok(Response::Set(_))));
        assert!(matches!(Response::unpack(0xc6, &payload), Ok(Response::FollowMe(_))));
        assert!(matches!(Response::unpack(0x42, &payload), Ok(Response::Unknown(0x42, _))));
    }
}
