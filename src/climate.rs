use strum_macros::{Display, EnumIter, EnumString};


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ClimateMode {
    Off,
    /// Dual heat/cool mode, the unit picks.
    #[strum(to_string = "auto", serialize = "heat_cool")]
    Auto,
    #[strum(to_string = "fan_only", serialize = "fan")]
    FanOnly,
    Dry,
    Heat,
    Cool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum FanSpeed {
    /// Reported only, can't be requested.
    Off,
    Auto,
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Preset {
    None,
    Boost,
    Sleep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Idle,
    Heating,
    Cooling,
    Fan,
}


/// Semantic state of the unit, as last reported or requested.
#[derive(Clone, Debug, PartialEq)]
pub struct ClimateSnapshot {
    pub mode: ClimateMode,
    pub fan: FanSpeed,

    /// Degrees Celsius
    pub target_temperature: f32,

    /// Degrees Celsius. Remote sensor when known, otherwise the unit's own.
    pub current_temperature: Option<f32>,

    pub swing: bool,
    pub preset: Preset,
    pub action: Action,
}

impl Default for ClimateSnapshot {
    fn default() -> Self {
        Self {
            mode: ClimateMode::Off,
            fan: FanSpeed::Auto,
            target_temperature: 24.0,
            current_temperature: None,
            swing: false,
            preset: Preset::None,
            action: Action::Idle,
        }
    }
}


/// A change requested by the host. Unset fields are left as they are.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlRequest {
    pub mode: Option<ClimateMode>,
    pub target_temperature: Option<f32>,
    pub fan: Option<FanSpeed>,
    pub swing: Option<bool>,
    pub preset: Option<Preset>,
}

impl ControlRequest {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold a newer request into this one. Fields set in `newer` win.
    pub fn merge(&mut self, newer: &ControlRequest) {
        self.mode = newer.mode.or(self.mode);
        self.target_temperature = newer.target_temperature.or(self.target_temperature);
        self.fan = newer.fan.or(self.fan);
        self.swing = newer.swing.or(self.swing);
        self.preset = newer.preset.or(self.preset);
    }

    /// Merge the request into `snapshot`, returning whether the mode changed.
    pub fn apply(&self, snapshot: &mut ClimateSnapshot) -> bool {
        let previous_mode = snapshot.mode;

        if let Some(mode) = self.mode {
            snapshot.mode = mode;
        }

        if let Some(target) = self.target_temperature.filter(|t| t.is_finite()) {
            snapshot.target_temperature = target;
        }

        if let Some(fan) = self.fan {
            snapshot.fan = fan;
        }

        if let Some(swing) = self.swing {
            snapshot.swing = swing;
        }

        if let Some(preset) = self.preset {
            snapshot.preset = preset;
        }

        snapshot.mode != previous_mode
    }
}


/// What the host may request.
#[derive(Clone, Debug, PartialEq)]
pub struct ClimateTraits {
    pub modes: Vec<ClimateMode>,
    pub fan_speeds: Vec<FanSpeed>,
    pub presets: Vec<Preset>,
    pub supports_swing: bool,
    pub min_temperature: f32,
    pub max_temperature: f32,
    pub temperature_step: f32,
}

impl Default for ClimateTraits {
    fn default() -> Self {
        Self {
            modes: vec![
                ClimateMode::Off,
                ClimateMode::Auto,
                ClimateMode::FanOnly,
                ClimateMode::Dry,
                ClimateMode::Heat,
                ClimateMode::Cool,
            ],
            fan_speeds: vec![
                FanSpeed::Auto,
                FanSpeed::Low,
                FanSpeed::Medium,
                FanSpeed::High,
            ],
            presets: vec![Preset::None, Preset::Boost, Preset::Sleep],
            supports_swing: true,
            min_temperature: 17.0,
            max_temperature: 30.0,
            temperature_step: 1.0,
        }
    }
}


#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!(ClimateMode::from_str("heat_cool"), Ok(ClimateMode::Auto));
        assert_eq!(ClimateMode::from_str("fan_only"), Ok(ClimateMode::FanOnly));
        assert_eq!(ClimateMode::from_str("cool"), Ok(ClimateMode::Cool));
        assert_eq!(FanSpeed::from_str("medium"), Ok(FanSpeed::Medium));
        assert_eq!(Preset::from_str("boost"), Ok(Preset::Boost));
        assert!(ClimateMode::from_str("turbo").is_err());

        assert_eq!(ClimateMode::FanOnly.to_string(), "fan_only");
    }

    #[test]
    fn test_apply_request() {
        let mut snapshot = ClimateSnapshot::default();

        let request = ControlRequest {
            target_temperature: Some(21.0),
            swing: Some(true),
            ..Default::default()
        };
        assert!(!request.apply(&mut snapshot));
        assert_eq!(snapshot.target_temperature, 21.0);
        assert!(snapshot.swing);
        assert_eq!(snapshot.mode, ClimateMode::Off);

        let request = ControlRequest {
            mode: Some(ClimateMode::Heat),
            target_temperature: Some(f32::NAN),
            ..Default::default()
        };
        assert!(request.apply(&mut snapshot));
        assert_eq!(snapshot.target_temperature, 21.0);

        assert!(ControlRequest::default().is_empty());
        assert!(!request.is_empty());
    }

    #[test]
    fn test_merge() {
        let mut request = ControlRequest {
            mode: Some(ClimateMode::Cool),
            fan: Some(FanSpeed::Low),
            ..Default::default()
        };

        request.merge(&ControlRequest {
            mode: Some(ClimateMode::Heat),
            preset: Some(Preset::Boost),
            ..Default::default()
        });

        assert_eq!(request.mode, Some(ClimateMode::Heat));
        assert_eq!(request.fan, Some(FanSpeed::Low));
        assert_eq!(request.preset, Some(Preset::Boost));
        assert_eq!(request.swing, None);
    }

    #[test]
    fn test_traits() {
        let traits = ClimateTraits::default();
        assert_eq!(traits.min_temperature, 17.0);
        assert_eq!(traits.max_temperature, 30.0);
        assert_eq!(traits.temperature_step, 1.0);
        assert_eq!(traits.modes.len(), 6);
        assert!(!traits.fan_speeds.contains(&FanSpeed::Off));
    }
}
