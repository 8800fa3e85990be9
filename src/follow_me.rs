use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::protocol::commands::{FollowMeRequest, FollowMeSubcommand};


/// A follow-me frame waiting for its slot in the cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowMeReport {
    /// Whole degrees Celsius
    Temperature(u8),
    /// 0-15
    StaticPressure(u8),
}


/// Follow-me state: initialization handshake, last sensor reading and
/// re-report scheduling.
#[derive(Clone, Debug)]
pub struct FollowMeSession {
    initialized: bool,
    last_temperature: u8,
    last_report: Option<Instant>,
    sensor: Option<f32>,
    queued: Option<FollowMeReport>,
    interval: Duration,
    min_interval: Duration,
}

impl FollowMeSession {
    pub fn new(interval: Duration, min_interval: Duration) -> Self {
        Self {
            initialized: false,
            last_temperature: 0,
            last_report: None,
            sensor: None,
            queued: None,
            interval,
            min_interval,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Force the next report to re-initialize.
    pub fn reset(&mut self) {
        if self.initialized {
            debug!("follow-me session reset");
        }
        self.initialized = false;
    }

    /// Last remote sensor reading.
    pub fn sensor(&self) -> Option<f32> {
        self.sensor
    }

    pub fn queued(&self) -> Option<FollowMeReport> {
        self.queued
    }

    /// Record a new remote reading. Returns whether it is time to report it.
    pub fn update_sensor(&mut self, temperature: f32, now: Instant) -> bool {
        if temperature.is_nan() {
            return false
        }

        self.sensor = Some(temperature);
        self.elapsed_since_report(now, self.min_interval)
    }

    /// Whether the periodic re-report is due.
    pub fn periodic_due(&self, now: Instant) -> bool {
        self.sensor.is_some() && self.elapsed_since_report(now, self.interval)
    }

    fn elapsed_since_report(&self, now: Instant, interval: Duration) -> bool {
        self.last_report
            .map(|last| now.saturating_duration_since(last) >= interval)
            .unwrap_or(true)
    }

    /// Queue a report of `temperature`, replacing anything queued. Returns the
    /// whole-degree value that will be sent, or `None` for a NaN reading.
    pub fn queue_temperature(&mut self, temperature: f32, now: Instant) -> Option<u8> {
        if temperature.is_nan() {
            return None
        }

        let rounded = temperature.round().clamp(0.0, 255.0) as u8;
        self.last_temperature = rounded;
        self.last_report = Some(now);
        self.queued = Some(FollowMeReport::Temperature(rounded));

        Some(rounded)
    }

    pub fn queue_static_pressure(&mut self, pressure: u8) {
        self.queued = Some(FollowMeReport::StaticPressure(pressure));
    }

    /// Build the follow-me request for this cycle.
    ///
    /// Temperature reports are only made while the unit is on, from the queued
    /// report or else the last sensor reading. The first report after a reset
    /// initializes the session.
    pub fn take_request(&mut self, unit_on: bool) -> Option<FollowMeRequest> {
        let temperature = match self.queued.take() {
            Some(FollowMeReport::StaticPressure(pressure)) => {
                info!("setting static pressure to {pressure}");
                return Some(FollowMeRequest::static_pressure(pressure, self.last_temperature))
            }
            Some(FollowMeReport::Temperature(temperature)) => temperature,
            None => {
                let sensor = self.sensor?;
                let rounded = sensor.round().clamp(0.0, 255.0) as u8;
                self.last_temperature = rounded;
                rounded
            }
        };

        if !unit_on {
            return None
        }

        let subcommand = if self.initialized {
            FollowMeSubcommand::Update
        } else {
            self.initialized = true;
            FollowMeSubcommand::Init
        };

        info!("sending follow-me {subcommand} ({temperature}C)");

        Some(FollowMeRequest::report(subcommand, temperature))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> FollowMeSession {
        FollowMeSession::new(Duration::from_secs(30), Duration::from_secs(5))
    }

    #[test]
    fn test_init_then_update() {
        let mut session = session();
        let now = Instant::now();

        assert_eq!(session.queue_temperature(21.6, now), Some(22));

        let request = session.take_request(true).expect("request");
        assert_eq!(request.subcommand(), Some(FollowMeSubcommand::Init));
        assert_eq!(request.temperature, 22);
        assert!(session.is_initialized());

        session.queue_temperature(21.4, now);
        let request = session.take_request(true).expect("request");
        assert_eq!(request.subcommand(), Some(FollowMeSubcommand::Update));
        assert_eq!(request.temperature, 21);

        session.reset();
        session.queue_temperature(21.4, now);
        let request = session.take_request(true).expect("request");
        assert_eq!(request.subcommand(), Some(FollowMeSubcommand::Init));
    }

    #[test]
    fn test_suppressed_while_off() {
        let mut session = session();
        session.queue_temperature(20.0, Instant::now());

        assert_eq!(session.take_request(false), None);
        assert_eq!(session.queued(), None);
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_nothing_to_report() {
        let mut session = session();
        assert_eq!(session.take_request(true), None);
        assert_eq!(session.queue_temperature(f32::NAN, Instant::now()), None);
        assert_eq!(session.take_request(true), None);
    }

    #[test]
    fn test_falls_back_to_sensor() {
        let mut session = session();
        session.update_sensor(23.2, Instant::now());

        let request = session.take_request(true).expect("request");
        assert_eq!(request.temperature, 23);
    }

    #[test]
    fn test_static_pressure() {
        let mut session = session();
        session.queue_temperature(20.0, Instant::now());
        session.take_request(true);

        session.queue_static_pressure(9);
        let request = session.take_request(false).expect("request");
        assert_eq!(request.subcommand(), Some(FollowMeSubcommand::StaticPressure));
        assert_eq!(request.static_pressure, 0x19);
        assert_eq!(request.temperature, 20);
    }

    #[test]
    fn test_report_scheduling() {
        let mut session = session();
        let start = Instant::now();

        assert!(!session.periodic_due(start));
        assert!(!session.update_sensor(f32::NAN, start));
        assert!(session.update_sensor(20.0, start));
        assert!(session.periodic_due(start));

        session.queue_temperature(20.0, start);
        assert!(!session.update_sensor(20.5, start + Duration::from_secs(4)));
        assert!(session.update_sensor(20.5, start + Duration::from_secs(5)));
        assert!(!session.periodic_due(start + Duration::from_secs(29)));
        assert!(session.periodic_due(start + Duration::from_secs(30)));
    }
}
