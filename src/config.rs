use std::time::Duration;

use anyhow::{Result, Context, bail};
use clap::Args;
use futures::{Stream, Sink};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_serial::{SerialStream, SerialPortBuilderExt};
use tokio_util::codec::Framed;
use url::Url;

use crate::protocol::codec::{BusFrame, XyeCodec};
use crate::protocol::commands::TemperatureUnit;


pub const BAUD_RATE: u32 = 4800;


pub enum Port {
    Serial(SerialStream),
    TcpRaw(TcpStream)
}


/// A raw byte port, as the driver uses it.
pub trait PortIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> PortIo for T
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{}


/// A framed port, as the sniffer and emulator use it.
pub trait PortStream: Stream<Item = std::io::Result<BusFrame>> + Sink<BusFrame, Error = std::io::Error> + Send + Unpin {}

impl<T> PortStream for T
where
    T: Stream<Item = std::io::Result<BusFrame>> + Sink<BusFrame, Error = std::io::Error> + Send + Unpin,
{}


impl Port {
    pub async fn open(url: &Url) -> Result<Self> {
        match url.scheme() {
            "serial" => {
                let path = url.path();

                let port = tokio_serial::new(path, BAUD_RATE)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .stop_bits(tokio_serial::StopBits::One)
                    .parity(tokio_serial::Parity::None)
                    .open_native_async()
                    .with_context(|| format!("failed to open serial port {path}"))
                    ?;

                Ok(Self::Serial(port))
            },
            "tcp+raw" => {
                let host = url.host_str()
                    .with_context(|| format!("tcp+raw requires a host to be specified in the url: {url}"))?;

                let port = url.port()
                    .with_context(|| format!("tcp+raw requires a port number to be specified in the url: {url}"))?;

                let stream = TcpStream::connect((host, port)).await
                    .with_context(|| format!("failed to open tcp+raw connection to: {url}"))?;

                stream.set_nodelay(true)?;

                Ok(Self::TcpRaw(stream))
            },
            other => {
                bail!("url scheme {other} not supported");
            }
        }
    }

    pub fn io(self) -> Box<dyn PortIo> {
        match self {
            Port::Serial(port) => Box::new(port),
            Port::TcpRaw(stream) => Box::new(stream),
        }
    }

    pub fn framed(self) -> Box<dyn PortStream> {
        match self {
            Port::Serial(port) => {
                Box::new(Framed::new(port, XyeCodec::new()))
            },
            Port::TcpRaw(stream) => {
                Box::new(Framed::new(stream, XyeCodec::new()))
            }
        }
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct DriverConfig {
    /// Interval of the state machine tick
    pub period: Duration,

    /// How long to wait for the unit to answer before reading what arrived
    pub response_timeout: Duration,

    /// Scale the unit's setpoint bytes are expressed in
    pub temperature_unit: TemperatureUnit,

    /// Take the target temperature from extended query responses too
    pub target_from_extended_query: bool,

    /// Re-send follow-me at least this often
    pub follow_me_interval: Duration,

    /// Don't send follow-me on sensor changes more often than this
    pub follow_me_min_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(1000),
            response_timeout: Duration::from_millis(100),
            temperature_unit: TemperatureUnit::Celsius,
            target_from_extended_query: false,
            follow_me_interval: Duration::from_secs(30),
            follow_me_min_interval: Duration::from_secs(5),
        }
    }
}


/// Command line options shared by the binaries that drive a unit.
#[derive(Args, Debug, Clone)]
pub struct DriverArgs {
    /// State machine tick, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub period_ms: u64,

    /// Response window, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub response_timeout_ms: u64,

    /// Setpoint scale used by the unit (celsius or fahrenheit)
    #[arg(long, default_value_t = TemperatureUnit::Celsius)]
    pub temperature_unit: TemperatureUnit,

    /// Also refresh the target temperature from extended query responses
    #[arg(long)]
    pub target_from_extended_query: bool,

    /// Periodic follow-me interval, in seconds
    #[arg(long, default_value_t = 30)]
    pub follow_me_interval_s: u64,
}

impl From<DriverArgs> for DriverConfig {
    fn from(args: DriverArgs) -> Self {
        Self {
            period: Duration::from_millis(args.period_ms),
            response_timeout: Duration::from_millis(args.response_timeout_ms),
            temperature_unit: args.temperature_unit,
            target_from_extended_query: args.target_from_extended_query,
            follow_me_interval: Duration::from_secs(args.follow_me_interval_s),
            ..Default::default()
        }
    }
}


#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestArgs {
        #[command(flatten)]
        driver: DriverArgs,
    }

    #[test]
    fn test_defaults_match() {
        let args = TestArgs::parse_from(["test"]);
        assert_eq!(DriverConfig::from(args.driver), DriverConfig::default());
    }

    #[test]
    fn test_parse() {
        let args = TestArgs::parse_from([
            "test",
            "--period-ms", "500",
            "--temperature-unit", "fahrenheit",
            "--target-from-extended-query",
        ]);
        let config = DriverConfig::from(args.driver);

        assert_eq!(config.period, Duration::from_millis(500));
        assert_eq!(config.temperature_unit, TemperatureUnit::Fahrenheit);
        assert!(config.target_from_extended_query);
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let url = Url::parse("mqtt://localhost:1883").expect("url");
        assert!(Port::open(&url).await.is_err());
    }
}
