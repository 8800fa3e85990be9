use anyhow::{Result, Context, bail};
use async_broadcast::RecvError;
use clap::Parser;
use log::{info, warn};
use mideaxye::climate::ControlRequest;
use mideaxye::config::{DriverArgs, Port};
use mideaxye::driver::Event;
use mideaxye::runner::{self, Input};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::select;
use url::Url;


/// Controls a Midea-family unit over its XYE bus.
///
/// Commands are read from stdin, one per line:
///
///   mode <off|auto|fan_only|dry|heat|cool>
///   temp <celsius>
///   fan <auto|low|medium|high>
///   swing <on|off>
///   preset <none|boost|sleep>
///   power <on|off|toggle>
///   remote <celsius>
///   pressure <0-15>
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// URL of the port to connect to
    ///
    /// either serial:///device/path or tcp+raw://host:port URLs supported
    port: Url,

    #[command(flatten)]
    driver: DriverArgs,
}


fn parse_switch(value: &str) -> Result<bool> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => bail!("expected on or off, got {other}"),
    }
}

fn parse_command(line: &str) -> Result<Option<Input>> {
    let mut words = line.split_whitespace();

    let Some(command) = words.next() else {
        return Ok(None)
    };

    let value = words.next()
        .with_context(|| format!("{command} needs a value"))?;

    let input = match command {
        "mode" => Input::Control(ControlRequest {
            mode: Some(value.parse().with_context(|| format!("unknown mode {value}"))?),
            ..Default::default()
        }),
        "temp" => Input::Control(ControlRequest {
            target_temperature: Some(value.parse().context("invalid temperature")?),
            ..Default::default()
        }),
        "fan" => Input::Control(ControlRequest {
            fan: Some(value.parse().with_context(|| format!("unknown fan speed {value}"))?),
            ..Default::default()
        }),
        "swing" => Input::Control(ControlRequest {
            swing: Some(parse_switch(value)?),
            ..Default::default()
        }),
        "preset" => Input::Control(ControlRequest {
            preset: Some(value.parse().with_context(|| format!("unknown preset {value}"))?),
            ..Default::default()
        }),
        "power" => match value {
            "toggle" => Input::Power(None),
            other => Input::Power(Some(parse_switch(other)?)),
        },
        "remote" => Input::RemoteTemperature(value.parse().context("invalid temperature")?),
        "pressure" => Input::StaticPressure(value.parse().context("invalid static pressure")?),
        other => bail!("unknown command {other}"),
    };

    Ok(Some(input))
}


#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let port = Port::open(&args.port).await?.io();

    let (handle, mut task) = runner::spawn(port, args.driver.into());

    tokio::spawn({
        let mut events = handle.subscribe();

        async move {
            loop {
                match events.recv().await {
                    Ok(Event::Climate(snapshot)) => info!("climate: {snapshot:?}"),
                    Ok(Event::Telemetry(sensor, value)) => info!("{sensor}: {value}"),
                    Err(RecvError::Overflowed(missed)) => warn!("missed {missed} events"),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    // no more commands, keep driving the unit
                    break
                };

                match parse_command(&line) {
                    Ok(Some(input)) => handle.send(input).await?,
                    Ok(None) => {},
                    Err(err) => warn!("{err:#}"),
                }
            },
            result = &mut task => {
                return result.context("driver task panicked")?
            }
        }
    }

    task.await.context("driver task panicked")?
}


#[cfg(test)]
mod tests {
    use mideaxye::climate::{ClimateMode, FanSpeed};

    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("").expect("parse"), None);

        assert_eq!(
            parse_command("mode heat_cool").expect("parse"),
            Some(Input::Control(ControlRequest { mode: Some(ClimateMode::Auto), ..Default::default() }))
        );
        assert_eq!(
            parse_command("fan  high").expect("parse"),
            Some(Input::Control(ControlRequest { fan: Some(FanSpeed::High), ..Default::default() }))
        );
        assert_eq!(parse_command("power toggle").expect("parse"), Some(Input::Power(None)));
        assert_eq!(parse_command("power off").expect("parse"), Some(Input::Power(Some(false))));
        assert_eq!(parse_command("remote 21.5").expect("parse"), Some(Input::RemoteTemperature(21.5)));
        assert_eq!(parse_command("pressure 4").expect("parse"), Some(Input::StaticPressure(4)));

        assert!(parse_command("mode turbo").is_err());
        assert!(parse_command("temp").is_err());
        assert!(parse_command("jump 3").is_err());
    }
}
