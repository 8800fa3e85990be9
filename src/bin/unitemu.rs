use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use log::info;
use mideaxye::config::Port;
use mideaxye::emulator::{self, UnitState};
use mideaxye::protocol::commands::{OperationMode, Temperature};
use url::Url;


/// Emulator for an XYE indoor unit
///
/// Answers query, set, follow-me and lock requests the way a unit would.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the port to connect to
    ///
    /// either serial:///device/path or tcp+raw://host:port URLs supported
    port: Url,

    /// Start with the unit running in cool
    #[arg(long)]
    running: bool,

    /// Room temperature reported by the unit, in celsius
    #[arg(long, default_value_t = 22.5)]
    room_temperature: f32,
}


#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let framed = Port::open(&args.port).await?.framed();

    let state = UnitState {
        mode: if args.running { OperationMode::Cool } else { OperationMode::Off },
        room_temperature: Temperature::from_celsius(args.room_temperature),
        ..Default::default()
    };

    info!("starting unit emulator on {}", args.port);

    emulator::serve(framed, Arc::new(Mutex::new(state))).await
}
