use std::time::SystemTime;

use anyhow::Result;
use clap::Parser;
use colored::{Colorize, ColoredString};
use futures::StreamExt;
use mideaxye::config::Port;
use mideaxye::protocol::codec::{delta_ms, BusFrame, FrameId};
use mideaxye::protocol::commands::*;
use url::Url;


/// Prints every frame seen on an XYE bus.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the port to connect to
    ///
    /// either serial:///device/path or tcp+raw://host:port URLs supported
    port: Url,

    /// Decode payloads instead of printing raw bytes
    #[arg(long)]
    decode: bool,
}


fn cmd_desc(id: FrameId) -> String {
    let desc = match id.command() {
        Some(CommandCode::Query) => "Query",
        Some(CommandCode::Set) => "Set",
        Some(CommandCode::QueryExtended) => "Query (extended)",
        Some(CommandCode::FollowMe) => "Follow-Me",
        Some(CommandCode::Lock) => "Lock",
        Some(CommandCode::Unlock) => "Unlock",
        None => "Unknown",
    };

    let cmd = id.cmd;
    format!("{cmd:02x}: {desc: <16}")
}

fn payload_desc(frame: &BusFrame) -> String {
    match frame {
        BusFrame::Tx(frame) => match frame.id.command() {
            Some(CommandCode::Set) => match frame.unpack_as::<SetRequest>() {
                Ok(request) => format!("{request:?}"),
                Err(err) => format!("{err}"),
            },
            Some(CommandCode::FollowMe) => match frame.unpack_as::<FollowMeRequest>() {
                Ok(request) => format!("{request:?}"),
                Err(err) => format!("{err}"),
            },
            _ => format!("{:02x?}", frame.payload),
        },
        BusFrame::Rx(frame) => match frame.response() {
            Ok(Response::Query(response) | Response::Set(response)) => format!("{response:?}"),
            Ok(Response::ExtendedQuery(response)) => format!("{response:?}"),
            Ok(_) => format!("{:02x?}", frame.payload),
            Err(err) => format!("{err}"),
        },
    }
}

fn coloured(frame: &BusFrame, line: String) -> ColoredString {
    match frame {
        BusFrame::Tx(frame) if frame.id.cmd == CommandCode::Set as u8 => line.on_purple().bright_white(),
        BusFrame::Tx(frame) if frame.id.cmd == CommandCode::FollowMe as u8 => line.on_cyan().bright_white(),
        BusFrame::Tx(_) => line.on_green().bright_white(),
        BusFrame::Rx(_) => line.on_bright_green().bright_white(),
    }
}


#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut framed = Port::open(&args.port).await?.framed();

    let start_time = SystemTime::now();
    let mut last_frame_time: Option<SystemTime> = None;

    while let Some(frame) = framed.next().await {
        let frame = frame?;

        let start_delta_ms = delta_ms(Some(start_time));
        let last_frame_delta_ms = delta_ms(last_frame_time);

        let direction = match frame {
            BusFrame::Tx(_) => "controller -> unit",
            BusFrame::Rx(_) => "unit -> controller",
        };

        let cmd = cmd_desc(frame.id());
        let data = if args.decode {
            payload_desc(&frame)
        } else {
            match &frame {
                BusFrame::Tx(frame) => format!("{:02x?}", frame.payload),
                BusFrame::Rx(frame) => format!("{:02x?}", frame.payload),
            }
        };

        let line = format!("[{start_delta_ms:8}, {last_frame_delta_ms:8}] {direction}: {cmd} {data}");

        println!("{}", coloured(&frame, line));

        last_frame_time = Some(SystemTime::now());
    }

    Ok(())
}
