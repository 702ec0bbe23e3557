use std::time::SystemTime;

use anyhow::Result;

use aqualogic::{config::Port, protocol::frames::{Frame, FrameType}, state::display_text, AQUALOGIC};
use clap::Parser;
use colored::{ColoredString, Colorize};
use futures::StreamExt;
use tracing::Level;
use url::Url;


/// Print every frame seen on the bus.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the port to connect to
    ///
    /// serial:///device/path, tcp+raw://host:port or file:///path/to/capture URLs supported
    port: Url,

    /// Hide keep-alive frames
    #[arg(long)]
    no_keep_alive: bool,

    /// Also log framing errors
    #[arg(short, long)]
    verbose: bool,
}


fn delta_ms(time: Option<SystemTime>) -> u128 {
    time.and_then(|time| time.elapsed().ok())
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}

fn frame_desc(frame: &Frame) -> String {
    let payload = &frame.payload[..];

    match frame.frame_type {
        FrameType::DisplayUpdate => {
            format!("{:?}", display_text(payload).trim())
        },
        t if t.is_key_event() => {
            match frame.key_code().and_then(|code| AQUALOGIC.key_for_code(code)) {
                Some(key) => format!("{key} {payload:02x?}"),
                None => format!("{payload:02x?}"),
            }
        },
        _ => format!("{payload:02x?}"),
    }
}

fn coloured(frame_type: FrameType, line: String) -> ColoredString {
    match frame_type {
        FrameType::KeepAlive => line.dimmed(),
        FrameType::Leds => line.on_green().bright_white(),
        FrameType::DisplayUpdate | FrameType::LongDisplayUpdate => line.on_cyan().bright_white(),
        FrameType::PumpStatus | FrameType::PumpSpeedRequest => line.on_purple().bright_white(),
        t if t.is_key_event() => line.on_red().bright_white(),
        _ => line.on_black()
    }
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::TRACE } else { Level::ERROR })
        .init();

    let mut framed = Port::open(&args.port).await?.framed();

    let start_time = SystemTime::now();
    let mut last_frame_time: Option<SystemTime> = None;

    while let Some(frame) = framed.next().await {
        let frame = frame?;

        if args.no_keep_alive && frame.frame_type == FrameType::KeepAlive {
            continue;
        }

        let start_delta_ms = delta_ms(Some(start_time));
        let last_frame_delta_ms = delta_ms(last_frame_time);

        let tag: u16 = frame.frame_type.into();
        let name = format!("{:?}", frame.frame_type);
        let line = format!("[{start_delta_ms:8}, {last_frame_delta_ms:8}] {tag:04x}: {name: <20} {}", frame_desc(&frame));

        println!("{}", coloured(frame.frame_type, line));

        last_frame_time = Some(SystemTime::now());
    }

    Ok(())
}
