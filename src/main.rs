use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};
use aqualogic::{config::{Port, SessionConfig}, AquaLogic, Key, State};
use clap::Parser;
use strum::IntoEnumIterator;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use url::Url;


/// Monitor and control an AquaLogic/ProLogic pool controller.
///
/// Type a key name (e.g. `FILTER`) to press it, or `<STATE> on|off`
/// (e.g. `LIGHTS on`) to change a state. `states` lists the enabled states.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the port to connect to
    ///
    /// serial:///device/path, tcp+raw://host:port or file:///path/to/capture URLs supported
    port: Url,

    /// Seconds without a frame before the connection is considered dead
    #[arg(long, default_value = "30", value_parser = parse_secs)]
    read_timeout: Duration,

    /// Seconds to wait before checking that a state change took effect
    #[arg(long, default_value = "2", value_parser = parse_secs)]
    verify_delay: Duration,

    /// Times a state change is re-sent before giving up
    #[arg(long, default_value_t = 10)]
    retries: u32,

    /// Assume a multi-speed pump is connected
    #[arg(long)]
    multi_speed_pump: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_secs(s: &str) -> Result<Duration, std::num::ParseFloatError> {
    Ok(Duration::from_secs_f64(s.parse()?))
}


fn report(aq: &AquaLogic) {
    let state = aq.snapshot();
    let unit = if state.is_metric { "C" } else { "F" };

    info!(
        "air: {:?}{unit} pool: {:?}{unit} spa: {:?}{unit} pump: {:?}% {:?}W status: {}",
        state.air_temp, state.pool_temp, state.spa_temp, state.pump_speed, state.pump_power, aq.status()
    );

    let states: Vec<String> = aq.states().iter().map(State::to_string).collect();
    info!("enabled: {}", states.join(", "));
}

fn command(aq: &AquaLogic, line: &str) {
    let parts: Vec<&str> = line.split_whitespace().collect();

    match &parts[..] {
        [] => {},
        ["states"] => report(aq),
        [name, value @ ("on" | "off")] => {
            let Ok(state) = State::from_str(name) else {
                warn!("unknown state {name}");
                return;
            };

            if !aq.request_state(state, *value == "on") {
                warn!("{state} can't be changed");
            }
        },
        [name] => match Key::from_str(name) {
            Ok(key) => {
                aq.send_key(key);
            },
            Err(_) => {
                let keys: Vec<String> = Key::iter().map(|k| k.to_string()).collect();
                warn!("unknown key {name}, expected one of: {}", keys.join(" "));
            }
        },
        _ => warn!("unrecognised command: {line}"),
    }
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::TRACE } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .init();

    let framed = Port::open(&args.port).await?.framed();

    let aq = AquaLogic::new(SessionConfig {
        read_timeout: args.read_timeout,
        verify_delay: args.verify_delay,
        retries: args.retries,
    });

    if args.multi_speed_pump {
        aq.enable_multi_speed_pump(true);
    }

    info!("connected to {}", args.port);

    let mut session = tokio::spawn({
        let aq = aq.clone();
        async move { aq.process(framed, report).await }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            result = &mut session => {
                let reason = result.context("session task failed")??;
                info!("session ended: {reason:?}");
                return Ok(());
            }

            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => command(&aq, &line),
                    None => stdin_open = false,
                }
            }
        }
    }
}
