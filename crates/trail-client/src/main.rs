//! Headless wagon trail client.
//!
//! Reads commands from stdin, one per line:
//!
//! ```text
//! move | hunt | buy_food | repair_wagon | rest
//! choose <event_time> <choice>
//! status
//! quit
//! ```
//!
//! A 60 Hz render tick folds incoming snapshots into the local prediction
//! and logs the predicted position. A lost connection is re-established
//! with backoff under the same player name.
//!
//! Run with: `cargo run -p trail-client -- --name Alice`

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use trail_config::{CliArgs, Config, ConfigOrigin};
use trail_net::{
    ClientConfig, GameClient, ReconnectConfig, Snapshot, SyncStats, TrailClient, reconnect_loop,
};

/// Render ticks per second.
const FRAME_RATE: u32 = 60;

/// Name used when `--name` is not given.
const DEFAULT_NAME: &str = "Traveler";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Action(String),
    Choose { event_time: u64, choice: String },
    Status,
    Quit,
    Empty,
    Invalid(String),
}

fn parse_line(line: &str) -> Input {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Input::Empty;
    };
    match first {
        "quit" | "exit" => Input::Quit,
        "status" => Input::Status,
        "choose" => match (words.next().map(str::parse::<u64>), words.next()) {
            (Some(Ok(event_time)), Some(choice)) => Input::Choose {
                event_time,
                choice: choice.to_string(),
            },
            _ => Input::Invalid("usage: choose <event_time> <choice>".to_string()),
        },
        action => Input::Action(action.to_string()),
    }
}

fn describe(snapshot: &Snapshot, me: &str) -> String {
    let Some(player) = snapshot.player(me) else {
        return format!(
            "day {} | {:?} | {} is not on the trail yet",
            snapshot.day, snapshot.current_weather, me
        );
    };
    let mut line = format!(
        "day {} | {:?} | position {}/{} | food {} ammo {} money {} health {} wagon {}",
        snapshot.day,
        snapshot.current_weather,
        player.position,
        snapshot.trail_length,
        player.food,
        player.ammo,
        player.money,
        player.health,
        player.wagon_condition,
    );
    for event in player.event_log.iter().filter(|e| e.has_choices()) {
        let choices: Vec<&str> = event.choices.keys().map(String::as_str).collect();
        line.push_str(&format!(
            "\n  [{}] {} (choose {} <{}>)",
            event.timestamp,
            event.description,
            event.timestamp,
            choices.join("|")
        ));
    }
    line
}

fn describe_sync(stats: &SyncStats) -> String {
    format!(
        "sync: {} corrections ({} hard) | jitter {:.3}",
        stats.corrections, stats.hard_resets, stats.jitter
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let (config, origin) = match Config::from_cli(&args, false) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("trail-client: {e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = trail_log::init_logging(
        config.debug.log_dir.as_deref(),
        cfg!(debug_assertions),
        Some(&config),
    ) {
        eprintln!("trail-client: logging unavailable: {e}");
    }
    match &origin {
        ConfigOrigin::Defaults => warn!("{origin}"),
        _ => info!("{origin}"),
    }

    let addr = match config.network.server_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };
    let name = args.name.unwrap_or_else(|| DEFAULT_NAME.to_string());
    let client_config = ClientConfig {
        codec: config.network.codec(),
        ..Default::default()
    };

    let client = match GameClient::connect(addr, name.as_str(), client_config.clone()).await {
        Ok(client) => client,
        Err(e) => {
            warn!("Could not connect to {addr}: {e}");
            match reconnect_loop(addr, &name, &client_config, ReconnectConfig::default()).await {
                Ok(client) => client,
                Err(e) => {
                    error!("{e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    let mut trail = match TrailClient::new(client, config.prediction.clone()) {
        Ok(trail) => trail,
        Err(e) => {
            error!("Invalid prediction settings: {e}");
            return ExitCode::from(2);
        }
    };
    info!("Playing as {name}; type an action and press enter");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut frames = tokio::time::interval(Duration::from_secs(1) / FRAME_RATE);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let clock = tokio::time::Instant::now();
    let mut shown: Option<Arc<Snapshot>> = None;

    loop {
        tokio::select! {
            _ = frames.tick() => {
                if !trail.client().is_connected() {
                    warn!("Connection lost");
                    match reconnect_loop(addr, &name, &client_config, ReconnectConfig::default()).await {
                        Ok(client) => trail.replace_client(client),
                        Err(e) => {
                            error!("{e}");
                            return ExitCode::FAILURE;
                        }
                    }
                    continue;
                }

                if let Some(position) = trail.tick(clock.elapsed().as_secs_f64()) {
                    debug!("Predicted position {position:.2}");
                }
                let latest = trail.latest_snapshot();
                let fresh = match (&latest, &shown) {
                    (Some(a), Some(b)) => a.day != b.day || a.player(&name) != b.player(&name),
                    (Some(_), None) => true,
                    _ => false,
                };
                if fresh {
                    if let Some(snapshot) = &latest {
                        info!("{}", describe(snapshot, &name));
                    }
                    shown = latest;
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("stdin: {e}");
                        break;
                    }
                };
                let result = match parse_line(&line) {
                    Input::Action(action) => trail.submit(&action).await,
                    Input::Choose { event_time, choice } => trail.choose(event_time, choice).await,
                    Input::Status => {
                        match trail.latest_snapshot() {
                            Some(snapshot) => println!("{}", describe(&snapshot, &name)),
                            None => println!("no snapshot yet"),
                        }
                        println!("{}", describe_sync(&trail.sync_stats()));
                        Ok(())
                    }
                    Input::Quit => break,
                    Input::Empty => Ok(()),
                    Input::Invalid(usage) => {
                        println!("{usage}");
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    warn!("{e}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    trail.client().disconnect();
    ExitCode::SUCCESS
}
