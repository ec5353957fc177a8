//! Authoritative wagon trail server.
//!
//! Loads `config.ron` (CLI flags override it), owns the canonical game
//! state in a single simulation task, accepts players over TCP and
//! broadcasts snapshots until Ctrl-C.
//!
//! Run with: `cargo run -p trail-server -- --port 50000`

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use trail_config::{CliArgs, Config, ConfigOrigin};
use trail_multiplayer::AuthoritativeSimulator;
use trail_net::{GameServer, ServerConfig, SimulationConfig, SimulationHandle, SocketConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let (config, origin) = match Config::from_cli(&args, true) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("trail-server: {e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = trail_log::init_logging(
        config.debug.log_dir.as_deref(),
        cfg!(debug_assertions),
        Some(&config),
    ) {
        eprintln!("trail-server: logging unavailable: {e}");
    }
    match &origin {
        ConfigOrigin::Defaults => warn!("{origin}"),
        _ => info!("{origin}"),
    }

    let bind_addr = match config.network.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    info!(
        "Trail of {} steps, {} landmarks",
        config.trail.trail_length,
        config.trail.landmarks.len()
    );

    let simulator = AuthoritativeSimulator::new(config.trail.game_state(), config.rules.clone());
    let (sim_stop, sim_stop_rx) = watch::channel(false);
    let (simulation, sim_task) = SimulationHandle::spawn(
        simulator,
        SimulationConfig {
            weather_interval: config.trail.weather_interval(),
            day_interval: config.trail.day_interval(),
            ..Default::default()
        },
        sim_stop_rx,
    );

    let server = Arc::new(GameServer::new(server_config(&config, bind_addr), simulation));
    let listener = match server.bind() {
        Ok(listener) => listener,
        Err(e) => {
            error!("Could not bind {bind_addr}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let serving = Arc::clone(&server);
    let serve_task = tokio::spawn(async move { serving.run_with_listener(listener).await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C: {e}");
    }
    info!("Shutdown requested");

    server.shutdown();
    if let Err(e) = serve_task.await {
        error!("Server task failed: {e}");
    }
    let _ = sim_stop.send(true);
    if let Err(e) = sim_task.await {
        error!("Simulation task failed: {e}");
    }

    info!("Goodbye");
    ExitCode::SUCCESS
}

fn server_config(config: &Config, bind_addr: SocketAddr) -> ServerConfig {
    ServerConfig {
        bind_addr,
        max_connections: config.network.max_players as usize,
        snapshot_interval: config.network.snapshot_interval(),
        write_timeout: config.network.write_timeout(),
        codec: config.network.codec(),
        socket: SocketConfig::default(),
    }
}
