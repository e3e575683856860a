/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use mecanum_pilot::config::ConfigManager;
use mecanum_pilot::dispatcher::Dispatcher;
use mecanum_pilot::transport::sim::{SimBehavior, SimulatedTransport};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Mecanum pilot – dry-run dispatcher against a simulated robot.
///
/// Example:
///   mecanum-pilot -c demos/pilot.yaml -d 1.5 8 2
#[derive(Debug, Parser)]
#[command(
    name = "mecanum-pilot",
    about = "Send timed movement commands to a mecanum-drive robot",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML pilot configuration.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Seconds each non-stop movement is kept active (0 = send once).
    #[arg(short = 'd', long = "duration", default_value_t = 0.0)]
    duration_sec: f64,

    /// Simulate a link drop after this many acknowledged writes.
    #[arg(long = "disconnect-after")]
    disconnect_after: Option<usize>,

    /// Simulate a radio error on this write attempt (0-based).
    #[arg(long = "fail-at")]
    fail_at: Option<usize>,

    /// Simulated acknowledgement latency.
    #[arg(long = "ack-latency-ms", default_value_t = 15)]
    ack_latency_ms: u64,

    /// Movement codes: 0/5 stop, 8 forward, 2 backward, 7/9 forward diagonals,
    /// 1/3 backward diagonals.
    #[arg(required = true, allow_negative_numbers = true)]
    movements: Vec<i64>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(
        config           = ?cli.config,
        duration_sec     = cli.duration_sec,
        movements        = ?cli.movements,
        disconnect_after = ?cli.disconnect_after,
        fail_at          = ?cli.fail_at,
        "Configuration"
    );

    // ── Load pilot configuration ──────────────────────────────────────────────
    let mut config_manager = ConfigManager::new();
    match &cli.config {
        Some(path) => {
            if let Err(e) = config_manager.load_from_file(path) {
                error!("Failed to load pilot configuration: {:#}", e);
                process::exit(1);
            }
        }
        None => warn!("No configuration file provided, using reference robot settings"),
    }
    let config = config_manager.config().clone();

    // ── Simulated robot advertising the configured peer ───────────────────────
    let transport = SimulatedTransport::new(vec![config.peer.clone()], config.endpoint.clone())
        .with_behavior(SimBehavior {
            disconnect_after_writes: cli.disconnect_after,
            fail_at_write: cli.fail_at,
            ack_latency: Duration::from_millis(cli.ack_latency_ms),
            ..Default::default()
        });
    let dispatcher = Dispatcher::new(transport, config);

    // ── Ctrl-C cancels at the next suspension point ───────────────────────────
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    let report = dispatcher
        .dispatch(&cli.movements, cli.duration_sec, Some(cancel_rx))
        .await;

    println!("{}", report);

    let delivered = dispatcher.transport().delivered_payloads();
    info!(writes = delivered.len(), payloads = ?delivered, "Simulated robot received");

    if !report.outcome().is_completed() {
        process::exit(1);
    }
}
