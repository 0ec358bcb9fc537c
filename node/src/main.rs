// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Stake Across Devnet
//!
//! Entry point for the `stake-across-devnet` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the two-chain devnet and either
//! serves it or runs the reference flow once.
//!
//! - `run`      starts the devnet, a delivery loop, the API and metrics
//! - `simulate` runs setup, transfer, yield, redeem and withdraw, then
//!   prints a JSON report
//! - `version`  prints build version information

mod api;
mod cli;
mod devnet;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use stake_across_protocol::config::ENVELOPE_LAYOUT_VERSION;

use cli::{Commands, DevnetCli};
use devnet::{Devnet, DevnetConfig};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DevnetCli::parse();

    match cli.command {
        Commands::Run(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);
            run_devnet(args).await
        }
        Commands::Simulate(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);
            run_simulation(args)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens the devnet and serves it until a shutdown signal arrives.
async fn run_devnet(args: cli::RunArgs) -> Result<()> {
    let config = DevnetConfig::load(args.config.as_deref())?;
    let interval = Duration::from_millis(config.delivery_interval_ms.max(1));

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = ?args.data_dir,
        funding_mode = ?config.funding_mode,
        "starting stake-across-devnet"
    );

    let devnet = Arc::new(Devnet::open(config, args.data_dir.as_deref())?);
    devnet
        .setup_if_fresh()
        .context("reference funding failed")?;

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.observe(&devnet);

    let app_state = api::AppState {
        version: format!(
            "{} (envelope layout v{})",
            env!("CARGO_PKG_VERSION"),
            ENVELOPE_LAYOUT_VERSION
        ),
        devnet: Arc::clone(&devnet),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    tracing::info!(addr = %api_addr, "API server listening");

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    // --- Delivery loop ---
    let delivery_loop = if args.manual_delivery {
        tracing::info!("manual delivery: use POST /flush");
        None
    } else {
        let devnet = Arc::clone(&devnet);
        let metrics = Arc::clone(&node_metrics);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reports = devnet.deliver();
                if !reports.is_empty() {
                    metrics.observe(&devnet);
                }
            }
        }))
    };

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "API server error");
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "metrics server error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    if let Some(handle) = delivery_loop {
        handle.abort();
    }
    tracing::info!(in_flight = devnet.router().in_flight(), "stake-across-devnet stopped");
    Ok(())
}

/// Runs the reference flow on a throwaway devnet and prints the report.
fn run_simulation(args: cli::SimulateArgs) -> Result<()> {
    let mut config = DevnetConfig::load(args.config.as_deref())?;
    if let Some(seed) = args.seed {
        config.router.seed = seed;
    }
    if args.reorder {
        config.router.reorder = true;
    }
    if let Some(p) = args.duplicate_probability {
        anyhow::ensure!(
            (0.0..=1.0).contains(&p),
            "duplicate probability must be between 0 and 1, got {p}"
        );
        config.router.duplicate_probability = p;
    }

    let devnet = Devnet::open(config, None)?;
    let report = devnet::simulate(&devnet)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render report")?
    );
    Ok(())
}

fn print_version() {
    println!("stake-across-devnet {}", env!("CARGO_PKG_VERSION"));
    println!("envelope layout     v{ENVELOPE_LAYOUT_VERSION}");
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that signal is never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
