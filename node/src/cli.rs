//! # CLI Interface
//!
//! Command-line structure of `stake-across-devnet`, built with `clap`
//! derive. Three subcommands: `run`, `simulate` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Stake Across devnet.
///
/// Runs a Fuji sender and a Sepolia vault in one process, joined by an
/// in-memory cross-chain router, and serves an HTTP API and Prometheus
/// metrics over them.
#[derive(Parser, Debug)]
#[command(
    name = "stake-across-devnet",
    about = "Stake Across two-chain devnet",
    version,
    propagate_version = true
)]
pub struct DevnetCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "STAKE_ACROSS_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the devnet and serve its API until interrupted.
    Run(RunArgs),
    /// Run the reference flow once (setup, transfer, yield, redeem,
    /// withdraw) and print a JSON report.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Devnet configuration file (TOML). Defaults apply when omitted.
    #[arg(long, short = 'c', env = "STAKE_ACROSS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for the two message ledgers. When omitted the ledgers are
    /// temporary and vanish on exit.
    #[arg(long, short = 'd', env = "STAKE_ACROSS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Port for the REST API.
    #[arg(long, env = "STAKE_ACROSS_API_PORT", default_value_t = 8545)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "STAKE_ACROSS_METRICS_PORT", default_value_t = 9545)]
    pub metrics_port: u16,

    /// Leave the router queue alone; deliveries happen only through
    /// `POST /flush`.
    #[arg(long)]
    pub manual_delivery: bool,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Devnet configuration file (TOML). Defaults apply when omitted.
    #[arg(long, short = 'c', env = "STAKE_ACROSS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides the router seed from the configuration.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Deliver messages in random order.
    #[arg(long)]
    pub reorder: bool,

    /// Chance of delivering an applied message a second time.
    #[arg(long)]
    pub duplicate_probability: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        DevnetCli::command().debug_assert();
    }

    #[test]
    fn parses_simulate_flags() {
        let cli = DevnetCli::parse_from([
            "stake-across-devnet",
            "--log-format",
            "json",
            "simulate",
            "--seed",
            "7",
            "--reorder",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.seed, Some(7));
                assert!(args.reorder);
                assert!(args.duplicate_probability.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
