// src/cli/commands.rs
use crate::types::ScoringMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Orax Miner CLI - pool mining client for the Orax orchestrator
#[derive(Parser, Debug)]
#[command(name = "orax-miner-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (mine, run a benchmark, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Connect to the orchestrator and mine until interrupted
    Mine(MineOptions),

    /// Measure the local hash rate
    Bench(BenchOptions),

    /// Generate configuration file template
    Init(InitOptions),
}

/// Options for mining
#[derive(Parser, Debug)]
pub struct MineOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "orax.toml")]
    pub config: PathBuf,

    /// Number of worker threads to use (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Nonce scoring mode (overrides config)
    #[arg(short, long)]
    pub scoring: Option<ScoringMode>,
}

/// Options for running the benchmark
#[derive(Parser, Debug)]
pub struct BenchOptions {
    /// Duration of benchmark in seconds
    #[arg(short, long, default_value_t = 60)]
    pub duration: u64,

    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct InitOptions {
    /// Output file path
    #[arg(short, long, default_value = "orax.toml")]
    pub output: PathBuf,

    /// Miner identifier issued at registration
    #[arg(long, default_value = "")]
    pub miner_id: String,

    /// Miner secret issued at registration
    #[arg(long, default_value = "")]
    pub miner_secret: String,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definitions_are_consistent() {
        Commands::command().debug_assert();
    }

    #[test]
    fn parses_mine_overrides() {
        let cli = Commands::parse_from(["orax-miner-rs", "mine", "-w", "3", "--scoring", "top-k"]);
        match cli.action {
            Action::Mine(opts) => {
                assert_eq!(opts.config, PathBuf::from("orax.toml"));
                assert_eq!(opts.workers, Some(3));
                assert_eq!(opts.scoring, Some(ScoringMode::TopK));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_init_credentials() {
        let cli = Commands::parse_from([
            "orax-miner-rs",
            "init",
            "--miner-id",
            "m-1",
            "--miner-secret",
            "s",
        ]);
        match cli.action {
            Action::Init(opts) => {
                assert_eq!(opts.miner_id, "m-1");
                assert_eq!(opts.miner_secret, "s");
                assert!(!opts.force);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
