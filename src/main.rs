// src/main.rs
use clap::Parser;
use orax_miner_rs::config::{ConfigStore, ENDPOINT_ENV};
use orax_miner_rs::miner::{EngineConfig, MiningEngine, Sha256Hasher};
use orax_miner_rs::network::{Credentials, RetryPolicy};
use orax_miner_rs::session::{ClientSettings, bootstrap::BOOTSTRAP_DURATION, run_benchmark};
use orax_miner_rs::utils::init_bench_logging;
use orax_miner_rs::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Main entry point for the Orax miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Mine(opts) => start_mining(opts),
        cli::Action::Bench(opts) => run_bench(opts),
        cli::Action::Init(opts) => generate_config(opts),
    }
}

/// Starts the mining client with given configuration options
///
/// # Arguments
/// * `opts` - Command line options for mining operation
///
/// # Operations
/// 1. Initializes logging
/// 2. Resolves the orchestrator endpoint and loads the configuration
/// 3. Builds the mining engine
/// 4. Runs the client until Ctrl-C or a graceful close from the orchestrator
fn start_mining(opts: cli::MineOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let store = Arc::new(ConfigStore::load(&opts.config)?);
    let mut config = store.config();
    let env_endpoint = std::env::var(ENDPOINT_ENV).ok();
    let endpoint = config::resolve_endpoint(
        env_endpoint.as_deref(),
        config.orchestrator_endpoint.as_deref(),
    )?;

    if !config.has_credentials() {
        return Err(MinerError::ConfigError(format!(
            "No miner credentials in {}, run `init` first",
            opts.config.display()
        )));
    }

    // Apply CLI overrides
    if let Some(workers) = opts.workers {
        config.worker_threads = workers;
    }
    if let Some(scoring) = opts.scoring {
        config.scoring = scoring;
    }

    let engine = MiningEngine::new(config.engine_config(), Arc::new(Sha256Hasher))?;
    log::info!(
        "Orax miner v{} with {} workers ({} scoring), orchestrator {}",
        env!("CARGO_PKG_VERSION"),
        engine.worker_count(),
        engine.scoring(),
        endpoint
    );

    let settings = ClientSettings {
        endpoint,
        credentials: Credentials {
            miner_id: config.miner_id,
            miner_secret: config.miner_secret,
        },
        retry: RetryPolicy::default(),
        bootstrap_duration: BOOTSTRAP_DURATION,
    };

    // Runtime setup
    let rt = Runtime::new()?;
    rt.block_on(session::run_client(engine, store, settings, ctrl_c()))
}

/// Resolves on the first Ctrl-C
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Runs the local hash rate benchmark
///
/// # Arguments
/// * `opts` - Benchmark configuration options
fn run_bench(opts: cli::BenchOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let config = EngineConfig {
        workers: opts.threads,
        ..EngineConfig::default()
    };
    let mut engine = MiningEngine::new(config, Arc::new(Sha256Hasher))?;

    log::info!(
        "Starting benchmark with {} threads for {} seconds",
        opts.threads,
        opts.duration
    );
    let session = run_benchmark(&mut engine, Duration::from_secs(opts.duration));

    // Report final results
    log::info!("Benchmark results:");
    log::info!("Total hashes: {}", session.total_ops);
    log::info!("Duration: {:?}", session.duration);
    log::info!("Average hashrate: {} H/s", session.hash_rate());
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::InitOptions) -> Result<(), MinerError> {
    if opts.output.exists() && !opts.force {
        return Err(MinerError::InputError(format!(
            "{} already exists, use --force to overwrite it",
            opts.output.display()
        )));
    }
    let config = config::generate_template(&opts.miner_id, &opts.miner_secret);
    std::fs::write(&opts.output, config)?;
    println!("Configuration written to {}", opts.output.display());
    Ok(())
}
