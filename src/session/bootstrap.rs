// src/session/bootstrap.rs
//! Local hash-rate benchmark
//!
//! The handshake reports an indicative hash rate. When none has been
//! recorded for the configured worker count yet, a short local session is
//! mined first to measure one.

use crate::config::HashRateStore;
use crate::miner::engine::{MiningEngine, MiningSession};
use rand::Rng;
use std::time::Duration;

/// Nonce prefix of benchmark sessions
pub const BENCHMARK_NONCE_PREFIX: [u8; 2] = [19, 89];

/// Length of the bootstrap benchmark
pub const BOOTSTRAP_DURATION: Duration = Duration::from_secs(60);

/// Random record to mine against
pub fn benchmark_input() -> [u8; 32] {
    let mut opr_hash = [0u8; 32];
    rand::thread_rng().fill(&mut opr_hash[..]);
    opr_hash
}

/// Mines a throwaway record for `duration`, blocking the calling thread
///
/// The target is the maximum difficulty, so no share is expected.
pub fn run_benchmark(engine: &mut MiningEngine, duration: Duration) -> MiningSession {
    engine.mine(benchmark_input(), &BENCHMARK_NONCE_PREFIX, u64::MAX);
    std::thread::sleep(duration);
    engine.stop()
}

/// Measures and records the hash rate if none is known for this worker count
///
/// Must run on a multi-threaded runtime. A failure to persist the result
/// is logged and otherwise ignored.
///
/// # Returns
/// The recorded hash rate, measured or previously stored
pub async fn bootstrap_hash_rate(
    engine: &mut MiningEngine,
    store: &dyn HashRateStore,
    duration: Duration,
) -> i64 {
    let workers = engine.worker_count();
    let known = store.indicative_hash_rate(workers);
    if known > 0 {
        log::info!("Indicative hash rate for {} workers: {} H/s", workers, known);
        return known;
    }

    log::info!(
        "No hash rate recorded for {} workers, benchmarking for {:?}",
        workers,
        duration
    );
    engine.mine(benchmark_input(), &BENCHMARK_NONCE_PREFIX, u64::MAX);
    tokio::time::sleep(duration).await;
    let session = tokio::task::block_in_place(|| engine.stop());

    let rate = session.hash_rate();
    log::info!(
        "Benchmark done: {} hashes in {:?} ({} H/s)",
        session.total_ops,
        session.duration,
        rate
    );
    if let Err(e) = store.save_indicative_hash_rate(workers, session.total_ops, session.duration) {
        log::warn!("Failed to save hash rate: {}", e);
    }
    rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::Sha256Hasher;
    use crate::miner::engine::EngineConfig;
    use crate::session::fakes::MemoryStore;
    use crate::types::ScoringMode;
    use std::sync::Arc;

    fn engine(workers: usize) -> MiningEngine {
        let config = EngineConfig {
            workers,
            scoring: ScoringMode::Target,
            ..EngineConfig::default()
        };
        MiningEngine::new(config, Arc::new(Sha256Hasher)).unwrap()
    }

    #[test]
    fn benchmark_measures_without_shares() {
        let mut engine = engine(2);
        let session = run_benchmark(&mut engine, Duration::from_millis(200));

        assert!(!engine.is_running());
        assert!(session.total_ops > 0);
        assert_eq!(session.nonce_prefix, BENCHMARK_NONCE_PREFIX);
        assert_eq!(session.target, u64::MAX);
        assert!(session.results.nonces().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bootstrap_records_missing_hash_rate() {
        let mut engine = engine(2);
        let store = MemoryStore::default();

        let rate = bootstrap_hash_rate(&mut engine, &store, Duration::from_millis(200)).await;

        assert!(rate > 0);
        assert_eq!(store.indicative_hash_rate(2), rate);
        assert!(!engine.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bootstrap_skipped_when_rate_is_known() {
        let mut engine = engine(2);
        let store = MemoryStore::default();
        store
            .save_indicative_hash_rate(2, 1_234, Duration::from_secs(1))
            .unwrap();

        let rate = bootstrap_hash_rate(&mut engine, &store, Duration::from_secs(3600)).await;

        assert_eq!(rate, 1_234);
        assert_eq!(store.saves(), 1);
    }
}
