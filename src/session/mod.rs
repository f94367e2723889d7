// src/session/mod.rs
//! Mining sessions driven by the orchestrator
//!
//! Ties the mining engine to the protocol client:
//! - `bootstrap`: measures a hash rate before the first connection
//! - `orchestrator`: reacts to orchestrator messages and connection events

/// Initial hash-rate benchmark
pub mod bootstrap;

/// Event loop between the protocol client and the mining engine
pub mod orchestrator;

pub use bootstrap::{bootstrap_hash_rate, run_benchmark};
pub use orchestrator::{SessionOrchestrator, Uplink};

use crate::config::HashRateStore;
use crate::miner::MiningEngine;
use crate::network::{Credentials, ProtocolClient, RetryPolicy, WsDialer};
use crate::utils::error::MinerError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Connection parameters of [`run_client`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Orchestrator WebSocket endpoint
    pub endpoint: String,
    /// Miner id and secret
    pub credentials: Credentials,
    /// Reconnection policy
    pub retry: RetryPolicy,
    /// Length of the initial benchmark, when one is needed
    pub bootstrap_duration: Duration,
}

/// Runs the mining client until `stop` resolves or the orchestrator closes
/// the connection
///
/// 1. Measures a hash rate if none is recorded for the engine's worker count
/// 2. Connects to the orchestrator
/// 3. Mines the sessions it requests
/// 4. On stop, submits the running session and disconnects gracefully
///
/// Must run on a multi-threaded runtime.
///
/// # Errors
/// Returns `MinerError::HandshakeRejected` if the orchestrator refuses the
/// miner for good
pub async fn run_client<F>(
    mut engine: MiningEngine,
    store: Arc<dyn HashRateStore>,
    settings: ClientSettings,
    stop: F,
) -> Result<(), MinerError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(stop);

    tokio::select! {
        _ = bootstrap_hash_rate(&mut engine, store.as_ref(), settings.bootstrap_duration) => {}
        _ = &mut stop => {
            log::info!("Stop requested during the benchmark");
            if engine.is_running() {
                tokio::task::block_in_place(|| engine.stop());
            }
            return Ok(());
        }
    }

    let dialer = WsDialer::new(settings.credentials, store.clone(), engine.worker_count());
    let (client, events) = ProtocolClient::start(dialer, settings.endpoint, settings.retry);

    let mut orchestrator = SessionOrchestrator::new(engine, client.handle(), store);
    orchestrator.run(events, stop).await;

    client.stop().await?;
    log::info!("Disconnected from orchestrator");
    Ok(())
}

#[cfg(test)]
pub(crate) mod fakes {
    use crate::config::HashRateStore;
    use crate::miner::Hasher;
    use crate::miner::engine::hash_rate;
    use crate::utils::error::MinerError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory hash rate store counting its saves
    #[derive(Default)]
    pub struct MemoryStore {
        rates: Mutex<BTreeMap<usize, i64>>,
        saves: Mutex<usize>,
    }

    impl MemoryStore {
        pub fn saves(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    impl HashRateStore for MemoryStore {
        fn indicative_hash_rate(&self, workers: usize) -> i64 {
            self.rates.lock().unwrap().get(&workers).copied().unwrap_or(0)
        }

        fn save_indicative_hash_rate(
            &self,
            workers: usize,
            total_ops: u64,
            duration: Duration,
        ) -> Result<i64, MinerError> {
            let rate = hash_rate(total_ops, duration);
            self.rates.lock().unwrap().insert(workers, rate);
            *self.saves.lock().unwrap() += 1;
            Ok(rate)
        }
    }

    /// Takes about a millisecond per hash and always yields the same difficulty
    pub struct SlowHasher {
        digest: [u8; 32],
    }

    impl SlowHasher {
        pub fn new(difficulty: u64) -> Self {
            let mut digest = [0u8; 32];
            digest[..8].copy_from_slice(&difficulty.to_be_bytes());
            SlowHasher { digest }
        }
    }

    impl Hasher for SlowHasher {
        fn hash(&self, _data: &[u8]) -> [u8; 32] {
            std::thread::sleep(Duration::from_millis(1));
            self.digest
        }
    }
}
