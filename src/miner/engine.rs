// src/miner/engine.rs
//! Mining engine
//!
//! Owns the worker pool for one mining session at a time. The engine is
//! either idle or running:
//!
//! ```text
//! Idle --mine()--> Running --stop()--> Idle
//! ```
//!
//! Calling [`MiningEngine::mine`] while running or [`MiningEngine::stop`]
//! while idle is a bug in the caller and panics.

use crate::miner::best::{BestNonces, merge_best};
use crate::miner::buffer::NonceBuffer;
use crate::miner::hasher::Hasher;
use crate::miner::worker::{Worker, WorkerHandle, WorkerOutput};
use crate::types::{Nonce, ScoringMode};
use crate::utils::error::MinerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

/// Default number of candidates a worker hashes between stop checks
pub const DEFAULT_BATCH_SIZE: u64 = 256;

/// Default capacity of the best list in top-K mode
pub const DEFAULT_MAX_NONCES: usize = 300;

/// Static engine parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker threads
    pub workers: usize,
    /// How nonces are kept
    pub scoring: ScoringMode,
    /// Best list capacity in top-K mode
    pub max_nonces: usize,
    /// Candidates hashed between stop checks
    pub batch_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            workers: num_cpus::get(),
            scoring: ScoringMode::Target,
            max_nonces: DEFAULT_MAX_NONCES,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Results of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResults {
    /// Target mode: shares still buffered when the session stopped
    Shares(Vec<Nonce>),
    /// Top-K mode: best nonces of all workers, best first
    BestNonces(Vec<Nonce>),
}

impl SessionResults {
    /// The nonces, whatever the mode
    pub fn nonces(&self) -> &[Nonce] {
        match self {
            SessionResults::Shares(n) | SessionResults::BestNonces(n) => n,
        }
    }

    /// Takes the nonces out
    pub fn into_nonces(self) -> Vec<Nonce> {
        match self {
            SessionResults::Shares(n) | SessionResults::BestNonces(n) => n,
        }
    }
}

/// A finished mining session, as returned by [`MiningEngine::stop`]
#[derive(Debug, Clone)]
pub struct MiningSession {
    /// Record that was mined
    pub opr_hash: [u8; 32],
    /// Connection nonce prefix used by the workers
    pub nonce_prefix: Vec<u8>,
    /// Target at session start
    pub target: u64,
    /// Wall clock start
    pub start_time: SystemTime,
    /// Wall clock end
    pub end_time: SystemTime,
    /// Time spent mining
    pub duration: Duration,
    /// Hashes computed by all workers
    pub total_ops: u64,
    /// Shares found during the whole session (target mode)
    pub total_shares: u64,
    /// Kept nonces
    pub results: SessionResults,
}

impl MiningSession {
    /// Hashes per second over the session, truncated
    pub fn hash_rate(&self) -> i64 {
        hash_rate(self.total_ops, self.duration)
    }
}

/// Hashes per second for `total_ops` hashes done in `duration`
pub fn hash_rate(total_ops: u64, duration: Duration) -> i64 {
    let secs = duration.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    (total_ops as f64 / secs) as i64
}

/// Cheap handle used to claim buffered shares while mining continues
#[derive(Clone)]
pub struct NonceClaimer {
    buffer: Arc<NonceBuffer>,
    running: Arc<AtomicBool>,
}

impl NonceClaimer {
    /// True while a session is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Drains the rolling buffer, empty when no session is running
    pub fn claim(&self) -> Vec<Nonce> {
        if !self.is_running() {
            return Vec::new();
        }
        self.buffer.drain()
    }
}

struct ActiveSession {
    opr_hash: [u8; 32],
    nonce_prefix: Vec<u8>,
    target: u64,
    start_time: SystemTime,
    started: Instant,
    workers: Vec<WorkerHandle>,
    collector: Option<JoinHandle<u64>>,
}

/// Coordinates a fixed pool of mining workers
pub struct MiningEngine {
    config: EngineConfig,
    hasher: Arc<dyn Hasher>,
    target: Arc<AtomicU64>,
    buffer: Arc<NonceBuffer>,
    running: Arc<AtomicBool>,
    active: Option<ActiveSession>,
}

impl MiningEngine {
    /// Creates an idle engine
    ///
    /// # Arguments
    /// * `config` - Worker count and scoring parameters
    /// * `hasher` - Hash function shared by all workers
    ///
    /// # Errors
    /// Returns `MinerError::EngineError` if the worker count is zero or
    /// does not fit the 16-bit worker id, or if top-K mode has no capacity.
    pub fn new(config: EngineConfig, hasher: Arc<dyn Hasher>) -> Result<Self, MinerError> {
        if config.workers == 0 {
            return Err(MinerError::EngineError("At least one worker is required".into()));
        }
        if config.workers > usize::from(u16::MAX) + 1 {
            return Err(MinerError::EngineError(format!(
                "Too many workers: {}",
                config.workers
            )));
        }
        if config.scoring == ScoringMode::TopK && config.max_nonces == 0 {
            return Err(MinerError::EngineError("max_nonces must be positive".into()));
        }

        Ok(MiningEngine {
            config,
            hasher,
            target: Arc::new(AtomicU64::new(0)),
            buffer: Arc::new(NonceBuffer::new()),
            running: Arc::new(AtomicBool::new(false)),
            active: None,
        })
    }

    /// Number of worker threads per session
    pub fn worker_count(&self) -> usize {
        self.config.workers
    }

    /// Scoring mode of this engine
    pub fn scoring(&self) -> ScoringMode {
        self.config.scoring
    }

    /// True between [`mine`](Self::mine) and [`stop`](Self::stop)
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Handle for periodic batch claiming
    pub fn claimer(&self) -> NonceClaimer {
        NonceClaimer {
            buffer: self.buffer.clone(),
            running: self.running.clone(),
        }
    }

    /// Changes the share target, running workers pick it up on their next batch
    pub fn set_target(&self, target: u64) {
        self.target.store(target, Ordering::Relaxed);
    }

    /// Starts a mining session
    ///
    /// Every worker gets the static prefix `opr_hash ‖ nonce_prefix ‖ worker id`.
    ///
    /// # Panics
    /// Panics if a session is already running.
    pub fn mine(&mut self, opr_hash: [u8; 32], nonce_prefix: &[u8], target: u64) {
        if self.active.is_some() {
            panic!("Tried to run an already running mining engine");
        }

        self.target.store(target, Ordering::Relaxed);
        self.buffer.drain();

        let (share_sender, collector) = match self.config.scoring {
            ScoringMode::Target => {
                let (tx, rx) = crossbeam_channel::unbounded::<Nonce>();
                let buffer = self.buffer.clone();
                let collector = std::thread::spawn(move || {
                    let mut shares = 0u64;
                    for nonce in rx {
                        shares += 1;
                        buffer.push(nonce);
                    }
                    shares
                });
                (Some(tx), Some(collector))
            }
            ScoringMode::TopK => (None, None),
        };

        let workers = (0..self.config.workers)
            .map(|id| {
                let output = match &share_sender {
                    Some(tx) => WorkerOutput::Shares(tx.clone()),
                    None => WorkerOutput::Best(BestNonces::new(self.config.max_nonces)),
                };
                Worker::new(
                    id as u16,
                    self.hasher.clone(),
                    &opr_hash,
                    nonce_prefix,
                    self.target.clone(),
                    self.config.batch_size,
                    output,
                )
                .spawn()
            })
            .collect();
        // Workers now hold the only senders: the collector ends once they are joined.
        drop(share_sender);

        self.active = Some(ActiveSession {
            opr_hash,
            nonce_prefix: nonce_prefix.to_vec(),
            target,
            start_time: SystemTime::now(),
            started: Instant::now(),
            workers,
            collector,
        });
        self.running.store(true, Ordering::Release);

        log::info!(
            "Starting mining session: workers={} scoring={} oprHash={} noncePrefix={} target={:016x}",
            self.config.workers,
            self.config.scoring,
            hex::encode(opr_hash),
            hex::encode(nonce_prefix),
            target
        );
    }

    /// Drains the rolling share buffer without stopping the session
    ///
    /// Returns an empty list when idle.
    pub fn read_nonce_buffer(&self) -> Vec<Nonce> {
        self.claimer().claim()
    }

    /// Stops the running session and returns its results
    ///
    /// Signals every worker, then blocks until all of them have exited.
    /// Aggregation only starts once the last worker is joined.
    ///
    /// # Panics
    /// Panics if no session is running.
    pub fn stop(&mut self) -> MiningSession {
        let Some(active) = self.active.take() else {
            panic!("Tried to stop a non-running mining engine");
        };
        self.running.store(false, Ordering::Release);

        for worker in &active.workers {
            worker.signal_stop();
        }
        let reports: Vec<_> = active.workers.into_iter().map(WorkerHandle::join).collect();
        let duration = active.started.elapsed();

        let total_ops = reports.iter().map(|r| r.ops).sum();
        let (total_shares, results) = match active.collector {
            Some(collector) => {
                let shares = collector.join().unwrap_or_else(|_| {
                    log::error!("Share collector panicked");
                    0
                });
                (shares, SessionResults::Shares(self.buffer.drain()))
            }
            None => {
                let best = merge_best(reports.into_iter().map(|r| r.best), self.config.max_nonces);
                (best.len() as u64, SessionResults::BestNonces(best))
            }
        };

        MiningSession {
            opr_hash: active.opr_hash,
            nonce_prefix: active.nonce_prefix,
            target: active.target,
            start_time: active.start_time,
            end_time: SystemTime::now(),
            duration,
            total_ops,
            total_shares,
            results,
        }
    }
}

impl Drop for MiningEngine {
    fn drop(&mut self) {
        if self.active.is_some() {
            self.stop();
        }
    }
}
