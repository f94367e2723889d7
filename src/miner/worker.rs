// src/miner/worker.rs
//! Worker thread implementation
//!
//! Each worker hashes `opr hash ‖ nonce prefix ‖ worker id ‖ counter` for
//! an ever increasing counter. The worker id sits at the same offset for
//! every worker, so the nonce spaces of two workers never overlap, no
//! matter how many bytes the counter grows to.

use crate::miner::best::BestNonces;
use crate::miner::hasher::{Hasher, difficulty};
use crate::types::Nonce;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

/// Where a worker puts the nonces it keeps
pub enum WorkerOutput {
    /// Target mode: every share goes to the session collector immediately
    Shares(Sender<Nonce>),
    /// Legacy mode: the worker keeps its own best list until joined
    Best(BestNonces),
}

/// What a worker hands back to the engine once joined
#[derive(Debug, Default)]
pub struct WorkerReport {
    /// Worker identifier
    pub id: u16,
    /// Number of hashes computed
    pub ops: u64,
    /// Best nonces, sorted best first (legacy mode only)
    pub best: Vec<Nonce>,
}

/// Worker thread that performs mining computations
///
/// All counters and the best list are owned by the worker thread and only
/// reach the engine through the [`WorkerReport`] returned on join.
pub struct Worker {
    /// Worker identifier, embedded in every nonce
    id: u16,
    /// Hash function shared by all workers
    hasher: Arc<dyn Hasher>,
    /// `opr hash ‖ nonce prefix ‖ id`, counter bytes are appended to it
    input: Vec<u8>,
    /// Offset of the nonce inside `input`
    nonce_offset: usize,
    /// Minimum difficulty of a share, reloaded between batches
    target: Arc<AtomicU64>,
    /// Set by the engine to stop the worker
    stop: Arc<AtomicBool>,
    /// Number of candidates hashed between two stop checks
    batch_size: u64,
    /// Share sink or best list
    output: WorkerOutput,
}

/// Engine-side handle on a running worker
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    /// Asks the worker to stop after its current batch, does not wait
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Waits for the worker thread to exit and takes its report
    pub fn join(self) -> WorkerReport {
        match self.thread.join() {
            Ok(report) => report,
            Err(_) => {
                log::error!("Mining worker panicked, its results are lost");
                WorkerReport::default()
            }
        }
    }
}

impl Worker {
    /// Creates a new Worker
    ///
    /// # Arguments
    /// * `id` - Worker identifier, unique within the engine
    /// * `hasher` - Hash function to use
    /// * `opr_hash` - The record being mined
    /// * `nonce_prefix` - Prefix assigned by the orchestrator for this connection
    /// * `target` - Shared share target
    /// * `batch_size` - Candidates hashed between stop checks
    /// * `output` - Where kept nonces go
    pub fn new(
        id: u16,
        hasher: Arc<dyn Hasher>,
        opr_hash: &[u8],
        nonce_prefix: &[u8],
        target: Arc<AtomicU64>,
        batch_size: u64,
        output: WorkerOutput,
    ) -> Self {
        let mut input = Vec::with_capacity(opr_hash.len() + nonce_prefix.len() + 2 + 8);
        input.extend_from_slice(opr_hash);
        input.extend_from_slice(nonce_prefix);
        input.extend_from_slice(&id.to_be_bytes());

        Worker {
            id,
            hasher,
            input,
            nonce_offset: opr_hash.len(),
            target,
            stop: Arc::new(AtomicBool::new(false)),
            batch_size: batch_size.max(1),
            output,
        }
    }

    /// Starts the worker on its own thread
    pub fn spawn(self) -> WorkerHandle {
        let stop = self.stop.clone();
        let thread = std::thread::spawn(move || self.run());
        WorkerHandle { stop, thread }
    }

    /// Mining loop, runs until the stop flag is raised
    pub fn run(mut self) -> WorkerReport {
        let base_len = self.input.len();
        let mut counter: u64 = 0;
        let mut ops: u64 = 0;

        'mining: while !self.stop.load(Ordering::Acquire) {
            let target = self.target.load(Ordering::Relaxed);

            for _ in 0..self.batch_size {
                self.input.truncate(base_len);
                encode_counter(counter, &mut self.input);

                let digest = self.hasher.hash(&self.input);
                let diff = difficulty(&digest);
                ops += 1;

                match &mut self.output {
                    WorkerOutput::Shares(sender) => {
                        if diff >= target {
                            let nonce = Nonce::new(self.input[self.nonce_offset..].to_vec(), diff);
                            if sender.send(nonce).is_err() {
                                log::error!("Worker {}: share collector is gone", self.id);
                                break 'mining;
                            }
                        }
                    }
                    WorkerOutput::Best(best) => {
                        let nonce = &self.input[self.nonce_offset..];
                        best.insert_with(diff, || nonce.to_vec());
                    }
                }

                counter = match counter.checked_add(1) {
                    Some(next) => next,
                    None => {
                        log::warn!("Worker {}: nonce space exhausted", self.id);
                        break 'mining;
                    }
                };
            }
        }

        let best = match self.output {
            WorkerOutput::Best(best) => best.into_sorted_vec(),
            WorkerOutput::Shares(_) => Vec::new(),
        };

        WorkerReport {
            id: self.id,
            ops,
            best,
        }
    }
}

/// Appends `counter` little-endian using as few bytes as possible
///
/// Zero is one byte; the encoding grows by one byte each time the counter
/// crosses a power of 256. Distinct counters always give distinct bytes.
pub fn encode_counter(mut counter: u64, out: &mut Vec<u8>) {
    loop {
        out.push(counter as u8);
        counter >>= 8;
        if counter == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::hasher::Sha256Hasher;

    fn encoded(counter: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode_counter(counter, &mut out);
        out
    }

    #[test]
    fn counter_extends_on_overflow() {
        assert_eq!(encoded(0), vec![0]);
        assert_eq!(encoded(255), vec![255]);
        assert_eq!(encoded(256), vec![0, 1]);
        assert_eq!(encoded(0x01_0000), vec![0, 0, 1]);
        assert_eq!(encoded(u64::MAX), vec![0xff; 8]);
    }

    #[test]
    fn worker_stops_and_reports_best_nonces() {
        let target = Arc::new(AtomicU64::new(0));
        let worker = Worker::new(
            7,
            Arc::new(Sha256Hasher),
            &[0u8; 32],
            &[0xaa],
            target,
            16,
            WorkerOutput::Best(BestNonces::new(4)),
        );
        let handle = worker.spawn();
        std::thread::sleep(std::time::Duration::from_millis(20));
        handle.signal_stop();
        let report = handle.join();

        assert_eq!(report.id, 7);
        assert!(report.ops >= 16);
        assert_eq!(report.best.len(), 4);
        for nonce in &report.best {
            // prefix ‖ worker id
            assert_eq!(&nonce.bytes[..3], &[0xaa, 0x00, 0x07]);
        }
        assert!(report.best.windows(2).all(|w| w[0].difficulty >= w[1].difficulty));
    }
}
