// src/session/orchestrator.rs
//! Session orchestration
//!
//! Turns orchestrator messages and connection events into mining engine
//! calls. Events are handled one at a time, so session state transitions
//! never race with each other. A final submission delayed by its jitter is
//! kept as loop state, so stop requests and connection events are still
//! handled while it waits.

use crate::config::HashRateStore;
use crate::miner::engine::{MiningEngine, MiningSession, NonceClaimer};
use crate::network::client::{ClientEvent, ClientHandle};
use crate::network::handshake::ConnectionInfo;
use crate::protocol::{Message, MinerSubmission};
use crate::types::{Nonce, ScoringMode};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Shortest accepted interval between batch claims
const MIN_BATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Outbound side of the orchestrator connection
pub trait Uplink: Clone + Send + Sync + 'static {
    /// Queues a frame, never blocks
    fn send(&self, frame: Vec<u8>);

    /// True while connected to the orchestrator
    fn is_connected(&self) -> bool;
}

impl Uplink for ClientHandle {
    fn send(&self, frame: Vec<u8>) {
        ClientHandle::send(self, frame)
    }

    fn is_connected(&self) -> bool {
        ClientHandle::is_connected(self)
    }
}

/// Drives the mining engine from orchestrator events
pub struct SessionOrchestrator<U: Uplink> {
    engine: MiningEngine,
    uplink: U,
    hash_rates: Arc<dyn HashRateStore>,
    connection: ConnectionInfo,
    target: u64,
    claiming: Option<JoinHandle<()>>,
    pending: Option<(Instant, MinerSubmission)>,
}

impl<U: Uplink> SessionOrchestrator<U> {
    /// Creates an orchestrator owning `engine`
    ///
    /// # Arguments
    /// * `engine` - Idle mining engine
    /// * `uplink` - Where submissions are sent
    /// * `hash_rates` - Receives the hash rate measured by each session
    pub fn new(engine: MiningEngine, uplink: U, hash_rates: Arc<dyn HashRateStore>) -> Self {
        SessionOrchestrator {
            engine,
            uplink,
            hash_rates,
            connection: ConnectionInfo::default(),
            target: 0,
            claiming: None,
            pending: None,
        }
    }

    /// The mining engine
    pub fn engine(&self) -> &MiningEngine {
        &self.engine
    }

    /// Target applied to new sessions
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Handles events until `stop` resolves or the client goes away
    ///
    /// On exit the running session, if any, is stopped and submitted when
    /// still connected. A submission still waiting for its jitter is sent
    /// right away.
    pub async fn run<F>(&mut self, mut events: mpsc::Receiver<ClientEvent>, stop: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);

        loop {
            let due = self.pending.as_ref().map(|(due, _)| *due);
            tokio::select! {
                _ = time::sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                    self.send_pending();
                }
                _ = &mut stop => {
                    log::info!("Stop requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        log::info!("Protocol client stopped");
                        break;
                    }
                },
            }
        }

        self.shutdown().await;
    }

    /// Handles one client event
    pub async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected(info) => {
                self.target = info.target;
                self.connection = info;
            }
            ClientEvent::Disconnected => self.on_disconnected(),
            ClientEvent::Received(frame) => self.handle_frame(&frame).await,
        }
    }

    async fn handle_frame(&mut self, frame: &[u8]) {
        match Message::decode(frame) {
            Ok(Message::StartMining { opr_hash }) => self.start_mining(opr_hash),
            Ok(Message::SubmissionWindowClosing { deadline }) => {
                let max_jitter = Duration::from_secs(u64::from(deadline)) / 2;
                self.close_submission_window(max_jitter);
            }
            Ok(Message::SetTarget { target }) => {
                log::info!("New target: {:016x}", target);
                self.target = target;
                self.engine.set_target(target);
            }
            Ok(message) => log::warn!("Ignoring unexpected {} message", message.kind()),
            Err(e) => log::error!("Failed to decode message: {}", e),
        }
    }

    fn start_mining(&mut self, opr_hash: [u8; 32]) {
        if self.engine.is_running() {
            log::warn!("Stopping a stalled mining session");
            self.stop_claiming();
            let session = self.stop_engine();
            log_session(&session);
        }

        self.engine
            .mine(opr_hash, &self.connection.nonce_prefix, self.target);

        if self.engine.scoring() == ScoringMode::Target {
            self.claiming = Some(tokio::spawn(claim_batches(
                self.engine.claimer(),
                self.uplink.clone(),
                opr_hash,
                self.connection.initial_batch_delay,
                self.connection.batching_duration,
            )));
        }
    }

    fn close_submission_window(&mut self, max_jitter: Duration) {
        self.stop_claiming();
        if !self.engine.is_running() {
            log::warn!("Submission window closing without a running mining session");
            return;
        }

        let session = self.stop_engine();
        log_session(&session);
        self.save_hash_rate(&session);
        let Some(submission) = final_submission(&session) else {
            return;
        };

        // A window closing before the previous submission went out
        self.send_pending();

        let jitter = random_jitter(max_jitter);
        if jitter.is_zero() {
            send_submission(&self.uplink, submission);
        } else {
            log::debug!("Waiting {:?} before submitting", jitter);
            self.pending = Some((Instant::now() + jitter, submission));
        }
    }

    fn on_disconnected(&mut self) {
        self.stop_claiming();
        if self.pending.take().is_some() {
            log::warn!("Connection lost, dropping the pending submission");
        }
        if self.engine.is_running() {
            log::warn!("Connection lost, dropping the current mining session");
            let session = self.stop_engine();
            log_session(&session);
        }
    }

    async fn shutdown(&mut self) {
        self.stop_claiming();
        let connected = self.uplink.is_connected();
        if connected {
            self.send_pending();
        } else if self.pending.take().is_some() {
            log::warn!("Not connected, dropping the pending submission");
        }

        if !self.engine.is_running() {
            return;
        }
        let session = self.stop_engine();
        log_session(&session);
        if connected {
            if let Some(submission) = final_submission(&session) {
                send_submission(&self.uplink, submission);
            }
        }
        self.save_hash_rate(&session);
    }

    fn send_pending(&mut self) {
        if let Some((_, submission)) = self.pending.take() {
            send_submission(&self.uplink, submission);
        }
    }

    fn save_hash_rate(&self, session: &MiningSession) {
        let workers = self.engine.worker_count();
        match self
            .hash_rates
            .save_indicative_hash_rate(workers, session.total_ops, session.duration)
        {
            Ok(rate) => log::debug!("Saved hash rate of {} H/s for {} workers", rate, workers),
            Err(e) => log::warn!("Failed to save hash rate: {}", e),
        }
    }

    fn stop_engine(&mut self) -> MiningSession {
        // Joining the workers blocks for up to one hashing batch
        tokio::task::block_in_place(|| self.engine.stop())
    }

    fn stop_claiming(&mut self) {
        if let Some(task) = self.claiming.take() {
            task.abort();
        }
    }
}

impl<U: Uplink> Drop for SessionOrchestrator<U> {
    fn drop(&mut self) {
        self.stop_claiming();
    }
}

/// Forwards buffered shares while the session keeps mining
///
/// First claim after `initial_delay`, then one every `interval`.
async fn claim_batches<U: Uplink>(
    claimer: NonceClaimer,
    uplink: U,
    opr_hash: [u8; 32],
    initial_delay: Duration,
    interval: Duration,
) {
    let interval = interval.max(MIN_BATCH_INTERVAL);
    let mut ticks = time::interval_at(Instant::now() + initial_delay, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        if !claimer.is_running() {
            return;
        }
        if !uplink.is_connected() {
            log::debug!("Not connected, keeping shares buffered");
            continue;
        }

        let nonces = claimer.claim();
        if nonces.is_empty() {
            continue;
        }
        log::info!("Submitting batch of {} shares", nonces.len());
        send_submission(
            &uplink,
            MinerSubmission {
                opr_hash,
                nonces,
                op_count: 0,
                duration_ns: 0,
            },
        );
    }
}

/// Session totals and shares, `None` when there is nothing to submit
fn final_submission(session: &MiningSession) -> Option<MinerSubmission> {
    let nonces = session.results.nonces();
    if nonces.is_empty() {
        log::info!("No nonces to submit");
        return None;
    }

    Some(MinerSubmission {
        opr_hash: session.opr_hash,
        nonces: nonces.to_vec(),
        op_count: session.total_ops,
        duration_ns: u64::try_from(session.duration.as_nanos()).unwrap_or(u64::MAX),
    })
}

fn send_submission<U: Uplink>(uplink: &U, submission: MinerSubmission) {
    match Message::MinerSubmission(submission).encode() {
        Ok(frame) => uplink.send(frame),
        Err(e) => log::error!("Failed to encode submission: {}", e),
    }
}

fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..=max)
}

fn log_session(session: &MiningSession) {
    let best = session.results.nonces().first();
    log::info!(
        "Mining session ended: oprHash={} duration={:?} ops={} shares={} hashRate={} H/s best={}",
        hex::encode(session.opr_hash),
        session.duration,
        session.total_ops,
        session.total_shares,
        session.hash_rate(),
        best.map(|n: &Nonce| format!("{:016x}", n.difficulty))
            .unwrap_or_else(|| "none".into())
    );
}
