// src/network/client.rs

//! Orchestrator protocol client
//!
//! Keeps one WebSocket connection to the orchestrator alive:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected (abnormal close, reconnect)
//!                                         -> Closing -> Closed (stop or close code 1000)
//! ```
//!
//! A supervisor task runs the connect/retry loop and, once connected, a
//! read pump and a write pump. Inbound frames and connection changes are
//! delivered as [`ClientEvent`]s; outbound frames go through a bounded
//! queue and are dropped when it is full, never blocking the caller.
//! Frames queued before a stop request are flushed ahead of the close frame.

use crate::network::backoff::{Backoff, RetryPolicy};
use crate::network::handshake::{ConnectionInfo, DialError, Dialer};
use crate::utils::error::MinerError;
use arc_swap::ArcSwapOption;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant};
use tungstenite::{
    Error as WsError,
    protocol::{CloseFrame, Message as WsMessage, frame::coding::CloseCode},
};

/// Keep-alive ping period
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for the peer to acknowledge our close frame
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const OUTBOUND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 64;

/// Notifications from the protocol client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake succeeded with these mining parameters
    Connected(ConnectionInfo),
    /// The connection was lost, a reconnection is under way
    Disconnected,
    /// Binary frame received from the orchestrator
    Received(Vec<u8>),
}

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    connection: ArcSwapOption<ConnectionInfo>,
}

/// Cloneable sending side of the protocol client
#[derive(Clone)]
pub struct ClientHandle {
    outbound: mpsc::Sender<Vec<u8>>,
    shared: Arc<Shared>,
}

impl ClientHandle {
    /// Queues a frame for sending
    ///
    /// Never waits: when the queue is full or the client has stopped the
    /// frame is dropped and logged.
    pub fn send(&self, frame: Vec<u8>) {
        match self.outbound.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::warn!("Outbound queue full, dropping message"),
            Err(TrySendError::Closed(_)) => log::warn!("Protocol client stopped, dropping message"),
        }
    }

    /// True while a connection is established
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Parameters of the latest successful handshake
    pub fn connection_info(&self) -> Option<Arc<ConnectionInfo>> {
        self.shared.connection.load_full()
    }
}

/// Client for communicating with the orchestrator
///
/// Handles all connection lifecycle concerns:
/// - Authentication handshake with retry, backoff and redirection
/// - Reconnection after abnormal disconnects
/// - Keepalive pings
/// - Graceful shutdown
pub struct ProtocolClient {
    handle: ClientHandle,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), MinerError>>,
}

impl ProtocolClient {
    /// Starts the client in the background
    ///
    /// # Arguments
    /// * `dialer` - Performs the handshakes
    /// * `endpoint` - Default orchestrator endpoint
    /// * `policy` - Retry parameters
    ///
    /// # Returns
    /// The client and the receiver of its events. The receiver is closed
    /// once the client has stopped for good.
    pub fn start<D>(
        dialer: D,
        endpoint: String,
        policy: RetryPolicy,
    ) -> (Self, mpsc::Receiver<ClientEvent>)
    where
        D: Dialer + 'static,
        D::Conn: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Unpin,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared::default());

        let task = tokio::spawn(supervise(
            dialer,
            endpoint,
            policy,
            outbound_rx,
            event_tx,
            shared.clone(),
            shutdown_rx,
        ));

        let client = ProtocolClient {
            handle: ClientHandle {
                outbound: outbound_tx,
                shared,
            },
            shutdown: shutdown_tx,
            task,
        };
        (client, event_rx)
    }

    /// Handle used to send frames and query the connection state
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Closes the connection gracefully and waits for the client to stop
    ///
    /// Flushes the frames already queued and sends a close frame, giving the
    /// peer [`CLOSE_TIMEOUT`] to take them and as long again to acknowledge
    /// the close. The connection is dropped afterwards in every case.
    /// Pending connection attempts are cancelled.
    ///
    /// # Errors
    /// Returns the error that made the client give up, if any
    pub async fn stop(self) -> Result<(), MinerError> {
        // The supervisor may already be gone, its result is below
        let _ = self.shutdown.send(true);
        self.task.await?
    }
}

enum ReadOutcome {
    /// Close code 1000, no reconnection
    Closed,
    /// Anything else
    Failed(String),
}

/// Why the write pump returned
enum Ended {
    /// Shutdown requested, the connection must be released by this instant
    Stopping(Instant),
    /// The read pump finished
    Read(Result<ReadOutcome, JoinError>),
}

async fn supervise<D>(
    dialer: D,
    default_endpoint: String,
    policy: RetryPolicy,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<ClientEvent>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), MinerError>
where
    D: Dialer,
    D::Conn: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Unpin,
{
    let mut endpoint = default_endpoint.clone();

    loop {
        let connection =
            connect_with_retry(&dialer, &default_endpoint, &mut endpoint, &policy, &mut shutdown)
                .await?;
        let Some((conn, info)) = connection else {
            log::info!("Connection attempts cancelled");
            return Ok(());
        };

        log::info!(
            "Connected to orchestrator at {}: noncePrefix={} target={} batching={:?} initialDelay={:?}",
            endpoint,
            hex::encode(&info.nonce_prefix),
            info.target,
            info.batching_duration,
            info.initial_batch_delay
        );
        shared.connection.store(Some(Arc::new(info.clone())));
        shared.connected.store(true, Ordering::Release);
        if events.send(ClientEvent::Connected(info)).await.is_err() {
            log::debug!("No listener for client events");
        }

        let (mut sink, stream) = conn.split();
        let mut reader = tokio::spawn(read_pump(stream, events.clone()));
        let ended = write_pump(&mut sink, &mut outbound, &mut reader, &mut shutdown).await;
        shared.connected.store(false, Ordering::Release);

        match ended {
            Ended::Stopping(deadline) => {
                close(&mut sink, &mut outbound, &mut reader, deadline).await;
                return Ok(());
            }
            Ended::Read(outcome) => match outcome? {
                ReadOutcome::Closed => {
                    log::info!("Orchestrator closed the connection");
                    return Ok(());
                }
                ReadOutcome::Failed(reason) => {
                    log::error!("Unexpected error reading from orchestrator: {}", reason);
                    if events.send(ClientEvent::Disconnected).await.is_err() {
                        log::debug!("No listener for client events");
                    }
                }
            },
        }
    }
}

/// Connects to the orchestrator, retrying transient failures
///
/// A redirection switches `endpoint` and restarts the backoff clock. A
/// redirected endpoint that keeps failing for longer than the policy's
/// redirect window is abandoned for `default_endpoint`.
///
/// # Returns
/// - `Ok(Some(..))` once connected
/// - `Ok(None)` if shutdown was requested first
///
/// # Errors
/// Returns `MinerError::HandshakeRejected` on a permanent rejection and
/// `MinerError::ConnectionError` when a bounded policy runs out of time
pub async fn connect_with_retry<D: Dialer>(
    dialer: &D,
    default_endpoint: &str,
    endpoint: &mut String,
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<(D::Conn, ConnectionInfo)>, MinerError> {
    let mut backoff = Backoff::new(policy.clone());

    loop {
        if endpoint.as_str() != default_endpoint && backoff.elapsed() > policy.redirect_window {
            *endpoint = default_endpoint.to_string();
            backoff.reset();
            log::warn!("Resetting endpoint to the default [{}]", endpoint);
        }

        log::info!("Connecting to orchestrator at {}...", endpoint);
        let attempt = tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return Ok(None),
            result = dialer.dial(endpoint.as_str()) => result,
        };

        let error = match attempt {
            Ok(connected) => return Ok(Some(connected)),
            Err(DialError::Redirect(location)) => {
                log::info!("Redirected to {}", location);
                *endpoint = location.clone();
                backoff.reset();
                DialError::Redirect(location)
            }
            Err(e) if e.is_permanent() => return Err(MinerError::HandshakeRejected(e.to_string())),
            Err(e) => e,
        };

        let Some(delay) = backoff.next_delay() else {
            return Err(MinerError::ConnectionError(format!(
                "Giving up after {:?}: {}",
                backoff.elapsed(),
                error
            )));
        };
        log::warn!("Failed to connect ({}). Retrying in {:?}", error, delay);

        tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return Ok(None),
            _ = time::sleep(delay) => {}
        }
    }
}

async fn read_pump<S>(mut stream: S, events: mpsc::Sender<ClientEvent>) -> ReadOutcome
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Binary(data)) => {
                if data.is_empty() {
                    continue;
                }
                if events.send(ClientEvent::Received(data.to_vec())).await.is_err() {
                    log::debug!("No listener for client events, closing");
                    return ReadOutcome::Closed;
                }
            }
            Ok(WsMessage::Close(Some(frame))) => {
                let reason: &str = &frame.reason;
                if frame.code == CloseCode::Normal {
                    if !reason.is_empty() {
                        log::info!("Disconnection reason: {}", reason);
                    }
                    return ReadOutcome::Closed;
                }
                return ReadOutcome::Failed(format!(
                    "closed with code {}: {}",
                    u16::from(frame.code),
                    reason
                ));
            }
            Ok(WsMessage::Close(None)) => {
                return ReadOutcome::Failed("closed without status code".into());
            }
            Ok(WsMessage::Text(_)) => log::warn!("Ignoring unexpected text frame"),
            Ok(_) => {}
            Err(e) => return ReadOutcome::Failed(e.to_string()),
        }
    }
    ReadOutcome::Failed("connection dropped".into())
}

/// Sends queued frames and keep-alive pings until shutdown or until the
/// read pump finishes
///
/// A frame in flight when shutdown is requested gets until the close
/// deadline to go out, so a peer that stopped reading cannot hold the
/// client open.
async fn write_pump<S>(
    sink: &mut S,
    outbound: &mut mpsc::Receiver<Vec<u8>>,
    reader: &mut JoinHandle<ReadOutcome>,
    shutdown: &mut watch::Receiver<bool>,
) -> Ended
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let mut keep_alive = time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);

    loop {
        let message = tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return Ended::Stopping(Instant::now() + CLOSE_TIMEOUT),
            outcome = &mut *reader => return Ended::Read(outcome),
            frame = outbound.recv() => match frame {
                Some(frame) => WsMessage::Binary(frame.into()),
                // every handle is gone
                None => return Ended::Stopping(Instant::now() + CLOSE_TIMEOUT),
            },
            _ = keep_alive.tick() => WsMessage::Ping(Default::default()),
        };

        let send = sink.send(message);
        tokio::pin!(send);
        tokio::select! {
            biased;
            sent = &mut send => {
                if let Err(e) = sent {
                    log::error!("Failed to send: {}", e);
                }
            }
            outcome = &mut *reader => return Ended::Read(outcome),
            _ = wait_for_shutdown(shutdown) => {
                let deadline = Instant::now() + CLOSE_TIMEOUT;
                match time::timeout_at(deadline, send).await {
                    Ok(Err(e)) => log::error!("Failed to send: {}", e),
                    Ok(Ok(())) => {}
                    Err(_) => log::warn!("Orchestrator is not reading, dropping the frame in flight"),
                }
                return Ended::Stopping(deadline);
            }
        }
    }
}

/// Flushes the frames still queued and sends a close frame, both before
/// `deadline`, then waits up to [`CLOSE_TIMEOUT`] for the acknowledgement
///
/// The read pump is aborted in every case.
async fn close<S>(
    sink: &mut S,
    outbound: &mut mpsc::Receiver<Vec<u8>>,
    reader: &mut JoinHandle<ReadOutcome>,
    deadline: Instant,
) where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let flush = async {
        while let Ok(frame) = outbound.try_recv() {
            sink.send(WsMessage::Binary(frame.into())).await?;
        }
        sink.send(WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })))
        .await
    };

    match time::timeout_at(deadline, flush).await {
        Ok(Ok(())) => {
            if time::timeout(CLOSE_TIMEOUT, &mut *reader).await.is_err() {
                log::warn!("Orchestrator did not acknowledge the close frame");
            }
        }
        Ok(Err(e)) => log::error!("Failed to gracefully disconnect: {}", e),
        Err(_) => log::error!("Failed to gracefully disconnect: timed out"),
    }
    reader.abort();
}

/// Resolves once shutdown is requested or the requester is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
