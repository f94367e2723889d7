// src/network/mod.rs
//! Network communication components
//!
//! This module handles the WebSocket connection to the orchestrator:
//! - `handshake`: authentication headers and the mining parameters the
//!   orchestrator hands back
//! - `backoff`: retry delays between connection attempts
//! - `client`: the long-lived [`ProtocolClient`] with reconnection,
//!   redirection, keepalive and graceful shutdown

/// Exponential backoff with jitter
pub mod backoff;

/// Orchestrator protocol client
///
/// Owns the connection lifecycle and exposes inbound frames as events and
/// outbound frames as a non-blocking queue.
pub mod client;

/// Connection handshake
pub mod handshake;

// Re-export main components for cleaner imports
pub use backoff::{Backoff, RetryPolicy};
pub use client::{ClientEvent, ClientHandle, ProtocolClient};
pub use handshake::{ConnectionInfo, Credentials, DialError, Dialer, WsDialer};

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// WebSocket stream to the orchestrator
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
