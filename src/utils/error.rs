// src/utils/error.rs
use crate::protocol::CodecError;
use crate::types::Nonce;
use serde_json;
use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use url;

/// Main error type for the mining client
///
/// This enum represents all recoverable and fatal error conditions of the
/// client: network, handshake, codec, configuration and I/O errors.
/// Engine contract violations are not represented here, they panic.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Errors raised while setting up the mining engine
    #[error("Engine error: {0}")]
    EngineError(String),

    /// Errors related to network connectivity
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// The orchestrator permanently refused the connection (bad request,
    /// authentication failure, duplicate miner id)
    #[error("Connection rejected by orchestrator: {0}")]
    HandshakeRejected(String),

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Message encoding/decoding errors
    #[error("Codec error: {0}")]
    CodecError(#[from] CodecError),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML configuration (de)serialization errors
    #[error("TOML error: {0}")]
    TomlError(String),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    /// WebSocket communication errors
    #[error("WebSocket error: {0}")]
    WsError(#[from] tungstenite::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Async task execution errors
    #[error("Task execution error: {0}")]
    TaskError(String),
}

/// Converts crossbeam channel send errors for shares into MinerError
///
/// Raised when a worker outlives the share collector of its session.
impl From<crossbeam_channel::SendError<Nonce>> for MinerError {
    fn from(e: crossbeam_channel::SendError<Nonce>) -> Self {
        MinerError::ChannelError(format!("Share send failed: {}", e))
    }
}

/// Converts hex decoding errors into MinerError
///
/// Used when invalid hex data is encountered in handshake headers.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::InputError(format!("Hex conversion failed: {}", e))
    }
}

/// Converts async task join errors into MinerError
///
/// Used when the protocol client supervisor task fails unexpectedly.
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::TaskError(format!("Async task failed: {}", e))
    }
}

impl From<toml::de::Error> for MinerError {
    fn from(e: toml::de::Error) -> Self {
        MinerError::TomlError(format!("Invalid config format: {}", e))
    }
}

impl From<toml::ser::Error> for MinerError {
    fn from(e: toml::ser::Error) -> Self {
        MinerError::TomlError(format!("Failed to serialize config: {}", e))
    }
}
