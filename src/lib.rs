//! Orax Miner - pool mining client in Rust
//!
//! This crate provides a complete mining client for the Orax orchestrator:
//! - A multi-threaded proof-of-work engine (target shares or legacy top-K)
//! - A resilient WebSocket client with backoff, redirection and keepalive
//! - A compact binary message codec
//! - Session orchestration with periodic share batching
//! - Local hash rate benchmarking

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core implementation: hashing, workers and the engine
pub mod miner;

/// Network communication with the orchestrator
pub mod network;

/// Wire messages exchanged with the orchestrator
pub mod protocol;

/// Mining sessions driven by orchestrator events
pub mod session;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::{Config, ConfigStore, HashRateStore};
pub use miner::{EngineConfig, Hasher, MiningEngine, MiningSession, Sha256Hasher};
pub use network::{ClientEvent, ConnectionInfo, ProtocolClient};
pub use protocol::{Message, MinerSubmission};
pub use session::{SessionOrchestrator, run_client};
pub use types::{Nonce, ScoringMode};
pub use utils::{MinerError, init_logging};
