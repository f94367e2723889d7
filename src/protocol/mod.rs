// src/protocol/mod.rs
//! Versioned message codec shared by the protocol client and the session
//! orchestrator.

/// Message types and their binary encoding
pub mod message;

pub use message::{CodecError, Message, MinerSubmission, PROTOCOL_VERSION};
