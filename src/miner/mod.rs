// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the proof-of-work search:
//! - Hash function abstraction
//! - Worker thread management
//! - Best-nonce tracking and the rolling share buffer
//! - The engine coordinating a session across workers

/// Proof-of-work hash functions
///
/// Defines the [`Hasher`] trait injected into the engine and the
/// difficulty computation shared by workers and tests.
pub mod hasher;

/// Bounded top-K nonce list used by the legacy scoring mode
pub mod best;

/// Rolling buffer of shares, drained by periodic batch claiming
pub mod buffer;

/// Worker thread implementation
///
/// Contains the worker loop that performs the actual hash computations
/// on its own slice of the nonce space.
pub mod worker;

/// Mining engine
///
/// Starts and stops sessions, joins workers and aggregates their results.
pub mod engine;

// Re-export main components for cleaner imports
pub use self::best::BestNonces;
pub use self::buffer::NonceBuffer;
pub use self::engine::{EngineConfig, MiningEngine, MiningSession, NonceClaimer, SessionResults};
pub use self::hasher::{Hasher, Sha256Hasher, difficulty};
pub use self::worker::Worker;
