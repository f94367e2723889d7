// src/config/store.rs
//! Persistent local state
//!
//! The configuration file doubles as the store for the indicative hash
//! rate reported in the connection handshake.

use crate::config::config::Config;
use crate::miner::engine::hash_rate;
use crate::utils::error::MinerError;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Read/write access to the indicative hash rate per worker count
pub trait HashRateStore: Send + Sync {
    /// Last recorded hash rate for `workers` threads, 0 if unknown
    fn indicative_hash_rate(&self, workers: usize) -> i64;

    /// Records `total_ops / duration` for `workers` threads
    ///
    /// # Errors
    /// Returns an error if the value could not be persisted
    fn save_indicative_hash_rate(
        &self,
        workers: usize,
        total_ops: u64,
        duration: Duration,
    ) -> Result<i64, MinerError>;
}

/// Configuration file kept in memory and rewritten on every update
pub struct ConfigStore {
    path: PathBuf,
    config: Mutex<Config>,
}

impl ConfigStore {
    /// Loads the store from `path`
    ///
    /// # Errors
    /// Returns `MinerError` if the file cannot be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config = Config::load(&path)?;
        Ok(ConfigStore {
            path,
            config: Mutex::new(config),
        })
    }

    /// Wraps an in-memory configuration that will be written to `path`
    pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
        ConfigStore {
            path: path.into(),
            config: Mutex::new(config),
        }
    }

    /// File backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Config {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, config: &Config) -> Result<(), MinerError> {
        std::fs::write(&self.path, config.to_toml()?)?;
        Ok(())
    }
}

impl HashRateStore for ConfigStore {
    fn indicative_hash_rate(&self, workers: usize) -> i64 {
        self.lock().hash_rate(workers)
    }

    fn save_indicative_hash_rate(
        &self,
        workers: usize,
        total_ops: u64,
        duration: Duration,
    ) -> Result<i64, MinerError> {
        let rate = hash_rate(total_ops, duration);
        let mut config = self.lock();
        config.set_hash_rate(workers, rate);
        self.write(&config)?;
        Ok(rate)
    }
}
