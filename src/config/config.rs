// src/config/config.rs
use crate::miner::engine::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_NONCES, EngineConfig};
use crate::types::ScoringMode;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for the mining client
///
/// Holds the miner credentials issued at registration, the engine
/// settings and the indicative hash rates measured on this machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Miner identifier issued at registration
    #[serde(default)]
    pub miner_id: String,

    /// Miner secret issued at registration
    #[serde(default)]
    pub miner_secret: String,

    /// Number of worker threads to use for mining
    /// (default: number of logical CPUs)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Candidates each worker hashes between two stop checks
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Nonce scoring policy
    #[serde(default)]
    pub scoring: ScoringMode,

    /// Number of best nonces kept in top-K mode
    #[serde(default = "default_max_nonces")]
    pub max_nonces: usize,

    /// Orchestrator WebSocket endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_endpoint: Option<String>,

    /// Indicative hash rate (hash/s) keyed by worker count
    #[serde(default)]
    pub hash_rates: BTreeMap<String, i64>,
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_max_nonces() -> usize {
    DEFAULT_MAX_NONCES
}

impl Default for Config {
    fn default() -> Self {
        Config {
            miner_id: String::new(),
            miner_secret: String::new(),
            worker_threads: default_worker_threads(),
            batch_size: default_batch_size(),
            scoring: ScoringMode::default(),
            max_nonces: default_max_nonces(),
            orchestrator_endpoint: None,
            hash_rates: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If file couldn't be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse(&config_str)
    }

    /// Parses a TOML document
    pub fn parse(config_str: &str) -> Result<Self, MinerError> {
        Ok(toml::from_str(config_str)?)
    }

    /// Serializes the configuration back to TOML
    pub fn to_toml(&self) -> Result<String, MinerError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// True once the miner has been registered
    pub fn has_credentials(&self) -> bool {
        !self.miner_id.is_empty()
    }

    /// Engine parameters derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            workers: self.worker_threads,
            scoring: self.scoring,
            max_nonces: self.max_nonces,
            batch_size: self.batch_size,
        }
    }

    /// Recorded hash rate for `workers` threads, 0 if never measured
    pub fn hash_rate(&self, workers: usize) -> i64 {
        self.hash_rates.get(&workers.to_string()).copied().unwrap_or(0)
    }

    /// Records the hash rate for `workers` threads
    pub fn set_hash_rate(&mut self, workers: usize, hash_rate: i64) {
        self.hash_rates.insert(workers.to_string(), hash_rate);
    }

    /// Generates a configuration template string
    ///
    /// # Arguments
    /// * `miner_id` - Miner identifier to pre-fill
    /// * `miner_secret` - Miner secret to pre-fill
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template(miner_id: &str, miner_secret: &str) -> String {
        let mut template = String::new();
        template.push_str("# Orax miner configuration\n\n");
        template.push_str("# Credentials issued when registering the miner\n");
        template.push_str(&format!("miner_id = \"{}\"\n", miner_id));
        template.push_str(&format!("miner_secret = \"{}\"\n\n", miner_secret));
        template.push_str("# Number of worker threads (default: logical CPU count)\n");
        template.push_str(&format!("worker_threads = {}\n", default_worker_threads()));
        template.push_str("# Candidates hashed by a worker between stop checks\n");
        template.push_str(&format!("batch_size = {}\n", DEFAULT_BATCH_SIZE));
        template.push_str("# Scoring mode: \"target\" (shares) or \"top-k\" (legacy best nonces)\n");
        template.push_str("scoring = \"target\"\n");
        template.push_str("# Best nonces kept per session in top-k mode\n");
        template.push_str(&format!("max_nonces = {}\n\n", DEFAULT_MAX_NONCES));
        template.push_str("# Orchestrator endpoint (ORAX_ORCHESTRATOR_ENDPOINT overrides it)\n");
        template.push_str("# orchestrator_endpoint = \"ws://localhost:8077/miner\"\n\n");
        template.push_str("# Measured hash rates, maintained by the miner\n");
        template.push_str("[hash_rates]\n");

        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_back() {
        let config = Config::parse(&Config::generate_template("m-1", "s3cret")).unwrap();
        assert_eq!(config.miner_id, "m-1");
        assert_eq!(config.miner_secret, "s3cret");
        assert_eq!(config.scoring, ScoringMode::Target);
        assert_eq!(config.max_nonces, DEFAULT_MAX_NONCES);
        assert!(config.orchestrator_endpoint.is_none());
        assert!(config.hash_rates.is_empty());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = Config::parse("miner_id = \"abc\"\nscoring = \"top-k\"\n").unwrap();
        assert!(config.has_credentials());
        assert_eq!(config.scoring, ScoringMode::TopK);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.worker_threads, num_cpus::get());
    }

    #[test]
    fn hash_rates_survive_serialization() {
        let mut config = Config::default();
        config.set_hash_rate(4, 12_345);
        let config = Config::parse(&config.to_toml().unwrap()).unwrap();
        assert_eq!(config.hash_rate(4), 12_345);
        assert_eq!(config.hash_rate(8), 0);
    }

    #[test]
    fn invalid_document_is_a_toml_error() {
        assert!(matches!(
            Config::parse("worker_threads = \"many\""),
            Err(MinerError::TomlError(_))
        ));
    }
}
