// src/config/mod.rs
//! Configuration management for the Orax miner
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing the TOML configuration file
//! - Generating configuration templates
//! - Persisting the indicative hash rate
//! - Resolving the orchestrator endpoint

/// Core configuration implementation
///
/// Contains the [`Config`] struct that defines the miner's configuration
/// file structure.
pub mod config;

/// File-backed store for state written by the miner itself
pub mod store;

// Re-export key items for easy access
pub use config::Config;
pub use store::{ConfigStore, HashRateStore};

use crate::utils::error::MinerError;
use std::path::PathBuf;
use url::Url;

/// Environment variable overriding the orchestrator endpoint
pub const ENDPOINT_ENV: &str = "ORAX_ORCHESTRATOR_ENDPOINT";

/// Endpoint used when neither the environment nor the config sets one
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8077/miner";

/// Loads miner configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    Config::load(path)
}

/// Generates a commented configuration template
pub fn generate_template(miner_id: &str, miner_secret: &str) -> String {
    Config::generate_template(miner_id, miner_secret)
}

/// Picks the orchestrator endpoint
///
/// The environment override wins over the configured endpoint, which wins
/// over [`DEFAULT_ENDPOINT`]. Whichever is picked must be a valid URL.
///
/// # Errors
/// Returns `MinerError::ConfigError` if the chosen endpoint does not parse
pub fn resolve_endpoint(
    env_override: Option<&str>,
    configured: Option<&str>,
) -> Result<String, MinerError> {
    let (source, endpoint) = match (env_override.filter(|s| !s.is_empty()), configured) {
        (Some(env), _) => (ENDPOINT_ENV, env),
        (None, Some(cfg)) => ("orchestrator_endpoint", cfg),
        (None, None) => return Ok(DEFAULT_ENDPOINT.to_string()),
    };

    Url::parse(endpoint)
        .map_err(|e| MinerError::ConfigError(format!("Failed to parse {}: {}", source, e)))?;
    Ok(endpoint.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_wins_over_config() {
        let endpoint = resolve_endpoint(Some("wss://pool.example/miner"), Some("ws://cfg/miner"));
        assert_eq!(endpoint.unwrap(), "wss://pool.example/miner");
    }

    #[test]
    fn falls_back_to_config_then_default() {
        assert_eq!(
            resolve_endpoint(Some(""), Some("ws://cfg/miner")).unwrap(),
            "ws://cfg/miner"
        );
        assert_eq!(resolve_endpoint(None, None).unwrap(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn invalid_override_is_fatal() {
        let err = resolve_endpoint(Some("not a url"), None).unwrap_err();
        assert!(err.to_string().contains(ENDPOINT_ENV));
    }
}
