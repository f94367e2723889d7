// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A candidate nonce together with the difficulty of the hash it produced
///
/// `bytes` is everything appended to the OPR hash before hashing: the
/// connection nonce prefix, the worker id and the worker counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    /// Raw nonce bytes (hex encoded on the wire)
    #[serde(with = "hex::serde")]
    pub bytes: Vec<u8>,
    /// First 8 bytes of the hash as a big-endian integer, higher is better
    pub difficulty: u64,
}

impl Nonce {
    /// Creates a new nonce record
    pub fn new(bytes: Vec<u8>, difficulty: u64) -> Self {
        Nonce { bytes, difficulty }
    }
}

/// How workers decide which nonces are kept for submission
///
/// The orchestrator either accepts every share above its target, or
/// (legacy) ranks miners by the best few nonces they found.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringMode {
    /// Every nonce meeting the current target is a share
    ///
    /// Shares are pushed to the rolling buffer as soon as they are found
    /// and claimed in batches while mining continues.
    #[default]
    #[value(name = "target")]
    Target,

    /// Keep only the `max_nonces` best nonces of the session
    #[value(name = "top-k")]
    TopK,
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMode::Target => write!(f, "target"),
            ScoringMode::TopK => write!(f, "top-k"),
        }
    }
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "target" | "shares" => Ok(ScoringMode::Target),
            "top-k" | "topk" | "legacy" => Ok(ScoringMode::TopK),
            _ => Err(format!("Unknown scoring mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_mode_parses_aliases() {
        assert_eq!("target".parse::<ScoringMode>(), Ok(ScoringMode::Target));
        assert_eq!("Top-K".parse::<ScoringMode>(), Ok(ScoringMode::TopK));
        assert_eq!("legacy".parse::<ScoringMode>(), Ok(ScoringMode::TopK));
        assert!("best".parse::<ScoringMode>().is_err());
    }

    #[test]
    fn nonce_serializes_bytes_as_hex() {
        let nonce = Nonce::new(vec![0x13, 0x59, 0x00, 0x01], 42);
        let json = serde_json::to_string(&nonce).unwrap();
        assert_eq!(json, r#"{"bytes":"13590001","difficulty":42}"#);
    }
}
