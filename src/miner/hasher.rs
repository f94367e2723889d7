// src/miner/hasher.rs
//! Proof-of-work hash functions
//!
//! The engine never reaches for a global hash context: a [`Hasher`] is
//! handed to [`MiningEngine::new`](crate::miner::MiningEngine::new) and
//! shared by all worker threads.

use sha2::{Digest, Sha256};

/// Common interface for proof-of-work hash functions
///
/// Implementations must be cheap to call from many threads at once.
pub trait Hasher: Send + Sync {
    /// Hashes `opr hash ‖ nonce` and returns the 32-byte digest
    fn hash(&self, data: &[u8]) -> [u8; 32];
}

/// SHA-256 proof-of-work hasher
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }
}

/// Difficulty of a digest: its first 8 bytes as a big-endian integer
///
/// Digests shorter than 8 bytes are zero-padded on the right.
pub fn difficulty(digest: &[u8]) -> u64 {
    let mut head = [0u8; 8];
    let len = digest.len().min(8);
    head[..len].copy_from_slice(&digest[..len]);
    u64::from_be_bytes(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn difficulty_reads_leading_bytes_big_endian() {
        let digest = hex!("0000000000000102ffffffffffffffffffffffffffffffffffffffffffffffff");
        assert_eq!(difficulty(&digest), 0x0102);
        assert_eq!(difficulty(&[0xff; 32]), u64::MAX);
    }

    #[test]
    fn sha256_hasher_matches_known_digest() {
        let digest = Sha256Hasher.hash(b"abc");
        assert_eq!(
            digest,
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(difficulty(&digest), 0xba7816bf8f01cfea);
    }
}
