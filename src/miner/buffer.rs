// src/miner/buffer.rs
//! Share buffer filled by the collector in target scoring mode

use crate::types::Nonce;
use std::sync::{Mutex, MutexGuard, PoisonError};

const INITIAL_CAPACITY: usize = 300;

/// Rolling buffer of shares found during a session
///
/// The only state shared between mining threads and the network side.
/// The lock is never exposed: callers push single shares or take the
/// whole content with [`NonceBuffer::drain`].
#[derive(Debug, Default)]
pub struct NonceBuffer {
    nonces: Mutex<Vec<Nonce>>,
}

impl NonceBuffer {
    /// Creates an empty buffer
    pub fn new() -> Self {
        NonceBuffer {
            nonces: Mutex::new(Vec::with_capacity(INITIAL_CAPACITY)),
        }
    }

    /// Appends one share
    pub fn push(&self, nonce: Nonce) {
        self.lock().push(nonce);
    }

    /// Atomically takes every buffered share and resets the buffer
    pub fn drain(&self) -> Vec<Nonce> {
        std::mem::replace(&mut *self.lock(), Vec::with_capacity(INITIAL_CAPACITY))
    }

    /// Number of buffered shares
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if no share is buffered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking pusher cannot leave the Vec half-written, keep going.
    fn lock(&self) -> MutexGuard<'_, Vec<Nonce>> {
        self.nonces.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn drain_returns_content_and_resets() {
        let buffer = NonceBuffer::new();
        buffer.push(Nonce::new(vec![1], 1));
        buffer.push(Nonce::new(vec![2], 2));

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn concurrent_pushes_are_all_drained_once() {
        let buffer = Arc::new(NonceBuffer::new());
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..250u64 {
                        buffer.push(Nonce::new(vec![t], i));
                    }
                })
            })
            .collect();

        let mut seen = 0;
        for handle in handles {
            seen += buffer.drain().len();
            handle.join().unwrap();
        }
        seen += buffer.drain().len();
        assert_eq!(seen, 1000);
    }
}
