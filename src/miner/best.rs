// src/miner/best.rs
//! Bounded best-nonce tracking for the legacy top-K scoring mode

use crate::types::Nonce;

/// Keeps the `capacity` highest-difficulty nonces seen so far
///
/// Entries are kept sorted by descending difficulty. Capacity is small
/// (a few hundred at most), so each insertion simply re-sorts.
#[derive(Debug, Clone)]
pub struct BestNonces {
    capacity: usize,
    ordered: Vec<Nonce>,
}

impl BestNonces {
    /// Creates an empty tracker holding at most `capacity` nonces
    pub fn new(capacity: usize) -> Self {
        BestNonces {
            capacity,
            ordered: Vec::with_capacity(capacity + 1),
        }
    }

    /// Returns true if a nonce of this difficulty would be retained
    pub fn accepts(&self, difficulty: u64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        self.ordered.len() < self.capacity
            || self
                .ordered
                .last()
                .is_some_and(|weakest| difficulty > weakest.difficulty)
    }

    /// Inserts a nonce, evicting the weakest entry when over capacity
    ///
    /// Takes the bytes lazily so callers on the hot path only allocate
    /// for nonces that are actually retained.
    pub fn insert_with(&mut self, difficulty: u64, bytes: impl FnOnce() -> Vec<u8>) {
        if !self.accepts(difficulty) {
            return;
        }
        self.ordered.push(Nonce::new(bytes(), difficulty));
        sort_by_difficulty(&mut self.ordered);
        self.ordered.truncate(self.capacity);
    }

    /// Inserts an already materialized nonce
    pub fn insert(&mut self, nonce: Nonce) {
        let Nonce { bytes, difficulty } = nonce;
        self.insert_with(difficulty, move || bytes);
    }

    /// Number of retained nonces
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// True if nothing has been retained yet
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Consumes the tracker, returning nonces best first
    pub fn into_sorted_vec(self) -> Vec<Nonce> {
        self.ordered
    }
}

/// Sorts nonces by descending difficulty
pub fn sort_by_difficulty(nonces: &mut [Nonce]) {
    nonces.sort_by(|a, b| b.difficulty.cmp(&a.difficulty));
}

/// Merges per-worker best lists into one list of at most `capacity` entries
pub fn merge_best(lists: impl IntoIterator<Item = Vec<Nonce>>, capacity: usize) -> Vec<Nonce> {
    let mut merged: Vec<Nonce> = lists.into_iter().flatten().collect();
    sort_by_difficulty(&mut merged);
    merged.truncate(capacity);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn difficulties(nonces: &[Nonce]) -> Vec<u64> {
        nonces.iter().map(|n| n.difficulty).collect()
    }

    #[test]
    fn keeps_only_the_strongest_entries() {
        let mut best = BestNonces::new(3);
        for d in [5, 1, 9, 3, 7, 2] {
            best.insert(Nonce::new(vec![d as u8], d));
        }
        assert_eq!(best.len(), 3);
        assert_eq!(difficulties(&best.into_sorted_vec()), vec![9, 7, 5]);
    }

    #[test]
    fn weaker_nonce_is_not_materialized_when_full() {
        let mut best = BestNonces::new(1);
        best.insert(Nonce::new(vec![1], 10));
        best.insert_with(4, || panic!("bytes must not be built for a rejected nonce"));
        assert_eq!(difficulties(&best.into_sorted_vec()), vec![10]);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut best = BestNonces::new(0);
        best.insert(Nonce::new(vec![1], u64::MAX));
        assert!(best.is_empty());
    }

    #[test]
    fn merge_resorts_and_truncates() {
        let a = vec![Nonce::new(vec![1], 8), Nonce::new(vec![2], 2)];
        let b = vec![Nonce::new(vec![3], 9), Nonce::new(vec![4], 5)];
        let merged = merge_best([a, b], 3);
        assert_eq!(difficulties(&merged), vec![9, 8, 5]);
    }
}
