//! Recent-fingerprint cache for duplicate suppression
//!
//! A peer reachable through both radio roles may deliver the same envelope
//! twice. The cache remembers the most recent fingerprints and forgets the
//! oldest once full, so memory stays bounded regardless of room traffic.

use std::collections::{HashSet, VecDeque};

use crate::types::Fingerprint;

/// Default number of fingerprints remembered
pub const DEFAULT_DEDUP_CAPACITY: usize = 256;

// ----------------------------------------------------------------------------
// Fingerprint Cache
// ----------------------------------------------------------------------------

/// Bounded set of recently seen fingerprints with FIFO eviction
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    order: VecDeque<Fingerprint>,
    seen: HashSet<Fingerprint>,
    capacity: usize,
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl FingerprintCache {
    /// Create a cache; a zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a fingerprint
    ///
    /// Returns `false` if it was already present, in which case the cache is
    /// left unchanged.
    pub fn insert(&mut self, fingerprint: Fingerprint) -> bool {
        if !self.seen.insert(fingerprint) {
            return false;
        }
        self.order.push_back(fingerprint);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(n: u8) -> Fingerprint {
        Fingerprint::new([n; 32])
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut cache = FingerprintCache::new(4);
        assert!(cache.insert(fp(1)));
        assert!(!cache.insert(fp(1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_oldest_evicted_when_full() {
        let mut cache = FingerprintCache::new(3);
        for n in 1..=4 {
            cache.insert(fp(n));
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&fp(1)));
        assert!(cache.contains(&fp(4)));

        // Evicted fingerprints are accepted again
        assert!(cache.insert(fp(1)));
        assert!(!cache.contains(&fp(2)));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut cache = FingerprintCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(fp(1));
        cache.insert(fp(2));
        assert!(cache.contains(&fp(2)));
        assert!(!cache.contains(&fp(1)));
    }
}
