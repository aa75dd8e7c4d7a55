//! Segment data LRU (spec §4.4 "LRU"): at most `MAX_CACHED_SEGMENTS`
//! buffers. On eviction, sequences no longer in `known_sequences` are
//! preferred; if the least-recently-used sequence is still live, it is
//! skipped in favor of the next-oldest entry so the imminent playback
//! front is never evicted.

use std::collections::BTreeSet;

use bytes::Bytes;
use lru::LruCache;

pub struct SegmentDataCache {
    inner: LruCache<u64, Bytes>,
    capacity: usize,
}

impl SegmentDataCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: LruCache::unbounded(),
            capacity: capacity.max(1),
        }
    }

    /// Promote-on-hit read (spec §4.4 "Cache hit ⇒ promote in LRU").
    pub fn get(&mut self, ms: u64) -> Option<Bytes> {
        self.inner.get(&ms).cloned()
    }

    pub fn contains(&self, ms: u64) -> bool {
        self.inner.contains(&ms)
    }

    /// Insert data, evicting first if at capacity (spec §4.4 "Evict LRU
    /// entries above capacity before inserting").
    pub fn insert(&mut self, ms: u64, data: Bytes, known_sequences: &BTreeSet<u64>) {
        while self.inner.len() >= self.capacity && !self.inner.is_empty() {
            if !self.evict_one(known_sequences) {
                break;
            }
        }
        self.inner.put(ms, data);
    }

    pub fn remove(&mut self, ms: u64) {
        self.inner.pop(&ms);
    }

    /// Evict the best eviction candidate: the least-recently-used entry
    /// that is no longer tracked, or (if every cached entry is still
    /// tracked) the absolute least-recently-used entry as a last resort.
    /// Returns `false` if the cache was already empty.
    fn evict_one(&mut self, known_sequences: &BTreeSet<u64>) -> bool {
        // `iter()` yields most-recently-used first; walk from the back (LRU end).
        let lru_order: Vec<u64> = self.inner.iter().map(|(k, _)| *k).collect();
        if lru_order.is_empty() {
            return false;
        }
        let untracked_victim = lru_order
            .iter()
            .rev()
            .find(|ms| !known_sequences.contains(ms))
            .copied();
        let victim = untracked_victim.unwrap_or_else(|| *lru_order.last().unwrap());
        self.inner.pop(&victim);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_untracked_before_tracked() {
        let mut cache = SegmentDataCache::new(2);
        let known: BTreeSet<u64> = [2, 3].into_iter().collect();
        cache.insert(1, Bytes::from_static(b"one"), &known); // 1 is untracked (expired)
        cache.insert(2, Bytes::from_static(b"two"), &known);
        // Capacity is 2; inserting a third must evict. 1 is LRU and untracked -> evicted.
        cache.insert(3, Bytes::from_static(b"three"), &known);
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));
    }

    #[test]
    fn falls_back_to_true_lru_when_all_tracked() {
        let mut cache = SegmentDataCache::new(2);
        let known: BTreeSet<u64> = [1, 2, 3].into_iter().collect();
        cache.insert(1, Bytes::from_static(b"one"), &known);
        cache.insert(2, Bytes::from_static(b"two"), &known);
        cache.insert(3, Bytes::from_static(b"three"), &known);
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));
    }

    #[test]
    fn get_promotes_to_most_recently_used() {
        let mut cache = SegmentDataCache::new(2);
        let known: BTreeSet<u64> = [1, 2, 3].into_iter().collect();
        cache.insert(1, Bytes::from_static(b"one"), &known);
        cache.insert(2, Bytes::from_static(b"two"), &known);
        // Touch 1 so it becomes MRU; 2 should be evicted instead.
        let _ = cache.get(1);
        cache.insert(3, Bytes::from_static(b"three"), &known);
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
    }
}
