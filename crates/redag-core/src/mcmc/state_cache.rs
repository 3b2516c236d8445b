//! LRU reuse of samplers across revisited parent sets.
//!
//! A chain bounces between a handful of parent sets for every node
//! (accept/reject cycles re-visit the same set constantly), and building
//! an [`ActionSampler`] from scratch throws away all of its resolved
//! batches and cached top actions. Each node therefore keeps a small LRU
//! of samplers keyed by the sorted parent set, arena-indexed so entries
//! are addressed by slot rather than by reference.

use rustc_hash::FxHashMap;

use crate::action::ActionSampler;

#[derive(Debug)]
struct CacheEntry {
    key: Vec<u32>,
    sampler: ActionSampler,
    /// Node log-likelihood captured when the sampler was created; action
    /// weights are deltas against this baseline.
    base_ll: f64,
    last_used: u64,
}

/// Per-node sampler cache with least-recently-used eviction.
#[derive(Debug)]
pub struct StateCache {
    capacity: usize,
    entries: Vec<CacheEntry>,
    map: FxHashMap<Vec<u32>, usize>,
    clock: u64,
}

impl StateCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Vec::new(),
            map: FxHashMap::default(),
            clock: 0,
        }
    }

    /// Slot for `key`, reusing a cached sampler or creating one via
    /// `create`. The returned slot stays valid until the next `request`.
    pub fn request(
        &mut self,
        key: &[u32],
        create: impl FnOnce() -> (ActionSampler, f64),
    ) -> usize {
        self.clock += 1;
        if let Some(&slot) = self.map.get(key) {
            self.entries[slot].last_used = self.clock;
            return slot;
        }

        let (sampler, base_ll) = create();
        let entry = CacheEntry {
            key: key.to_vec(),
            sampler,
            base_ll,
            last_used: self.clock,
        };
        let slot = if self.entries.len() < self.capacity {
            self.entries.push(entry);
            self.entries.len() - 1
        } else {
            let slot = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(i, _)| i)
                .expect("non-empty cache");
            self.map.remove(&self.entries[slot].key);
            self.entries[slot] = entry;
            slot
        };
        self.map.insert(key.to_vec(), slot);
        slot
    }

    pub fn sampler_mut(&mut self, slot: usize) -> &mut ActionSampler {
        &mut self.entries[slot].sampler
    }

    pub fn sampler(&self, slot: usize) -> &ActionSampler {
        &self.entries[slot].sampler
    }

    pub fn base_ll(&self, slot: usize) -> f64 {
        self.entries[slot].base_ll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(n: usize) -> (ActionSampler, f64) {
        (ActionSampler::new(n, 2, 2, (1.0 / n as f64).ln(), 1.0), -1.0)
    }

    #[test]
    fn revisited_key_reuses_the_slot() {
        let mut cache = StateCache::new(4);
        let a = cache.request(&[1, 3], || make(5));
        let b = cache.request(&[2], || make(5));
        assert_ne!(a, b);
        let again = cache.request(&[1, 3], || panic!("should reuse"));
        assert_eq!(a, again);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = StateCache::new(2);
        let a = cache.request(&[1], || make(5));
        let _b = cache.request(&[2], || make(5));
        // Touch [1] so [2] is the LRU entry.
        cache.request(&[1], || panic!("should reuse"));
        let c = cache.request(&[3], || make(5));
        assert_ne!(c, a);
        // [2] was evicted; [1] survives.
        cache.request(&[1], || panic!("should reuse"));
        let replayed = cache.request(&[2], || make(5));
        assert_eq!(replayed, c, "evicted key rebuilds into the freed slot");
    }

    #[test]
    fn base_ll_is_preserved_per_entry() {
        let mut cache = StateCache::new(2);
        let a = cache.request(&[], || (ActionSampler::new(4, 2, 2, -1.0, 1.0), -7.5));
        assert_eq!(cache.base_ll(a), -7.5);
    }
}
