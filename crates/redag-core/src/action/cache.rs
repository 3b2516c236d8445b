//! Top-K cache of the highest-weight candidate actions for one node.

use rand::Rng;

use crate::action::{HashIndex, MinHeap};
use crate::algo::SegmentTree;

/// Fixed-capacity cache of the currently best actions.
///
/// Backed by three aligned structures over K slots: the action id per
/// slot, a tempered [`SegmentTree`] of raw weight deltas (for weighted
/// sampling and the aggregate cache mass), a [`HashIndex`] for O(1)
/// membership, and a [`MinHeap`] for O(log K) eviction of the worst
/// entry. A capacity of zero is a valid degenerate cache that holds
/// nothing and reports itself full.
#[derive(Debug)]
pub struct ActionCache {
    slots: Vec<u32>,
    tree: SegmentTree,
    index: HashIndex,
    heap: MinHeap,
    capacity: usize,
    last_ll: f64,
}

impl ActionCache {
    pub fn new<R: Rng + ?Sized>(capacity: usize, beta: f64, rng: &mut R) -> Self {
        Self {
            slots: vec![0; capacity],
            tree: SegmentTree::with_beta(capacity.max(1), beta),
            index: HashIndex::new(capacity.max(1), rng),
            heap: MinHeap::new(capacity),
            capacity,
            last_ll: f64::NEG_INFINITY,
        }
    }

    pub fn contains(&self, action: u32) -> bool {
        self.capacity > 0 && self.index.contains(action)
    }

    pub fn is_full(&self) -> bool {
        self.index.len() == self.capacity
    }

    /// Raw weight of the entry the heap would evict next.
    pub fn min(&self) -> f64 {
        if self.capacity == 0 {
            return f64::INFINITY;
        }
        self.tree.get(self.heap.min() as usize)
    }

    /// Aggregate cache mass in tempered log space.
    pub fn log_likelihood(&self) -> f64 {
        if self.capacity == 0 {
            return f64::NEG_INFINITY;
        }
        self.tree.total()
    }

    /// Raw weight of the action returned by the last [`Self::sample`].
    pub fn last_ll(&self) -> f64 {
        self.last_ll
    }

    /// Inserts `action` with raw weight `ll`, evicting the current
    /// minimum when full. The displaced action (if any) is returned so
    /// the caller can fold it back into its batch representation.
    ///
    /// Callers decide *whether* an insertion is worth an eviction (by
    /// comparing against [`Self::min`]); this method evicts
    /// unconditionally once full.
    pub fn add(&mut self, action: u32, ll: f64) -> Option<u32> {
        debug_assert!(self.capacity > 0, "add() on a zero-capacity cache");
        let mut evicted = None;
        let pos = if self.is_full() {
            let pos = self.heap.extract_min();
            let out = self.slots[pos as usize];
            self.index.remove(out);
            evicted = Some(out);
            pos
        } else {
            self.index.len() as u32
        };
        self.slots[pos as usize] = action;
        self.tree.set(pos as usize, ll);
        self.index.put(action, pos);
        self.heap.add(pos, ll);
        evicted
    }

    /// Suppresses a cached action without removing it (the action would
    /// currently create a cycle; its slot weight drops to −∞).
    pub fn disable(&mut self, action: u32) {
        let slot = self.index.get(action).expect("disabling an uncached action");
        self.tree.set(slot as usize, f64::NEG_INFINITY);
    }

    /// Restores a previously disabled cached action.
    pub fn re_enable(&mut self, action: u32, ll: f64) {
        let slot = self.index.get(action).expect("re-enabling an uncached action");
        self.tree.set(slot as usize, ll);
    }

    /// Draws a cached action with probability proportional to its
    /// tempered weight, recording its raw weight as [`Self::last_ll`].
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> u32 {
        let slot = self.tree.sample(rng);
        self.last_ll = self.tree.get(slot);
        self.slots[slot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::log_sum;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn evicts_worst_entry_when_full() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut cache = ActionCache::new(2, 1.0, &mut rng);
        assert_eq!(cache.add(10, -1.0), None);
        assert_eq!(cache.add(20, -3.0), None);
        assert!(cache.is_full());
        assert_eq!(cache.min(), -3.0);
        // 20 carries the smallest weight and is displaced.
        assert_eq!(cache.add(30, -0.5), Some(20));
        assert!(cache.contains(10));
        assert!(cache.contains(30));
        assert!(!cache.contains(20));
    }

    #[test]
    fn disable_and_re_enable_toggle_mass() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut cache = ActionCache::new(4, 1.0, &mut rng);
        cache.add(1, -2.0);
        cache.add(2, -2.0);
        let both = log_sum((-2.0f64).min(0.0), -2.0);
        assert!((cache.log_likelihood() - both).abs() < 1e-9);
        cache.disable(1);
        assert!((cache.log_likelihood() - -2.0).abs() < 1e-9);
        cache.re_enable(1, -2.0);
        assert!((cache.log_likelihood() - both).abs() < 1e-9);
    }

    #[test]
    fn zero_capacity_cache_is_inert() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let cache = ActionCache::new(0, 1.0, &mut rng);
        assert!(cache.is_full());
        assert!(!cache.contains(0));
        assert_eq!(cache.min(), f64::INFINITY);
        assert_eq!(cache.log_likelihood(), f64::NEG_INFINITY);
    }
}
