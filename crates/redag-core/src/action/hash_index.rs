//! Compact open-addressed map from action ids to cache slots.
//!
//! A plain `FxHashMap` would work, but the cache probes this table on
//! every sampled action; a flat table of small integers with linear
//! probing keeps the lookup allocation-free and cache-resident.

use rand::Rng;

const EMPTY: u32 = u32::MAX;

/// Universal-hash modulus; anything prime and larger than the action
/// space works.
const P: i64 = 9871;

/// Open-addressed action → slot map with linear probing.
///
/// Capacity is kept at twice the live entry count; removal repairs the
/// probe cluster by re-inserting every entry that follows the hole.
#[derive(Debug, Clone)]
pub struct HashIndex {
    table: Vec<u32>,
    values: Vec<u32>,
    capacity: usize,
    size: usize,
    a: i64,
    b: i64,
}

impl HashIndex {
    /// Creates an index sized for `initial_capacity` live entries, with
    /// per-instance hash coefficients drawn from `rng`.
    pub fn new<R: Rng + ?Sized>(initial_capacity: usize, rng: &mut R) -> Self {
        let capacity = (initial_capacity.max(1)) * 2;
        Self {
            table: vec![EMPTY; capacity],
            values: vec![0; capacity],
            capacity,
            size: 0,
            a: rng.gen_range(0..P),
            b: rng.gen_range(-P + 1..P),
        }
    }

    fn hash(&self, k: u32) -> usize {
        ((self.a * i64::from(k) + self.b) % P).rem_euclid(self.capacity as i64) as usize
    }

    /// Inserts `k -> val`. The key must not already be present.
    pub fn put(&mut self, k: u32, val: u32) {
        debug_assert_ne!(k, EMPTY);
        self.ensure_capacity(self.size + 1);
        let mut pos = self.hash(k);
        for _ in 0..self.capacity {
            pos = (pos + 1) % self.capacity;
            if self.table[pos] == EMPTY {
                self.table[pos] = k;
                self.values[pos] = val;
                self.size += 1;
                return;
            }
        }
        unreachable!("open-addressed table full despite load-factor bound");
    }

    fn locate(&self, k: u32) -> Option<usize> {
        let mut pos = self.hash(k);
        for _ in 0..self.capacity {
            pos = (pos + 1) % self.capacity;
            if self.table[pos] == k {
                return Some(pos);
            }
            if self.table[pos] == EMPTY {
                return None;
            }
        }
        None
    }

    /// Looks up the slot stored for `k`.
    pub fn get(&self, k: u32) -> Option<u32> {
        self.locate(k).map(|pos| self.values[pos])
    }

    pub fn contains(&self, k: u32) -> bool {
        self.locate(k).is_some()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Removes `k`, re-inserting the trailing probe cluster so later
    /// lookups never hit a stale hole.
    pub fn remove(&mut self, k: u32) {
        let mut pos = self.locate(k).expect("removing an action that is not indexed");
        self.size -= 1;
        self.table[pos] = EMPTY;
        for _ in 0..self.capacity {
            pos = (pos + 1) % self.capacity;
            let key = self.table[pos];
            if key == EMPTY {
                return;
            }
            self.table[pos] = EMPTY;
            self.size -= 1;
            self.put(key, self.values[pos]);
        }
    }

    fn ensure_capacity(&mut self, target: usize) {
        if target <= self.capacity / 2 {
            return;
        }
        let pairs: Vec<(u32, u32)> = self
            .table
            .iter()
            .zip(&self.values)
            .filter(|(k, _)| **k != EMPTY)
            .map(|(k, v)| (*k, *v))
            .collect();
        debug_assert_eq!(pairs.len(), self.size);
        self.capacity *= 2;
        self.table = vec![EMPTY; self.capacity];
        self.values = vec![0; self.capacity];
        self.size = 0;
        for (k, v) in pairs {
            self.put(k, v);
        }
    }
}
