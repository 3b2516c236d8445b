//! Fixed-capacity binary min-heap of cache slots keyed by weight.

/// Min-heap of `(slot, weight)` pairs.
///
/// Weights are captured at insertion time; the cache relies on this when
/// evicting its worst entry in O(log K).
#[derive(Debug, Clone)]
pub struct MinHeap {
    slots: Vec<u32>,
    weights: Vec<f64>,
}

impl MinHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            weights: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.slots.swap(i, j);
        self.weights.swap(i, j);
    }

    fn sift_up(&mut self, mut k: usize) {
        while k != 0 {
            let j = (k - 1) / 2;
            if self.weights[k] < self.weights[j] {
                self.swap(k, j);
                k = j;
            } else {
                return;
            }
        }
    }

    fn sift_down(&mut self, mut k: usize) {
        loop {
            let c1 = 2 * k + 1;
            let c2 = 2 * k + 2;
            if c1 >= self.slots.len() {
                return;
            }
            let mut min = if self.weights[k] <= self.weights[c1] { k } else { c1 };
            if c2 < self.slots.len() && self.weights[min] > self.weights[c2] {
                min = c2;
            }
            if min == k {
                return;
            }
            self.swap(k, min);
            k = min;
        }
    }

    pub fn add(&mut self, slot: u32, weight: f64) {
        self.slots.push(slot);
        self.weights.push(weight);
        self.sift_up(self.slots.len() - 1);
    }

    /// Slot holding the minimum weight.
    pub fn min(&self) -> u32 {
        assert!(!self.slots.is_empty(), "min() on an empty heap");
        self.slots[0]
    }

    /// Weight at the heap minimum.
    pub fn min_weight(&self) -> f64 {
        assert!(!self.slots.is_empty(), "min_weight() on an empty heap");
        self.weights[0]
    }

    pub fn extract_min(&mut self) -> u32 {
        let min = self.min();
        let last = self.slots.len() - 1;
        self.swap(0, last);
        self.slots.pop();
        self.weights.pop();
        if !self.slots.is_empty() {
            self.sift_down(0);
        }
        min
    }
}
