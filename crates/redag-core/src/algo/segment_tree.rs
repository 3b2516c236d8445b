//! Log-space weighted accumulator over a fixed set of leaves.
//!
//! The tree stores one log weight per leaf and supports O(log n) updates,
//! an O(1) root log-sum, and an O(log n) weighted random draw. All
//! aggregation happens in log space with the local maximum factored out, so
//! leaves may span hundreds of orders of magnitude (or sit at −∞ for
//! excluded mass) without overflow.
//!
//! Layout is hybrid: every array slot `k` is both a leaf (weight `lls[k]`)
//! and an internal node with children `2k+1` and `2k+2`, the first
//! `(n + 1) / 2` slots carrying a cached aggregate of their subtree.

use rand::Rng;

/// Binary tree over `n` log weights with weighted random selection.
///
/// An optional inverse temperature `beta` flattens every leaf as
/// `min(beta * w, 0)` during aggregation and sampling while `get` still
/// returns the raw stored weight; the action cache uses this to sample at
/// chain temperature but report untempered score deltas.
#[derive(Debug, Clone)]
pub struct SegmentTree {
    lls: Vec<f64>,
    sums: Vec<f64>,
    n: usize,
    beta: f64,
}

fn child(k: usize) -> usize {
    2 * k + 1
}

fn parent(k: usize) -> usize {
    (k - 1) / 2
}

/// exp(x) with the all-mass-excluded case (`x = -inf - -inf = NaN`)
/// flushed to zero weight.
fn nan_safe_exp(x: f64) -> f64 {
    let v = x.exp();
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

/// Normalized three-way split {left subtree, right subtree, own leaf} of
/// one node's probability mass.
struct NodeMass {
    left: f64,
    right: f64,
    max_ll: f64,
    sum: f64,
}

impl SegmentTree {
    /// Creates a tree of `size` leaves, all at −∞ (zero weight).
    pub fn new(size: usize) -> Self {
        Self::with_beta(size, 1.0)
    }

    /// Creates a tree whose aggregation tempers every leaf by `beta`.
    pub fn with_beta(size: usize, beta: f64) -> Self {
        assert!(size > 0, "segment tree needs at least one leaf");
        Self {
            lls: vec![f64::NEG_INFINITY; size],
            sums: vec![f64::NEG_INFINITY; (size + 1) / 2],
            n: size,
            beta,
        }
    }

    fn subtree_sum(&self, k: usize) -> f64 {
        if k >= self.n {
            return f64::NEG_INFINITY;
        }
        if k >= self.sums.len() {
            (self.beta * self.lls[k]).min(0.0)
        } else {
            self.sums[k]
        }
    }

    fn node_mass(&self, k: usize) -> NodeMass {
        let left_sum = self.subtree_sum(child(k));
        let right_sum = self.subtree_sum(child(k) + 1);
        let own = (self.beta * self.lls[k]).min(0.0);
        let max_ll = own.max(left_sum).max(right_sum);
        let left = nan_safe_exp(left_sum - max_ll);
        let right = nan_safe_exp(right_sum - max_ll);
        let own = nan_safe_exp(own - max_ll);
        let sum = left + right + own;
        NodeMass {
            left: left / sum,
            right: right / sum,
            max_ll,
            sum,
        }
    }

    /// Sets leaf `k` to log weight `ll` and refreshes ancestor aggregates.
    ///
    /// A NaN weight means the caller's likelihood bookkeeping has drifted;
    /// this is fatal.
    pub fn set(&mut self, k: usize, ll: f64) {
        assert!(!ll.is_nan(), "NaN log weight for leaf {}", k);
        self.lls[k] = ll;
        let mut k = if k >= self.sums.len() { parent(k) } else { k };
        loop {
            let mass = self.node_mass(k);
            self.sums[k] = mass.max_ll + mass.sum.ln();
            if k == 0 {
                break;
            }
            k = parent(k);
        }
    }

    /// Raw (untempered) weight of leaf `k`.
    pub fn get(&self, k: usize) -> f64 {
        self.lls[k]
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.n
    }

    /// True when the tree holds no leaves with finite weight.
    pub fn is_empty(&self) -> bool {
        self.total() == f64::NEG_INFINITY
    }

    /// Log of the total (tempered) weight across all leaves.
    pub fn total(&self) -> f64 {
        self.subtree_sum(0)
    }

    /// Draws a leaf index with probability proportional to its tempered
    /// weight.
    ///
    /// Undefined when every leaf is at −∞; callers must not sample an
    /// empty distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let mut k = 0;
        loop {
            if k > self.n {
                return parent(k);
            }
            let mass = self.node_mass(k);
            let rv: f64 = rng.gen();
            if rv < mass.left {
                k = child(k);
            } else if rv < mass.left + mass.right {
                k = child(k) + 1;
            } else {
                return k;
            }
        }
    }
}
