//! Mergeable edge-probability tallies.

use rustc_hash::FxHashMap;

/// One directed edge's accumulated evidence: `hits` occurrences over
/// `weight` samples; the probability estimate is their ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeStat {
    pub from: u32,
    pub to: u32,
    pub hits: f64,
    pub weight: u64,
}

impl EdgeStat {
    pub fn probability(&self) -> f64 {
        self.hits / self.weight as f64
    }
}

/// Edge tallies over some number of merged restarts.
///
/// Merging keeps an exact online weighted mean: an edge missing from one
/// side is treated as a zero-hit observation carrying that side's sample
/// count, so after any merge order every entry's `weight` equals the
/// total number of restarts folded in. The operation is commutative and
/// associative up to float rounding, which is what lets restarts complete
/// in any order.
#[derive(Debug, Default, Clone)]
pub struct EdgeList {
    edges: FxHashMap<(u32, u32), EdgeStat>,
    merged: u64,
}

impl EdgeList {
    /// Empty accumulator representing zero restarts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty tally representing a single restart; the caller records the
    /// restart's edges with [`EdgeList::add`].
    pub fn single() -> Self {
        Self {
            edges: FxHashMap::default(),
            merged: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of restarts this tally represents.
    pub fn restarts(&self) -> u64 {
        self.merged
    }

    pub fn get(&self, from: u32, to: u32) -> Option<&EdgeStat> {
        self.edges.get(&(from, to))
    }

    /// Records one edge observation; at most one entry per ordered pair.
    pub fn add(&mut self, from: u32, to: u32, hits: f64, weight: u64) {
        let prev = self.edges.insert(
            (from, to),
            EdgeStat {
                from,
                to,
                hits,
                weight,
            },
        );
        assert!(prev.is_none(), "duplicate edge {}->{} in tally", from, to);
    }

    /// Folds another tally in, weight-averaging overlapping edges and
    /// back-filling zero observations on both sides.
    pub fn merge(&mut self, other: &EdgeList) {
        for stat in self.edges.values_mut() {
            if !other.edges.contains_key(&(stat.from, stat.to)) {
                stat.weight += other.merged;
            }
        }
        for (&(from, to), stat) in &other.edges {
            match self.edges.get_mut(&(from, to)) {
                Some(local) => {
                    local.hits += stat.hits;
                    local.weight += stat.weight;
                }
                None => self.add(from, to, stat.hits, stat.weight + self.merged),
            }
        }
        self.merged += other.merged;
    }

    /// Entries sorted by ascending probability, ties broken by pair.
    pub fn sorted(&self) -> Vec<EdgeStat> {
        let mut out: Vec<EdgeStat> = self.edges.values().copied().collect();
        out.sort_by(|a, b| {
            a.probability()
                .partial_cmp(&b.probability())
                .expect("NaN probability")
                .then_with(|| (a.from, a.to).cmp(&(b.from, b.to)))
        });
        out
    }
}
