//! Undirected dynamic-connectivity mirror of the directed edge set.
//!
//! The oracle uses this as a fast negative filter: two nodes in different
//! undirected components cannot have a directed path between them. Queries
//! must be O(1); updates may cost up to the smaller side of the affected
//! component.
//!
//! Every node carries a component label. Inserting an edge that bridges
//! two components relabels the smaller one; deleting an edge runs two
//! alternating breadth-first searches from the endpoints and, when they
//! fail to meet, relabels whichever fragment exhausted first (that
//! fragment is fully enumerated, so the relabel touches exactly its
//! members).

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

/// Component labeling over an undirected multigraph under edge
/// insertions and deletions.
///
/// Neighbors carry multiplicities: a replica swap can transiently hold
/// both orientations of a directed pair, which mirror to two parallel
/// undirected edges, and removing one of them must not split anything.
#[derive(Debug)]
pub struct ComponentIndex {
    adj: Vec<FxHashMap<u32, u32>>,
    comp: Vec<u32>,
    members: FxHashMap<u32, Vec<u32>>,
    next_label: u32,
}

impl ComponentIndex {
    pub fn new(n: usize) -> Self {
        let comp: Vec<u32> = (0..n as u32).collect();
        let members = comp.iter().map(|&c| (c, vec![c])).collect();
        Self {
            adj: vec![FxHashMap::default(); n],
            comp,
            members,
            next_label: n as u32,
        }
    }

    /// Same-component query; O(1).
    pub fn is_connected(&self, u: u32, v: u32) -> bool {
        self.comp[u as usize] == self.comp[v as usize]
    }

    pub fn add(&mut self, u: u32, v: u32) {
        debug_assert_ne!(u, v);
        *self.adj[u as usize].entry(v).or_insert(0) += 1;
        *self.adj[v as usize].entry(u).or_insert(0) += 1;

        let cu = self.comp[u as usize];
        let cv = self.comp[v as usize];
        if cu == cv {
            return;
        }
        let (keep, merge) = if self.members[&cu].len() >= self.members[&cv].len() {
            (cu, cv)
        } else {
            (cv, cu)
        };
        let moved = self.members.remove(&merge).expect("dangling component label");
        for &node in &moved {
            self.comp[node as usize] = keep;
        }
        self.members.get_mut(&keep).expect("dangling component label").extend(moved);
    }

    pub fn remove(&mut self, u: u32, v: u32) {
        let count = self
            .adj[u as usize]
            .get_mut(&v)
            .expect("removing absent edge");
        *count -= 1;
        if *count > 0 {
            // A parallel edge still bridges the pair.
            *self.adj[v as usize].get_mut(&u).expect("asymmetric adjacency") -= 1;
            return;
        }
        self.adj[u as usize].remove(&v);
        let back = self.adj[v as usize].get_mut(&u).expect("asymmetric adjacency");
        *back -= 1;
        debug_assert_eq!(*back, 0);
        self.adj[v as usize].remove(&u);

        // Alternate one expansion per side; the first side to exhaust is a
        // complete fragment. If the searches touch, the component is
        // intact and no relabel happens.
        let mut seen_u = FxHashSet::default();
        let mut seen_v = FxHashSet::default();
        let mut queue_u = VecDeque::from([u]);
        let mut queue_v = VecDeque::from([v]);
        seen_u.insert(u);
        seen_v.insert(v);
        loop {
            match queue_u.pop_front() {
                None => {
                    self.split(&seen_u);
                    return;
                }
                Some(x) => {
                    for &y in self.adj[x as usize].keys() {
                        if seen_v.contains(&y) {
                            return;
                        }
                        if seen_u.insert(y) {
                            queue_u.push_back(y);
                        }
                    }
                }
            }
            match queue_v.pop_front() {
                None => {
                    self.split(&seen_v);
                    return;
                }
                Some(x) => {
                    for &y in self.adj[x as usize].keys() {
                        if seen_u.contains(&y) {
                            return;
                        }
                        if seen_v.insert(y) {
                            queue_v.push_back(y);
                        }
                    }
                }
            }
        }
    }

    /// Carves `fragment` out of its current component under a fresh label.
    fn split(&mut self, fragment: &FxHashSet<u32>) {
        let sample = *fragment.iter().next().expect("empty fragment");
        let old = self.comp[sample as usize];
        debug_assert!(
            fragment.len() < self.members[&old].len(),
            "split of an entire component"
        );
        let label = self.next_label;
        self.next_label += 1;
        self.members
            .get_mut(&old)
            .expect("dangling component label")
            .retain(|node| !fragment.contains(node));
        let moved: Vec<u32> = fragment.iter().copied().collect();
        for &node in &moved {
            self.comp[node as usize] = label;
        }
        self.members.insert(label, moved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Brute-force reference: one flood fill labeling every component.
    fn reference_labels(adj: &[Vec<bool>]) -> Vec<usize> {
        let n = adj.len();
        let mut label = vec![usize::MAX; n];
        let mut next = 0;
        for start in 0..n {
            if label[start] != usize::MAX {
                continue;
            }
            let mut stack = vec![start];
            label[start] = next;
            while let Some(x) = stack.pop() {
                for y in 0..n {
                    if adj[x][y] && label[y] == usize::MAX {
                        label[y] = next;
                        stack.push(y);
                    }
                }
            }
            next += 1;
        }
        label
    }

    #[test]
    fn matches_brute_force_under_random_mutation() {
        for size in (2..33).step_by(3) {
            let mut rng = ChaCha8Rng::seed_from_u64(42 + size as u64);
            let mut index = ComponentIndex::new(size);
            let mut adj = vec![vec![false; size]; size];
            for _ in 0..2 * size * size {
                let u = rng.gen_range(0..size);
                let v = rng.gen_range(0..size);
                if u == v {
                    continue;
                }
                if adj[u][v] {
                    adj[u][v] = false;
                    adj[v][u] = false;
                    index.remove(u as u32, v as u32);
                } else {
                    adj[u][v] = true;
                    adj[v][u] = true;
                    index.add(u as u32, v as u32);
                }
                let labels = reference_labels(&adj);
                for w in 0..size {
                    for z in 0..size {
                        if w != z {
                            assert_eq!(
                                index.is_connected(w as u32, z as u32),
                                labels[w] == labels[z],
                                "size {} pair {}-{}",
                                size,
                                w,
                                z
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn parallel_edges_keep_the_pair_connected() {
        let mut index = ComponentIndex::new(3);
        index.add(0, 1);
        index.add(1, 0);
        index.remove(0, 1);
        assert!(index.is_connected(0, 1));
        index.remove(1, 0);
        assert!(!index.is_connected(0, 1));
        assert!(!index.is_connected(1, 2));
    }

    #[test]
    fn chain_split_and_rejoin() {
        let mut index = ComponentIndex::new(5);
        for (u, v) in [(0, 1), (1, 2), (2, 3), (3, 4)] {
            index.add(u, v);
        }
        assert!(index.is_connected(0, 4));
        index.remove(2, 3);
        assert!(index.is_connected(0, 2));
        assert!(index.is_connected(3, 4));
        assert!(!index.is_connected(0, 4));
        index.add(0, 4);
        assert!(index.is_connected(2, 3));
    }
}
