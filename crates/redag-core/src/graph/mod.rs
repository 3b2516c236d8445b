//! Incremental acyclicity oracle over the directed edge set.
//!
//! [`Graph`] owns forward and reverse adjacency plus an edge-existence
//! matrix, all arena-indexed: edges and path subscriptions live in slabs
//! with free lists and are referenced by dense integer ids, so removal is
//! swap-to-end O(1) and nothing owns anything cyclically.
//!
//! `path_exists(v, u)` answers in three tiers: a negative undirected
//! connectivity check is a correct fast "no"; a live subscription for the
//! pair is an O(1) "yes"; otherwise a bidirectional BFS looks for a
//! directed witness path and, on success, subscribes the pair to every
//! edge on it. Deleting any subscribed edge kills the subscription and
//! reports the pair to the caller, which the chain uses to re-enable
//! actions that stopped being cycle-making.

pub mod connectivity;

use std::collections::VecDeque;

use smallvec::SmallVec;

pub use connectivity::ComponentIndex;

const EMPTY: u32 = u32::MAX;

/// Pairs whose witness path died with a removed edge.
pub type ReleasedPairs = SmallVec<[(u32, u32); 4]>;

#[derive(Debug)]
struct EdgeSlot {
    from: u32,
    to: u32,
    /// Positions inside adj[from], radj[to] and the global edge list.
    pos: u32,
    rpos: u32,
    listpos: u32,
    subs: SmallVec<[u32; 4]>,
}

#[derive(Debug)]
struct SubSlot {
    v: u32,
    u: u32,
    /// Every edge on the witness path, for back-reference cleanup.
    edges: SmallVec<[u32; 8]>,
}

/// Directed graph with O(1) amortized mutation and cached reachability.
#[derive(Debug)]
pub struct Graph {
    n: usize,
    adj: Vec<Vec<u32>>,
    radj: Vec<Vec<u32>>,
    edge_list: Vec<u32>,
    /// n×n matrix of edge slot ids, EMPTY where no edge exists.
    edge_at: Vec<u32>,
    /// n×n matrix of live subscription counts per (from, to) pair.
    sub_count: Vec<u32>,
    edges: Vec<EdgeSlot>,
    free_edges: Vec<u32>,
    subs: Vec<SubSlot>,
    free_subs: Vec<u32>,
    connectivity: ComponentIndex,
}

impl Graph {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            adj: vec![Vec::new(); n],
            radj: vec![Vec::new(); n],
            edge_list: Vec::new(),
            edge_at: vec![EMPTY; n * n],
            sub_count: vec![0; n * n],
            edges: Vec::new(),
            free_edges: Vec::new(),
            subs: Vec::new(),
            free_subs: Vec::new(),
            connectivity: ComponentIndex::new(n),
        }
    }

    /// Structural copy: same edges, no subscriptions carried over.
    pub fn clone_structure(&self) -> Self {
        let mut g = Self::new(self.n);
        for &id in &self.edge_list {
            let e = &self.edges[id as usize];
            g.add_edge(e.from, e.to);
        }
        g
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn edge_count(&self) -> usize {
        self.edge_list.len()
    }

    fn cell(&self, from: u32, to: u32) -> usize {
        from as usize * self.n + to as usize
    }

    pub fn edge_exists(&self, from: u32, to: u32) -> bool {
        self.edge_at[self.cell(from, to)] != EMPTY
    }

    /// True while some queried pair holds a live witness path through
    /// (from, to)'s endpoints.
    pub fn is_subscribed(&self, from: u32, to: u32) -> bool {
        self.sub_count[self.cell(from, to)] != 0
    }

    pub fn in_degree(&self, to: u32) -> usize {
        self.radj[to as usize].len()
    }

    pub fn out_degree(&self, from: u32) -> usize {
        self.adj[from as usize].len()
    }

    pub fn parents(&self, to: u32) -> impl Iterator<Item = u32> + '_ {
        self.radj[to as usize]
            .iter()
            .map(|&id| self.edges[id as usize].from)
    }

    pub fn children(&self, from: u32) -> impl Iterator<Item = u32> + '_ {
        self.adj[from as usize]
            .iter()
            .map(|&id| self.edges[id as usize].to)
    }

    /// Uniformly chosen existing edge; caller must ensure the graph has
    /// at least one.
    pub fn random_edge<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> (u32, u32) {
        let id = self.edge_list[rng.gen_range(0..self.edge_list.len())];
        let e = &self.edges[id as usize];
        (e.from, e.to)
    }

    pub fn add_edge(&mut self, from: u32, to: u32) {
        debug_assert!(!self.edge_exists(from, to), "edge {}->{} added twice", from, to);
        let slot = EdgeSlot {
            from,
            to,
            pos: self.adj[from as usize].len() as u32,
            rpos: self.radj[to as usize].len() as u32,
            listpos: self.edge_list.len() as u32,
            subs: SmallVec::new(),
        };
        let id = match self.free_edges.pop() {
            Some(id) => {
                self.edges[id as usize] = slot;
                id
            }
            None => {
                self.edges.push(slot);
                (self.edges.len() - 1) as u32
            }
        };
        let cell = self.cell(from, to);
        self.edge_at[cell] = id;
        self.adj[from as usize].push(id);
        self.radj[to as usize].push(id);
        self.edge_list.push(id);
        self.connectivity.add(from, to);
    }

    /// Removes the edge and returns every (v, u) pair whose cached
    /// witness path ran through it; those pairs may have become
    /// unreachable and the caller must re-examine their actions.
    pub fn remove_edge(&mut self, from: u32, to: u32) -> ReleasedPairs {
        let cell = self.cell(from, to);
        let id = self.edge_at[cell];
        debug_assert_ne!(id, EMPTY, "removing absent edge {}->{}", from, to);

        let released = self.unsubscribe_edge(id);

        let (pos, rpos, listpos) = {
            let e = &self.edges[id as usize];
            (e.pos as usize, e.rpos as usize, e.listpos as usize)
        };

        let nei = &mut self.adj[from as usize];
        nei.swap_remove(pos);
        if pos < nei.len() {
            let moved = nei[pos];
            self.edges[moved as usize].pos = pos as u32;
        }
        let rnei = &mut self.radj[to as usize];
        rnei.swap_remove(rpos);
        if rpos < rnei.len() {
            let moved = rnei[rpos];
            self.edges[moved as usize].rpos = rpos as u32;
        }
        self.edge_list.swap_remove(listpos);
        if listpos < self.edge_list.len() {
            let moved = self.edge_list[listpos];
            self.edges[moved as usize].listpos = listpos as u32;
        }

        self.edge_at[cell] = EMPTY;
        self.free_edges.push(id);
        self.connectivity.remove(from, to);
        released
    }

    /// Kills every subscription routed through edge `id`.
    fn unsubscribe_edge(&mut self, id: u32) -> ReleasedPairs {
        let mut released = ReleasedPairs::new();
        let sub_ids = std::mem::take(&mut self.edges[id as usize].subs);
        for sid in sub_ids {
            let sub = std::mem::replace(
                &mut self.subs[sid as usize],
                SubSlot {
                    v: EMPTY,
                    u: EMPTY,
                    edges: SmallVec::new(),
                },
            );
            let cell = self.cell(sub.v, sub.u);
            debug_assert!(self.sub_count[cell] > 0);
            self.sub_count[cell] -= 1;
            released.push((sub.v, sub.u));
            for eid in sub.edges {
                if eid != id {
                    self.edges[eid as usize].subs.retain(|s| *s != sid);
                }
            }
            self.free_subs.push(sid);
        }
        released
    }

    /// Directed-path query with subscription caching.
    pub fn path_exists(&mut self, from: u32, to: u32) -> bool {
        if !self.connectivity.is_connected(from, to) {
            return false;
        }
        if self.sub_count[self.cell(from, to)] > 0 {
            return true;
        }
        self.meet_in_the_middle(from, to)
    }

    /// Bidirectional BFS for a directed path from → to. On success the
    /// pair subscribes to every edge of the witness path found.
    pub fn meet_in_the_middle(&mut self, from: u32, to: u32) -> bool {
        let n = self.n;
        let mut vis = vec![0u32; n];
        let mut parent = vec![0u32; n];
        // true = expanding forward from `from`, false = backward from `to`.
        let mut side = vec![false; n];
        let mut forward = VecDeque::from([from]);
        let mut backward = VecDeque::from([to]);
        vis[from as usize] = 1;
        vis[to as usize] = 1;
        side[from as usize] = true;

        // Alternate until a frontier meets the other or one side runs out
        // of reachable nodes (a definitive "no path").
        loop {
            if let Some(meet) = self.bfs_step(&mut forward, &mut vis, &mut side, &mut parent) {
                self.subscribe_path(meet, from, to, &parent);
                return true;
            }
            if forward.is_empty() {
                return false;
            }
            if let Some(meet) = self.bfs_step(&mut backward, &mut vis, &mut side, &mut parent) {
                self.subscribe_path(meet, from, to, &parent);
                return true;
            }
            if backward.is_empty() {
                return false;
            }
        }
    }

    /// Expands one queue node; a returned pair (x, y) is a directed edge
    /// x → y joining the two search frontiers.
    fn bfs_step(
        &self,
        queue: &mut VecDeque<u32>,
        vis: &mut [u32],
        side: &mut [bool],
        parent: &mut [u32],
    ) -> Option<(u32, u32)> {
        let v = *queue.front().expect("bfs_step on empty queue");
        queue.pop_front();
        let forward = side[v as usize];
        let nei = if forward {
            &self.adj[v as usize]
        } else {
            &self.radj[v as usize]
        };
        for &id in nei {
            let e = &self.edges[id as usize];
            let u = if forward { e.to } else { e.from };
            if vis[u as usize] == 0 {
                vis[u as usize] = vis[v as usize] + 1;
                side[u as usize] = forward;
                parent[u as usize] = v;
                queue.push_back(u);
            } else if side[u as usize] != forward {
                return Some(if forward { (v, u) } else { (u, v) });
            }
        }
        None
    }

    /// Registers a subscription for (first, last) along the witness path
    /// reconstructed from the meeting edge and the BFS parent pointers.
    fn subscribe_path(&mut self, meet: (u32, u32), first: u32, last: u32, parent: &[u32]) {
        let sid = match self.free_subs.pop() {
            Some(sid) => sid,
            None => {
                self.subs.push(SubSlot {
                    v: EMPTY,
                    u: EMPTY,
                    edges: SmallVec::new(),
                });
                (self.subs.len() - 1) as u32
            }
        };
        let pair_cell = self.cell(first, last);
        self.sub_count[pair_cell] += 1;

        let mut path_edges: SmallVec<[u32; 8]> = SmallVec::new();
        // Forward half: walk the meeting edge back to `first`.
        let (mut v, mut u) = meet;
        while u != first {
            path_edges.push(self.edge_at[self.cell(v, u)]);
            u = v;
            v = parent[v as usize];
        }
        // Backward half: descend from the meeting node to `last`.
        let mut v = meet.1;
        while v != last {
            let u = parent[v as usize];
            path_edges.push(self.edge_at[self.cell(v, u)]);
            v = u;
        }

        for &eid in &path_edges {
            debug_assert_ne!(eid, EMPTY, "witness path crosses a missing edge");
            self.edges[eid as usize].subs.push(sid);
        }
        self.subs[sid as usize] = SubSlot {
            v: first,
            u: last,
            edges: path_edges,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Floyd–Warshall style reachability reference.
    fn reference_reach(adj: &[Vec<bool>]) -> Vec<Vec<bool>> {
        let n = adj.len();
        let mut reach = adj.to_vec();
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    reach[i][j] = reach[i][j] || (reach[i][k] && reach[k][j]);
                }
            }
        }
        reach
    }

    #[test]
    fn path_exists_matches_reference_on_random_dags() {
        for rep in 0..10u64 {
            let n = 16usize;
            let mut rng = ChaCha8Rng::seed_from_u64(rep);
            let mut g = Graph::new(n);
            let mut adj = vec![vec![false; n]; n];
            for _ in 0..1000 {
                let from = rng.gen_range(0..n);
                let to = rng.gen_range(0..n);
                if from == to {
                    continue;
                }
                if adj[from][to] {
                    adj[from][to] = false;
                    g.remove_edge(from as u32, to as u32);
                } else {
                    // Keep the graph a DAG, matching the oracle's usage.
                    let reach = reference_reach(&adj);
                    if reach[to][from] {
                        continue;
                    }
                    adj[from][to] = true;
                    g.add_edge(from as u32, to as u32);
                }
                let reach = reference_reach(&adj);
                for v in 0..n {
                    for u in 0..n {
                        if v != u {
                            assert_eq!(
                                g.path_exists(v as u32, u as u32),
                                reach[v][u],
                                "rep {} pair {}->{}",
                                rep,
                                v,
                                u
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn subscription_survives_unrelated_removal() {
        let mut g = Graph::new(4);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(3, 2);
        assert!(g.path_exists(0, 2));
        assert!(g.is_subscribed(0, 2));
        let released = g.remove_edge(3, 2);
        assert!(released.is_empty());
        assert!(g.is_subscribed(0, 2));
        assert!(g.path_exists(0, 2));
    }

    #[test]
    fn removal_on_witness_path_releases_pair() {
        let mut g = Graph::new(4);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        assert!(g.path_exists(0, 3));
        let released = g.remove_edge(1, 2);
        assert_eq!(released.as_slice(), &[(0, 3)]);
        assert!(!g.is_subscribed(0, 3));
        assert!(!g.path_exists(0, 3));
    }

    #[test]
    fn swap_removal_keeps_adjacency_consistent() {
        let mut g = Graph::new(5);
        g.add_edge(0, 1);
        g.add_edge(0, 2);
        g.add_edge(0, 3);
        g.add_edge(4, 3);
        g.remove_edge(0, 2);
        let children: Vec<u32> = g.children(0).collect();
        assert_eq!(children.len(), 2);
        assert!(children.contains(&1) && children.contains(&3));
        let parents: Vec<u32> = g.parents(3).collect();
        assert!(parents.contains(&0) && parents.contains(&4));
        g.remove_edge(0, 1);
        g.remove_edge(0, 3);
        g.remove_edge(4, 3);
        assert_eq!(g.edge_count(), 0);
    }
}
