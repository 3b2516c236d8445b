//! The scored DAG one chain mutates.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::bn::sf::ScoringFunction;
use crate::bn::variable::Variable;
use crate::errors::EngineError;
use crate::graph::{Graph, ReleasedPairs};

/// A Bayesian network: shared read-only variables, one exclusive graph,
/// and the scoring function.
///
/// Every chain owns an independent `Network` (cloned via
/// [`Network::clone_for_chain`]); the variables and scoring function are
/// shared behind `Arc`s, the graph and parent sets are not. The graph is
/// acyclic at all times; callers validate against
/// [`Network::path_exists`] before committing an edge.
pub struct Network {
    variables: Arc<Vec<Variable>>,
    score_fn: Arc<dyn ScoringFunction>,
    graph: Graph,
    /// Sorted parent list per node, mirroring the reverse adjacency for
    /// cheap scoring and stable cache keys.
    parent_sets: Vec<Vec<u32>>,
}

impl Network {
    pub fn new(
        variables: Vec<Variable>,
        score_fn: Arc<dyn ScoringFunction>,
    ) -> Result<Self, EngineError> {
        if variables.len() < 2 {
            return Err(EngineError::Data(
                "a network needs at least two variables".into(),
            ));
        }
        let observations = variables[0].observation_count();
        if variables
            .iter()
            .any(|v| v.observation_count() != observations)
        {
            return Err(EngineError::Data(
                "variables disagree on observation count".into(),
            ));
        }
        let n = variables.len();
        Ok(Self {
            variables: Arc::new(variables),
            score_fn,
            graph: Graph::new(n),
            parent_sets: vec![Vec::new(); n],
        })
    }

    /// Independent copy for one chain: exclusive graph and parent sets,
    /// shared variables and scoring function.
    pub fn clone_for_chain(&self) -> Self {
        Self {
            variables: Arc::clone(&self.variables),
            score_fn: Arc::clone(&self.score_fn),
            graph: self.graph.clone_structure(),
            parent_sets: self.parent_sets.clone(),
        }
    }

    /// Copy with the variables in a fresh random order, breaking any
    /// systematic bias from input column order. All chains of one restart
    /// share a single permutation so their structures stay exchangeable
    /// under replica swaps; outputs map back through
    /// [`Variable::number`]. The graph must still be empty.
    pub fn permuted_clone<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Self {
        debug_assert_eq!(self.edge_count(), 0, "permuting a non-empty graph");
        let mut order: Vec<usize> = (0..self.size()).collect();
        for i in (1..order.len()).rev() {
            order.swap(i, rng.gen_range(0..=i));
        }
        let variables: Vec<Variable> =
            order.iter().map(|&i| self.variables[i].clone()).collect();
        Self {
            variables: Arc::new(variables),
            score_fn: Arc::clone(&self.score_fn),
            graph: Graph::new(self.size()),
            parent_sets: vec![Vec::new(); self.size()],
        }
    }

    pub fn size(&self) -> usize {
        self.variables.len()
    }

    pub fn var(&self, i: u32) -> &Variable {
        &self.variables[i as usize]
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edge_exists(&self, from: u32, to: u32) -> bool {
        self.graph.edge_exists(from, to)
    }

    pub fn is_subscribed(&self, from: u32, to: u32) -> bool {
        self.graph.is_subscribed(from, to)
    }

    /// Sorted parent indices of `to`.
    pub fn parents(&self, to: u32) -> &[u32] {
        &self.parent_sets[to as usize]
    }

    pub fn random_edge<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> (u32, u32) {
        self.graph.random_edge(rng)
    }

    pub fn add_edge(&mut self, from: u32, to: u32) {
        self.graph.add_edge(from, to);
        let set = &mut self.parent_sets[to as usize];
        let at = set.partition_point(|&p| p < from);
        debug_assert!(set.get(at) != Some(&from));
        set.insert(at, from);
    }

    /// Removes an edge, reporting the (from, to) pairs whose cached
    /// witness paths died with it.
    pub fn remove_edge(&mut self, from: u32, to: u32) -> ReleasedPairs {
        let released = self.graph.remove_edge(from, to);
        let set = &mut self.parent_sets[to as usize];
        let at = set.partition_point(|&p| p < from);
        debug_assert_eq!(set.get(at), Some(&from));
        set.remove(at);
        released
    }

    /// Cached directed-path query (subscribes on success).
    pub fn path_exists(&mut self, from: u32, to: u32) -> bool {
        self.graph.path_exists(from, to)
    }

    /// Uncached directed-path search, bypassing the subscription fast
    /// path; used by the reversal move right after it removed an edge.
    pub fn path_raw(&mut self, from: u32, to: u32) -> bool {
        self.graph.meet_in_the_middle(from, to)
    }

    fn parent_vars<'a>(&'a self, to: u32, set: &[u32]) -> SmallVec<[&'a Variable; 8]> {
        debug_assert!(!set.contains(&to));
        set.iter().map(|&p| &self.variables[p as usize]).collect()
    }

    /// Family score of `to` under its current parent set.
    pub fn score(&self, to: u32) -> f64 {
        let parents = self.parent_vars(to, &self.parent_sets[to as usize]);
        self.score_fn.score(self.var(to), &parents)
    }

    /// Family score of `to` if `from` were added to its parents.
    pub fn score_including(&self, from: u32, to: u32) -> f64 {
        let set = &self.parent_sets[to as usize];
        debug_assert!(!set.contains(&from));
        let mut parents = self.parent_vars(to, set);
        parents.push(self.var(from));
        self.score_fn.score(self.var(to), &parents)
    }

    /// Family score of `to` if `from` were dropped from its parents.
    pub fn score_excluding(&self, from: u32, to: u32) -> f64 {
        let set = &self.parent_sets[to as usize];
        debug_assert!(set.contains(&from));
        let parents: SmallVec<[&Variable; 8]> = set
            .iter()
            .filter(|&&p| p != from)
            .map(|&p| &self.variables[p as usize])
            .collect();
        self.score_fn.score(self.var(to), &parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bn::sf::Bde;

    fn toy_network() -> Network {
        let a = vec![0.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let b = vec![0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let c = vec![0.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let vars = vec![
            Variable::new("A", &a, 2, 0).unwrap(),
            Variable::new("B", &b, 2, 1).unwrap(),
            Variable::new("C", &c, 2, 2).unwrap(),
        ];
        Network::new(vars, Arc::new(Bde::default())).unwrap()
    }

    #[test]
    fn parent_sets_track_edges_sorted() {
        let mut net = toy_network();
        net.add_edge(2, 1);
        net.add_edge(0, 1);
        assert_eq!(net.parents(1), &[0, 2]);
        net.remove_edge(2, 1);
        assert_eq!(net.parents(1), &[0]);
    }

    #[test]
    fn score_including_matches_score_after_add() {
        let mut net = toy_network();
        let predicted = net.score_including(0, 2);
        net.add_edge(0, 2);
        assert!((net.score(2) - predicted).abs() < 1e-12);
        let back = net.score_excluding(0, 2);
        net.remove_edge(0, 2);
        assert!((net.score(2) - back).abs() < 1e-12);
    }

    #[test]
    fn chain_clone_is_independent() {
        let mut net = toy_network();
        net.add_edge(0, 1);
        let mut copy = net.clone_for_chain();
        copy.add_edge(0, 2);
        assert!(copy.edge_exists(0, 1));
        assert!(!net.edge_exists(0, 2));
    }
}
