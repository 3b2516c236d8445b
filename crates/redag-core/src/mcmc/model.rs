//! One MCMC replica at a fixed inverse temperature.

use rand::Rng;

use crate::action::{log_sum, SamplerFactory};
use crate::algo::SegmentTree;
use crate::bn::network::Network;
use crate::graph::ReleasedPairs;
use crate::mcmc::edge_list::EdgeList;
use crate::mcmc::state_cache::StateCache;

/// Score delta of candidate action `cand` for target `to`: the family
/// score after toggling the candidate edge, relative to the baseline the
/// target's sampler was created against. Candidate indices skip the
/// target itself.
fn family_score(net: &Network, to: u32, base_ll: f64, cand: usize) -> f64 {
    let v = if cand as u32 >= to {
        cand as u32 + 1
    } else {
        cand as u32
    };
    if net.edge_exists(v, to) {
        net.score_excluding(v, to) - base_ll
    } else {
        net.score_including(v, to) - base_ll
    }
}

/// One chain: an exclusive network, one action sampler per node, and the
/// proposal/accept state machine.
///
/// `step` is lazy: instead of simulating rejected proposals one by one it
/// draws the length of the self-transition run from the implied geometric
/// distribution and jumps the step counter, so a chain whose acceptance
/// mass is tiny still advances through its budget cheaply.
pub struct Model {
    n: usize,
    beta: f64,
    net: Network,
    ll: Vec<f64>,
    loglik: f64,
    steps: u64,
    transitions: SegmentTree,
    caches: Vec<StateCache>,
    current: Vec<usize>,
    factory: SamplerFactory,
    cached_states: usize,
    init_ll: f64,
    init_ll_del: f64,
    initialized: bool,
}

impl Model {
    /// Builds an uninitialized chain over its own copy of `base`.
    pub fn new(base: &Network, factory: SamplerFactory, cached_states: usize, beta: f64) -> Self {
        let net = base.clone_for_chain();
        let n = net.size();
        let init_ll = -((n * (n - 1)) as f64).ln();
        Self {
            n,
            beta,
            net,
            ll: vec![0.0; n],
            loglik: 0.0,
            steps: 0,
            transitions: SegmentTree::new(n),
            caches: Vec::new(),
            current: vec![0; n],
            factory,
            cached_states,
            init_ll,
            init_ll_del: init_ll - 2f64.ln(),
            initialized: false,
        }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Incrementally maintained total log-likelihood.
    pub fn log_likelihood(&self) -> f64 {
        self.loglik
    }

    /// From-scratch total, for drift cross-checks.
    pub fn compute_log_likelihood(&self) -> f64 {
        (0..self.n as u32).map(|i| self.net.score(i)).sum()
    }

    pub fn network(&self) -> &Network {
        &self.net
    }

    /// Prepares samplers and (optionally) a uniform random starting DAG.
    pub fn init<R: Rng + ?Sized>(&mut self, random_dag: bool, rng: &mut R) {
        assert!(!self.initialized, "chain initialized twice");
        if random_dag {
            self.sample_dag(rng);
        }
        self.loglik = 0.0;
        for i in 0..self.n {
            self.ll[i] = self.net.score(i as u32);
            self.loglik += self.ll[i];
        }
        for i in 0..self.n as u32 {
            self.caches.push(StateCache::new(self.cached_states));
            let key: Vec<u32> = self.net.parents(i).to_vec();
            let (factory, init_ll, beta, n) = (self.factory, self.init_ll, self.beta, self.n);
            let ll_i = self.ll[i as usize];
            let slot = self.caches[i as usize]
                .request(&key, || (factory.spark(n - 1, init_ll, beta), ll_i));
            self.current[i as usize] = slot;
            self.transitions
                .set(i as usize, self.caches[i as usize].sampler(slot).log_likelihood());
        }
        self.initialized = true;
    }

    /// Uniform DAG prior: a random topological order, each forward edge
    /// tossed in with probability 1/2.
    fn sample_dag<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order: Vec<u32> = (0..self.n as u32).collect();
        for i in (1..order.len()).rev() {
            order.swap(i, rng.gen_range(0..=i));
        }
        for i in 0..self.n {
            for j in i + 1..self.n {
                if rng.gen_bool(0.5) {
                    self.net.add_edge(order[i], order[j]);
                }
            }
        }
    }

    /// Re-enables actions whose blocking path disappeared with a removed
    /// edge.
    fn process_released(&mut self, released: &ReleasedPairs) {
        for &(v, u) in released {
            let action = if u > v { u - 1 } else { u };
            let slot = self.current[v as usize];
            {
                let net = &self.net;
                let cache = &mut self.caches[v as usize];
                let base = cache.base_ll(slot);
                let mut score = |i: usize| family_score(net, v, base, i);
                cache.sampler_mut(slot).re_enable_action(action, &mut score);
            }
            self.transitions
                .set(v as usize, self.caches[v as usize].sampler(slot).log_likelihood());
        }
    }

    /// Deactivates the node's sampler and requests one for its new parent
    /// set (rebuilt or recalled from the LRU).
    fn update_distribution(&mut self, to: u32) {
        let slot = self.current[to as usize];
        {
            let net = &self.net;
            let cache = &mut self.caches[to as usize];
            let base = cache.base_ll(slot);
            let mut score = |i: usize| family_score(net, to, base, i);
            cache.sampler_mut(slot).deactivate(&mut score);
        }
        let key: Vec<u32> = self.net.parents(to).to_vec();
        let (factory, init_ll, beta, n) = (self.factory, self.init_ll, self.beta, self.n);
        let ll_to = self.ll[to as usize];
        let slot = self.caches[to as usize]
            .request(&key, || (factory.spark(n - 1, init_ll, beta), ll_to));
        self.current[to as usize] = slot;
        self.transitions
            .set(to as usize, self.caches[to as usize].sampler(slot).log_likelihood());
    }

    fn add_edge(&mut self, from: u32, to: u32, action_ll: f64) {
        self.net.add_edge(from, to);
        self.ll[to as usize] += action_ll;
        self.loglik += action_ll;
        self.update_distribution(to);
    }

    fn remove_edge(&mut self, from: u32, to: u32, action_ll: f64) {
        let released = self.net.remove_edge(from, to);
        self.process_released(&released);
        self.ll[to as usize] += action_ll;
        self.loglik += action_ll;
        self.update_distribution(to);
    }

    fn update_ll(&mut self, to: u32, action_ll: f64) {
        self.ll[to as usize] += action_ll;
        self.loglik += action_ll;
        self.update_distribution(to);
    }

    /// Edge-reversal move: pick a random edge, and if flipping it keeps
    /// the graph acyclic, accept the flip by a Metropolis test on the two
    /// affected family scores.
    fn reverse<R: Rng + ?Sized>(&mut self, limit: u64, rng: &mut R) -> bool {
        self.steps += 1;
        let (from, to) = self.net.random_edge(rng);
        debug_assert_ne!(from, to);

        // A live witness path through this pair pins it: some query
        // depends on the edge, and flipping it would invalidate the
        // subscription bookkeeping wholesale.
        if self.net.is_subscribed(from, to) {
            return self.steps == limit;
        }

        let score_f = self.net.score(from);
        let score_t = self.net.score(to);
        let system_ll = score_f + score_t;

        let released = self.net.remove_edge(from, to);
        self.process_released(&released);
        if self.net.path_raw(from, to) {
            // Another directed route survives; the flip would close a
            // cycle. Restore and move on.
            self.net.add_edge(from, to);
            return self.steps == limit;
        }

        self.net.add_edge(to, from);
        let score_f_rev = self.net.score(from);
        let score_t_rev = self.net.score(to);
        let system_ll_rev = score_f_rev + score_t_rev;

        if rng.gen::<f64>().ln() < self.beta * (system_ll_rev - system_ll) {
            self.update_ll(to, score_t_rev - self.ll[to as usize]);
            self.update_ll(from, score_f_rev - self.ll[from as usize]);
        } else {
            let released = self.net.remove_edge(to, from);
            self.process_released(&released);
            self.net.add_edge(from, to);
        }
        self.steps == limit
    }

    /// Advances the chain toward `limit` steps.
    ///
    /// Returns `true` once the budget is reached (possibly without a
    /// mutation when the pending jump would overshoot); `false` means
    /// call again.
    pub fn step<R: Rng + ?Sized>(&mut self, limit: u64, rng: &mut R) -> bool {
        assert!(self.initialized, "stepping an uninitialized chain");
        let trll = self.transitions.total();
        let rmll = (self.net.edge_count() as f64).ln() + self.init_ll_del;
        // Per-action masses are capped at 1/(n(n-1)), so the structural
        // proposal mass cannot exceed certainty; anything above means the
        // likelihood bookkeeping drifted.
        assert!(
            trll <= 0.01,
            "structural proposal mass {trll} exceeds certainty"
        );
        let all_ll = log_sum(trll, rmll);

        // Lazy stepping: sample how many consecutive self-transitions the
        // chain would spend here and jump past them, with a fractional
        // coin to keep the expectation unbiased.
        let likelihood = all_ll.exp();
        let mut jump = 0.0;
        if likelihood < 1.0 {
            jump = (1.0 - likelihood) / likelihood;
        }
        jump += 1.0;
        if rng.gen::<f64>() < jump - jump.floor() {
            jump += 1.0;
        }
        if self.steps as f64 + jump > limit as f64 {
            return true;
        }
        self.steps = (self.steps as f64 + jump) as u64;

        if rng.gen::<f64>() < (rmll - all_ll).exp() {
            return self.reverse(limit, rng);
        }

        let node = self.transitions.sample(rng) as u32;
        let slot = self.current[node as usize];
        let (choice, last_ll) = {
            let net = &self.net;
            let cache = &mut self.caches[node as usize];
            let base = cache.base_ll(slot);
            let mut score = |i: usize| family_score(net, node, base, i);
            let sampler = cache.sampler_mut(slot);
            let choice = sampler.random_action(rng, &mut score);
            (choice, sampler.last_ll())
        };
        self.transitions
            .set(node as usize, self.caches[node as usize].sampler(slot).log_likelihood());

        let Some(action) = choice else {
            return self.steps == limit;
        };
        let parent = if action >= node { action + 1 } else { action };

        if self.net.edge_exists(parent, node) {
            self.remove_edge(parent, node, last_ll);
        } else if self.net.path_exists(node, parent) {
            // The edge would close a cycle; suppress the action until a
            // removal breaks the witness path.
            self.caches[node as usize]
                .sampler_mut(slot)
                .disable_action(action, last_ll);
            self.transitions
                .set(node as usize, self.caches[node as usize].sampler(slot).log_likelihood());
            return self.steps == limit;
        } else {
            self.add_edge(parent, node, last_ll);
        }

        self.steps == limit
    }

    /// Exchanges the entire structure and per-node likelihoods of two
    /// chains, rebuilding every sampler against its new parent set. Both
    /// chains must share the same variable order.
    pub fn swap_networks(a: &mut Model, b: &mut Model) {
        assert_eq!(a.n, b.n, "swapping chains over different networks");
        for to in 0..a.n as u32 {
            let a_set: Vec<u32> = a.net.parents(to).to_vec();
            let b_set: Vec<u32> = b.net.parents(to).to_vec();
            for &from in a_set.iter().filter(|f| !b_set.contains(*f)) {
                let released = a.net.remove_edge(from, to);
                a.process_released(&released);
                b.net.add_edge(from, to);
            }
            for &from in b_set.iter().filter(|f| !a_set.contains(*f)) {
                a.net.add_edge(from, to);
                let released = b.net.remove_edge(from, to);
                b.process_released(&released);
            }
            std::mem::swap(&mut a.ll[to as usize], &mut b.ll[to as usize]);
            a.update_distribution(to);
            b.update_distribution(to);
        }
        std::mem::swap(&mut a.loglik, &mut b.loglik);
    }

    /// Snapshot of the current DAG as a single-restart tally, keyed by
    /// the variables' stable input-order numbers.
    pub fn edge_list(&self) -> EdgeList {
        let mut edges = EdgeList::single();
        for to in 0..self.n as u32 {
            for &from in self.net.parents(to) {
                edges.add(
                    self.net.var(from).number() as u32,
                    self.net.var(to).number() as u32,
                    1.0,
                    1,
                );
            }
        }
        edges
    }

    /// Adjacency over stable variable numbers, for test harnesses.
    pub fn adj_matrix(&self) -> Vec<Vec<bool>> {
        let mut m = vec![vec![false; self.n]; self.n];
        for to in 0..self.n as u32 {
            for &from in self.net.parents(to) {
                m[self.net.var(from).number()][self.net.var(to).number()] = true;
            }
        }
        m
    }
}
