//! Lazily materialized categorical distribution over one node's actions.
//!
//! Computing an action's exact weight costs a score evaluation, so the
//! full n−1-action distribution is never materialized up front. The
//! sampler starts in a **cold** phase that treats every action as carrying
//! a shared optimistic estimate and corrects by rejection sampling. Once
//! drawn from often enough it warms up: actions are partitioned into
//! fixed-size batches forming the leaves of a [`SegmentTree`] (plus one
//! extra leaf for the shared [`ActionCache`]); a batch stays *unresolved*
//! (estimate-weighted, members unknown) until a majority of its members
//! have been sampled, at which point every member's exact weight is
//! computed and the best ones migrate into the cache.
//!
//! Mass bookkeeping invariant: the cache leaf plus every batch leaf plus
//! the disabled set always accounts for exactly the full action mass.

use rand::Rng;
use rustc_hash::FxHashMap;

use crate::action::{log_sub, log_sum, ActionCache, EPS};
use crate::algo::SegmentTree;

/// Exact-weight oracle for one target node's candidate actions.
///
/// The chain owns the network, so the score function cannot be captured
/// inside the sampler; callers pass it to every operation that may need
/// to materialize a weight.
pub type ScoreFn<'a> = &'a mut dyn FnMut(usize) -> f64;

/// Batched, cache-backed sampler over the n−1 candidate actions of one
/// target node.
#[derive(Debug)]
pub struct ActionSampler {
    n: usize,
    batch_size: usize,
    batches: usize,
    cache_size: usize,
    initial_ll: f64,
    beta: f64,
    hits: usize,
    last_ll: f64,
    warm: Option<WarmState>,
    disabled: FxHashMap<u32, f64>,
}

#[derive(Debug)]
struct WarmState {
    /// Batch leaves 0..batches, cache leaf at index `batches`.
    actions: SegmentTree,
    cache: ActionCache,
    batch_hits: Vec<u16>,
    /// Best tempered weight seen per resolved batch; f32 keeps the
    /// per-node footprint small across thousands of cached samplers.
    batch_max_ll: Vec<f32>,
    batch_resolved: Vec<bool>,
}

impl ActionSampler {
    pub fn new(n: usize, batch_size: usize, cache_size: usize, initial_ll: f64, beta: f64) -> Self {
        assert!(n > 0, "sampler over an empty action set");
        let batch_size = batch_size.clamp(1, n);
        let batches = n.div_ceil(batch_size);
        Self {
            n,
            batch_size,
            batches,
            cache_size,
            initial_ll,
            beta,
            hits: 0,
            last_ll: f64::NEG_INFINITY,
            warm: None,
            disabled: FxHashMap::default(),
        }
    }

    fn batch_len(&self, b: usize) -> usize {
        if b < self.batches - 1 {
            self.batch_size
        } else {
            self.n - (self.batches - 1) * self.batch_size
        }
    }

    fn batch_of(&self, action: u32) -> usize {
        action as usize / self.batch_size
    }

    /// Raw weight of the most recently materialized action.
    pub fn last_ll(&self) -> f64 {
        self.last_ll
    }

    /// Live total mass of the distribution (tempered log space).
    pub fn log_likelihood(&self) -> f64 {
        match &self.warm {
            None => ((self.n - self.disabled.len()) as f64).ln() + self.initial_ll,
            Some(warm) => warm.actions.total(),
        }
    }

    fn refresh_cache_leaf(&mut self) {
        let warm = self.warm.as_mut().expect("cache leaf refresh before warm-up");
        let mass = warm.cache.log_likelihood() + self.initial_ll;
        warm.actions.set(self.batches, mass);
    }

    /// Transitions to the warm phase: every batch starts unresolved at
    /// the shared estimate, then pending disables are replayed.
    fn warm_up<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut actions = SegmentTree::new(self.batches + 1);
        for b in 0..self.batches {
            actions.set(b, self.initial_ll + (self.batch_len(b) as f64).ln());
        }
        self.warm = Some(WarmState {
            actions,
            cache: ActionCache::new(self.cache_size, self.beta, rng),
            batch_hits: vec![0; self.batches],
            batch_max_ll: vec![f32::NEG_INFINITY; self.batches],
            batch_resolved: vec![false; self.batches],
        });
        let pending: Vec<(u32, f64)> = self.disabled.iter().map(|(a, ll)| (*a, *ll)).collect();
        for (action, ll) in pending {
            self.apply_disable(action, ll);
        }
    }

    /// Rejection test against the optimistic estimate: accept a uniform
    /// candidate with probability exp(beta * weight).
    fn try_action<R: Rng + ?Sized>(
        &mut self,
        pos: u32,
        rng: &mut R,
        score: ScoreFn<'_>,
    ) -> Option<u32> {
        self.last_ll = score(pos as usize);
        let ll = self.beta * self.last_ll;
        if rng.gen::<f64>().ln() < ll {
            Some(pos)
        } else {
            None
        }
    }

    /// Draws one action, or `None` when the draw was rejected (a
    /// self-transition from the chain's point of view).
    pub fn random_action<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        score: ScoreFn<'_>,
    ) -> Option<u32> {
        self.hits += 1;
        if self.warm.is_none() {
            debug_assert!(self.disabled.len() < self.n);
            let mut pos;
            loop {
                pos = rng.gen_range(0..self.n) as u32;
                if !self.disabled.contains_key(&pos) {
                    break;
                }
            }
            let result = self.try_action(pos, rng, score);
            if self.hits > (self.batch_size + self.cache_size) / 2 {
                self.warm_up(rng);
            }
            return result;
        }

        let node = self.warm.as_ref().unwrap().actions.sample(rng);
        if node == self.batches {
            let warm = self.warm.as_mut().unwrap();
            let action = warm.cache.sample(rng);
            self.last_ll = warm.cache.last_ll();
            return Some(action);
        }

        let mut iters = 0usize;
        if self.warm.as_ref().unwrap().batch_resolved[node] {
            let bs = self.batch_len(node);
            loop {
                let mut curr;
                loop {
                    curr = (rng.gen_range(0..bs) + node * self.batch_size) as u32;
                    iters += 1;
                    if iters == 10 * self.batch_size {
                        return None;
                    }
                    if !self.disabled.contains_key(&curr) {
                        break;
                    }
                }
                if self.warm.as_ref().unwrap().cache.contains(curr) {
                    continue;
                }
                self.last_ll = score(curr as usize);
                let final_ll = (self.beta * self.last_ll).min(0.0) + self.initial_ll;
                let max_ll = f64::from(self.warm.as_ref().unwrap().batch_max_ll[node]);
                if rng.gen::<f64>().ln() < final_ll - max_ll {
                    return Some(curr);
                }
            }
        } else {
            self.warm.as_mut().unwrap().batch_hits[node] += 1;
            let mut pos;
            loop {
                iters += 1;
                if iters == 10 * self.batch_size {
                    return None;
                }
                pos = (self.batch_size * node + rng.gen_range(0..self.batch_len(node))) as u32;
                if !self.disabled.contains_key(&pos) {
                    break;
                }
            }
            let result = self.try_action(pos, rng, score);
            let warm = self.warm.as_ref().unwrap();
            if usize::from(warm.batch_hits[node]) > self.batch_len(node) / 2 {
                self.resolve_batch(node, score);
            }
            result
        }
    }

    /// Folds a cache-evicted action back into its batch leaf.
    fn insert_back(&mut self, action: u32, score: ScoreFn<'_>) {
        if self.disabled.contains_key(&action) {
            return;
        }
        let final_ll = (self.beta * score(action as usize)).min(0.0) + self.initial_ll;
        let b = self.batch_of(action);
        let warm = self.warm.as_mut().expect("insert_back before warm-up");
        warm.batch_max_ll[b] = warm.batch_max_ll[b].max(final_ll as f32);
        let updated = log_sum(warm.actions.get(b), final_ll);
        warm.actions.set(b, updated);
    }

    /// Materializes one action's exact weight, routing it into the cache
    /// when competitive; returns the mass it contributes to its own batch
    /// leaf (−∞ when cached or disabled).
    fn resolve_action(&mut self, action: u32, loglik: Option<f64>, score: ScoreFn<'_>) -> f64 {
        if self.disabled.contains_key(&action) {
            return f64::NEG_INFINITY;
        }
        let b = self.batch_of(action);
        let mut batch_ll = f64::NEG_INFINITY;

        let loglik = loglik.unwrap_or_else(|| score(action as usize));
        let final_ll = (self.beta * loglik).min(0.0) + self.initial_ll;

        let warm = self.warm.as_ref().expect("resolve before warm-up");
        if !warm.cache.is_full() || loglik > warm.cache.min() + EPS {
            let evicted = self.warm.as_mut().unwrap().cache.add(action, loglik);
            if let Some(other) = evicted {
                if self.batch_of(other) == b {
                    batch_ll = log_sum(self.resolve_action(other, None, score), batch_ll);
                } else {
                    self.insert_back(other, score);
                }
            }
        } else {
            let warm = self.warm.as_mut().unwrap();
            warm.batch_max_ll[b] = warm.batch_max_ll[b].max(final_ll as f32);
            batch_ll = log_sum(batch_ll, final_ll);
        }
        batch_ll
    }

    /// Resolves every member of batch `b` and replaces the estimate leaf
    /// with the exact aggregate.
    fn resolve_batch(&mut self, b: usize, score: ScoreFn<'_>) {
        let mut batch_ll = f64::NEG_INFINITY;
        for i in 0..self.batch_len(b) {
            let action = (i + self.batch_size * b) as u32;
            batch_ll = log_sum(batch_ll, self.resolve_action(action, None, score));
        }
        let warm = self.warm.as_mut().unwrap();
        warm.actions.set(b, batch_ll);
        warm.batch_resolved[b] = true;
        self.refresh_cache_leaf();
    }

    fn apply_disable(&mut self, action: u32, ll: f64) {
        let b = self.batch_of(action);
        let warm = match self.warm.as_mut() {
            None => return,
            Some(w) => w,
        };
        if warm.cache.contains(action) {
            warm.cache.disable(action);
            self.refresh_cache_leaf();
            return;
        }
        let removed = if warm.batch_resolved[b] {
            (self.beta * ll).min(0.0) + self.initial_ll
        } else {
            self.initial_ll
        };
        let updated = log_sub(warm.actions.get(b), removed);
        warm.actions.set(b, updated);
    }

    /// Excludes `action` (it would create a cycle) while remembering its
    /// weight for a later re-enable. Disabling an already-disabled action
    /// means the bookkeeping has drifted and is fatal.
    pub fn disable_action(&mut self, action: u32, ll: f64) {
        let prev = self.disabled.insert(action, ll);
        assert!(prev.is_none(), "action {} disabled twice", action);
        self.apply_disable(action, ll);
    }

    /// Restores a previously disabled action; a no-op for actions that
    /// were never disabled in this sampler's lifetime.
    pub fn re_enable_action(&mut self, action: u32, score: ScoreFn<'_>) {
        let ll = match self.disabled.remove(&action) {
            None => return,
            Some(ll) => ll,
        };
        let b = self.batch_of(action);
        let warm = match self.warm.as_mut() {
            None => return,
            Some(w) => w,
        };
        if warm.cache.contains(action) {
            warm.cache.re_enable(action, ll);
            self.refresh_cache_leaf();
            return;
        }
        if warm.batch_resolved[b] {
            let contribution = self.resolve_action(action, Some(ll), score);
            let warm = self.warm.as_mut().unwrap();
            let updated = log_sum(warm.actions.get(b), contribution);
            warm.actions.set(b, updated);
            self.refresh_cache_leaf();
        } else {
            let updated = log_sum(warm.actions.get(b), self.initial_ll);
            warm.actions.set(b, updated);
        }
    }

    /// Re-enables every disabled action, returning the sampler to a
    /// parent-set-neutral state before it goes back into the LRU cache.
    pub fn deactivate(&mut self, score: ScoreFn<'_>) {
        let pending: Vec<u32> = self.disabled.keys().copied().collect();
        for action in pending {
            self.re_enable_action(action, score);
        }
        self.disabled.clear();
        debug_assert!(
            self.log_likelihood() < 0.1,
            "sampler mass exceeds 1 after re-enabling all actions"
        );
    }
}

/// Stamps out samplers with shared batch/cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct SamplerFactory {
    batch_size: usize,
    cache_size: usize,
}

impl SamplerFactory {
    pub fn new(batch_size: usize, cache_size: usize) -> Self {
        Self {
            batch_size,
            cache_size,
        }
    }

    pub fn spark(&self, n: usize, initial_ll: f64, beta: f64) -> ActionSampler {
        ActionSampler::new(n, self.batch_size, self.cache_size, initial_ll, beta)
    }
}
