//! Replica-exchange ladder of chains.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;

use crate::mcmc::edge_list::EdgeList;
use crate::mcmc::model::Model;

/// A temperature ladder of chains advanced in lockstep rounds with
/// periodic Metropolis state swaps.
///
/// Chains are kept sorted cold-first (descending β); ladder position `i`
/// advances `swap_period / power_base^i` steps per round, so the cold
/// chain walks the full budget while hotter chains explore on fewer,
/// cheaper steps between exchanges.
pub struct MetaModel {
    models: Vec<Model>,
}

impl MetaModel {
    pub fn new(mut models: Vec<Model>) -> Self {
        assert!(!models.is_empty(), "ladder needs at least one chain");
        models.sort_by(|a, b| b.beta().partial_cmp(&a.beta()).expect("NaN beta"));
        Self { models }
    }

    /// Runs warmup plus `cold_chain_steps` budget on the cold chain,
    /// swapping between rounds; returns the cold chain's final DAG
    /// snapshot, or `None` when cancelled mid-run.
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        swap_period: u64,
        cold_chain_steps: u64,
        warmup: u64,
        power_base: f64,
        rng: &mut R,
        cancel: &AtomicBool,
    ) -> Option<EdgeList> {
        for model in &mut self.models {
            while !model.step(warmup, rng) {}
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
        }

        let total = warmup + cold_chain_steps;
        let mut target = warmup;
        loop {
            target = (target + swap_period).min(total);

            for (i, model) in self.models.iter_mut().enumerate() {
                let scaled = ((target - warmup) as f64 / power_base.powi(i as i32)) as u64;
                let chain_target = warmup + scaled;
                while !model.step(chain_target, rng) {}
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
            }

            if target == total {
                return Some(self.models[0].edge_list());
            }

            self.attempt_swap(rng);
        }
    }

    /// One Metropolis swap attempt between a uniformly chosen pair.
    fn attempt_swap<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let m = self.models.len();
        if m < 2 {
            return;
        }
        let i = rng.gen_range(0..m);
        let mut j = rng.gen_range(0..m - 1);
        if j >= i {
            j += 1;
        }

        let (i_ll, j_ll) = (self.models[i].log_likelihood(), self.models[j].log_likelihood());
        let (i_beta, j_beta) = (self.models[i].beta(), self.models[j].beta());
        let accept_ll = i_beta * (j_ll - i_ll) + j_beta * (i_ll - j_ll);
        if rng.gen::<f64>().ln() < accept_ll {
            tracing::debug!(i, j, accept_ll, "accepted replica swap");
            let (lo, hi) = (i.min(j), i.max(j));
            let (left, right) = self.models.split_at_mut(hi);
            Model::swap_networks(&mut left[lo], &mut right[0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SamplerFactory;
    use crate::bn::network::Network;
    use crate::bn::sf::Bde;
    use crate::bn::variable::Variable;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    fn toy_network() -> Network {
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let m = 90;
        let a: Vec<f64> = (0..m).map(|_| rng.gen()).collect();
        let b: Vec<f64> = (0..m).map(|i| a[i] * 0.8 + rng.gen::<f64>() * 0.2).collect();
        let c: Vec<f64> = (0..m).map(|_| rng.gen()).collect();
        Network::new(
            vec![
                Variable::new("A", &a, 3, 0).unwrap(),
                Variable::new("B", &b, 3, 1).unwrap(),
                Variable::new("C", &c, 3, 2).unwrap(),
            ],
            Arc::new(Bde::default()),
        )
        .unwrap()
    }

    fn ladder(net: &Network, chains: usize, rng: &mut ChaCha8Rng) -> Vec<Model> {
        (0..chains)
            .map(|i| {
                let beta = 1.0 / (1.0 + 0.5 * i as f64);
                let mut m = Model::new(net, SamplerFactory::new(1, 2), 10, beta);
                m.init(false, rng);
                m
            })
            .collect()
    }

    #[test]
    fn cold_chain_snapshot_is_returned() {
        let net = toy_network();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut meta = MetaModel::new(ladder(&net, 3, &mut rng));
        let cancel = AtomicBool::new(false);
        let result = meta.run(200, 2_000, 100, 2.0, &mut rng, &cancel);
        let edges = result.expect("not cancelled");
        assert_eq!(edges.restarts(), 1);
    }

    #[test]
    fn cancellation_discards_the_restart() {
        let net = toy_network();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut meta = MetaModel::new(ladder(&net, 2, &mut rng));
        let cancel = AtomicBool::new(true);
        assert!(meta.run(200, 2_000, 0, 2.0, &mut rng, &cancel).is_none());
    }

    #[test]
    fn ladder_is_sorted_cold_first() {
        let net = toy_network();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut models = ladder(&net, 3, &mut rng);
        models.reverse();
        let meta = MetaModel::new(models);
        assert_eq!(meta.models[0].beta(), 1.0);
        assert!(meta.models[2].beta() < meta.models[1].beta());
    }
}
