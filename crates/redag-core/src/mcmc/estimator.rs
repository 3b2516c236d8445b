//! Restart fan-out and result merging.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::action::SamplerFactory;
use crate::bn::network::Network;
use crate::config::EstimatorParams;
use crate::errors::EngineError;
use crate::mcmc::edge_list::EdgeList;
use crate::mcmc::meta::MetaModel;
use crate::mcmc::model::Model;

/// Runs independent tempered-ladder restarts on a fixed-size thread pool
/// and merges their edge tallies.
///
/// Failure containment is per restart: a panicking restart is logged and
/// its tally omitted (N−1 of N restarts still produce a usable, if
/// noisier, estimate); a cancelled restart is discarded whole. Nothing is
/// retried.
pub struct NetworkEstimator {
    params: EstimatorParams,
}

impl NetworkEstimator {
    pub fn new(params: EstimatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }

    /// Runs every restart to completion (or cancellation) and returns the
    /// merged tally.
    pub fn run(&self, net: &Network, cancel: &AtomicBool) -> Result<EdgeList, EngineError> {
        self.params.validate()?;

        // One independent stream seed per restart, drawn up-front so the
        // assignment never depends on scheduling order.
        let mut master = ChaCha8Rng::seed_from_u64(self.params.seed);
        let seeds: Vec<u64> = (0..self.params.runs).map(|_| master.gen()).collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.params.threads)
            .build()
            .map_err(|e| EngineError::Config(format!("thread pool: {e}")))?;

        let results: Vec<Option<EdgeList>> = pool.install(|| {
            seeds
                .par_iter()
                .enumerate()
                .map(|(i, &seed)| {
                    if cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    match catch_unwind(AssertUnwindSafe(|| self.run_restart(net, seed, cancel))) {
                        Ok(result) => {
                            if result.is_some() {
                                tracing::info!(restart = i, "restart complete");
                            }
                            result
                        }
                        Err(_) => {
                            tracing::error!(restart = i, "restart failed; omitting its tally");
                            None
                        }
                    }
                })
                .collect()
        });

        let mut merged = EdgeList::new();
        for tally in results.into_iter().flatten() {
            merged.merge(&tally);
        }
        tracing::info!(
            restarts = merged.restarts(),
            requested = self.params.runs,
            "merged restart tallies"
        );
        Ok(merged)
    }

    fn run_restart(&self, net: &Network, seed: u64, cancel: &AtomicBool) -> Option<EdgeList> {
        let p = &self.params;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let permuted = net.permuted_clone(&mut rng);
        let factory = SamplerFactory::new(p.batch_size, p.cache_size);
        let models: Vec<Model> = (0..p.chains)
            .map(|i| {
                let mut model = Model::new(&permuted, factory, p.cached_states, p.beta(i));
                model.init(false, &mut rng);
                model
            })
            .collect();
        MetaModel::new(models).run(
            p.swap_period,
            p.cold_chain_steps,
            p.warmup_steps,
            p.power_base,
            &mut rng,
            cancel,
        )
    }
}
