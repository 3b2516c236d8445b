//! Estimation run configuration.

use crate::errors::EngineError;

/// Knobs consumed by the estimator; parsing them from a command line (or
/// anywhere else) is the caller's business.
#[derive(Debug, Clone)]
pub struct EstimatorParams {
    /// Independent restarts, each producing one merged tally entry.
    pub runs: usize,
    /// Worker threads; restarts queue onto this pool.
    pub threads: usize,
    /// Chains per temperature ladder.
    pub chains: usize,
    /// Actions per lazily resolved sampler batch.
    pub batch_size: usize,
    /// Top-action cache capacity per node.
    pub cache_size: usize,
    /// Per-node LRU capacity of parent-set samplers.
    pub cached_states: usize,
    /// Cold-chain step budget after warmup.
    pub cold_chain_steps: u64,
    /// Steps every chain runs before swaps begin.
    pub warmup_steps: u64,
    /// Cold-chain steps between swap attempts.
    pub swap_period: u64,
    /// Geometric scaling of per-chain step counts along the ladder.
    pub power_base: f64,
    /// Temperature spacing: chain i runs at beta = 1 / (1 + delta_t * i).
    pub delta_t: f64,
    /// Master seed; every restart derives an independent stream from it.
    pub seed: u64,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            runs: 100,
            threads: 1,
            chains: 5,
            batch_size: 100,
            cache_size: 25,
            cached_states: 200,
            cold_chain_steps: 20_000,
            warmup_steps: 0,
            swap_period: 1_000,
            power_base: 2.0,
            delta_t: 0.25,
            seed: 42,
        }
    }
}

impl EstimatorParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.runs == 0 {
            return Err(EngineError::Config("runs must be positive".into()));
        }
        if self.threads == 0 {
            return Err(EngineError::Config("threads must be positive".into()));
        }
        if self.chains == 0 {
            return Err(EngineError::Config("chains must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(EngineError::Config("batch size must be positive".into()));
        }
        if self.cold_chain_steps == 0 {
            return Err(EngineError::Config("step budget must be positive".into()));
        }
        if self.swap_period == 0 {
            return Err(EngineError::Config("swap period must be positive".into()));
        }
        if self.power_base < 1.0 {
            return Err(EngineError::Config("power base must be at least 1".into()));
        }
        if self.delta_t < 0.0 {
            return Err(EngineError::Config("temperature delta must be non-negative".into()));
        }
        Ok(())
    }

    /// Inverse temperature of ladder position `i` (0 = cold chain).
    pub fn beta(&self, i: usize) -> f64 {
        1.0 / (1.0 + self.delta_t * i as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(EstimatorParams::default().validate().is_ok());
    }

    #[test]
    fn beta_ladder_is_monotone_from_one() {
        let params = EstimatorParams::default();
        assert_eq!(params.beta(0), 1.0);
        assert!(params.beta(1) < 1.0);
        assert!(params.beta(2) < params.beta(1));
    }

    #[test]
    fn zero_runs_rejected() {
        let params = EstimatorParams {
            runs: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
