//! Candidate-action bookkeeping for one target node.
//!
//! An action is a proposed change to one node's parent set, identified by
//! a compact index over the n−1 candidate partners (the target itself is
//! excluded): inserting the edge if it is absent, deleting it if present.
//! Action weights are log-likelihood deltas and change whenever the
//! target's parent set changes, so the sampler materializes them lazily.

pub mod cache;
pub mod hash_index;
pub mod heap;
pub mod sampler;

pub use cache::ActionCache;
pub use hash_index::HashIndex;
pub use heap::MinHeap;
pub use sampler::{ActionSampler, SamplerFactory};

/// Near-cancellation guard for log-space subtraction.
pub const EPS: f64 = 1e-8;

/// log(exp(a) + exp(b)) with the maximum factored out.
pub fn log_sum(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    ((a - max).exp() + (b - max).exp()).ln() + max
}

/// log(exp(a) − exp(b)), snapping the near-equal case to −∞.
///
/// Removing the last contributor from an aggregate should cancel exactly,
/// but floating error leaves a tiny positive residual; anything within
/// [`EPS`] of full cancellation is treated as empty mass rather than a
/// spurious remainder.
pub fn log_sub(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    let a = a - max;
    let b = b - max;
    if a < 0.0 && a > -EPS {
        return f64::NEG_INFINITY;
    }
    debug_assert!(a >= b, "log_sub would produce negative mass");
    (a.exp() - b.exp()).ln() + max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sum_handles_negative_infinity() {
        assert_eq!(log_sum(f64::NEG_INFINITY, -3.0), -3.0);
        assert_eq!(log_sum(-3.0, f64::NEG_INFINITY), -3.0);
        let expected = ((-1.0f64).exp() + (-2.0f64).exp()).ln();
        assert!((log_sum(-1.0, -2.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn log_sub_cancels_cleanly() {
        let total = log_sum(-5.0, -5.0);
        assert!((log_sub(total, -5.0) - (-5.0)).abs() < 1e-9);
        // Removing the only contributor collapses to empty mass even when
        // rounding leaves the operands slightly apart.
        assert_eq!(log_sub(-7.0 + 1e-12, -7.0), f64::NEG_INFINITY);
    }

    #[test]
    fn sum_then_sub_round_trips() {
        let a = -2.5;
        let b = -4.0;
        let s = log_sum(a, b);
        assert!((log_sub(s, b) - a).abs() < 1e-9);
    }
}
