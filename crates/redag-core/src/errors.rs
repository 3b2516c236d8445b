//! Error types for the estimation engine.

use thiserror::Error;

/// Errors surfaced by the public engine API.
///
/// Programming invariant violations (log-likelihood bookkeeping drift,
/// double-disabled actions) are not represented here: they indicate
/// corrupted sampler state and fail hard through assertions instead of
/// being propagated as recoverable values.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid estimator or sampler configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed input data (empty table, ragged rows, too few classes).
    #[error("data error: {0}")]
    Data(String),

    /// Numerical failure outside the locally-handled log-space edge cases.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}
