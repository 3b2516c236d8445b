//! Bayesian-network domain model: variables, scoring, and the scored DAG.

pub mod network;
pub mod sf;
pub mod variable;

pub use network::Network;
pub use sf::{parse_scoring_function, ScoreCache, ScoringFunction};
pub use variable::Variable;
