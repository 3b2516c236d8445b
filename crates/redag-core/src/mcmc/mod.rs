//! The MCMC machinery: chains, the tempered ladder, and the restart
//! scheduler.

pub mod edge_list;
pub mod estimator;
pub mod meta;
pub mod model;
pub mod state_cache;

pub use edge_list::{EdgeList, EdgeStat};
pub use estimator::NetworkEstimator;
pub use meta::MetaModel;
pub use model::Model;
