//! Numeric support structures for weighted sampling in log space.

pub mod segment_tree;

pub use segment_tree::SegmentTree;
