//! Analysis aggregation.
//!
//! Summaries computed over the outputs of a completed pipeline.

pub mod aggregator;

pub use aggregator::*;
