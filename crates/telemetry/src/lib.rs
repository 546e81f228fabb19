//! Logging, metrics and collaborator health for the pipeline.
//!
//! Everything here is in-process: structured logs go through `tracing`,
//! counters are atomics read back as snapshots.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
