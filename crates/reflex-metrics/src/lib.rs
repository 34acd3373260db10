//! reflex-metrics — what a run did, measured.
//!
//! ```text
//! MetricsTracker
//!   ├── record_arrival()     ← pool admits a task
//!   ├── record_completion()  ← pool completes a task
//!   ├── record_outcome()     ← governor reviews a proposal
//!   ├── snapshot()           → point-in-time MetricsSnapshot
//!   └── finish()             → RunSummary (JSON, Prometheus)
//! ```
//!
//! Percentiles come from [`LatencyHistogram`], a log-linear histogram
//! over integer nanoseconds with bounded relative error.

pub mod histogram;
pub mod prometheus;
pub mod summary;
pub mod tracker;

pub use histogram::LatencyHistogram;
pub use prometheus::render_prometheus;
pub use summary::{RunInfo, RunStatus, RunSummary};
pub use tracker::{MetricsSnapshot, MetricsTracker};
