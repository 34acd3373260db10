//! reflex-sim — deterministic discrete-event harness.
//!
//! Replays a seeded synthetic workload against a simulated worker pool
//! and lets one decision engine resize the pool through the safety
//! governor. Nothing here reads a wall clock: identical seed, model and
//! configuration give bit-identical summaries.
//!
//! | Module          | Role                                                |
//! |-----------------|-----------------------------------------------------|
//! | `workload`      | steady, bursty and adversarial arrival streams      |
//! | `pool`          | event queue, FIFO dispatch, graceful resize         |
//! | `telemetry`     | per-tick feature vectors                            |
//! | `telemetry_log` | CSV records for offline training                    |
//! | `harness`       | the run loop and pool-size sweeps                   |
//! | `analytic`      | M/M/c reference quantiles                           |

pub mod analytic;
pub mod error;
pub mod harness;
pub mod pool;
pub mod telemetry;
pub mod telemetry_log;
pub mod workload;

pub use error::{PoolError, SimError, SimResult};
pub use harness::{DEFAULT_SWEEP, RunReport, Simulation, SweepPoint, SweepReport, sweep};
pub use pool::{PoolEvent, PoolSimulator, PoolState, Resize, Step};
pub use telemetry::TelemetryAggregator;
pub use workload::{ArrivalSpec, WorkloadGenerator};
