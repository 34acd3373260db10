//! reflex-engine — turns one telemetry sample into one knob proposal.
//!
//! Three strategies share the [`DecisionEngine`] contract:
//!
//! | Engine     | Input used                  | Output                        |
//! |------------|-----------------------------|-------------------------------|
//! | `baseline` | none                        | a configured constant         |
//! | `reflex`   | all ten features            | decision-tree leaf, rounded   |
//! | `pid`      | `task_time_p95_us`          | setpoint tracking, rounded    |
//!
//! Engines are selected once at construction and called synchronously,
//! once per cadence tick. Outputs are not clamped into the
//! [`KnobRange`](reflex_core::KnobRange); the governor does that and
//! reports it. Invalid input never propagates.

pub mod baseline;
pub mod engine;
pub mod error;
pub mod pid;
pub mod reflex;

pub use baseline::BaselineEngine;
pub use engine::{DecisionEngine, build_engine};
pub use error::{EngineError, EngineResult};
pub use pid::PidEngine;
pub use reflex::ReflexEngine;

#[cfg(test)]
mod test_support;
