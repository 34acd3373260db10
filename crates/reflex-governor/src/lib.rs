//! reflex-governor — the only path from a proposal to the pool.
//!
//! Every engine proposal passes through [`SafetyGovernor::review`]:
//!
//! ```text
//! proposal ──► clamp to range ──► deadband ──► dwell ──► apply
//!                                                          │
//!             revert to last good ◄── p95 regressed? ◄── observe N ticks
//! ```
//!
//! The governor holds only decision history and a short rolling window
//! of p95 samples. It never touches pool state; the caller applies the
//! returned value.
//!
//! [`ControlTask`] wraps an engine and a governor in a tokio task for
//! deployments where telemetry arrives from other tasks: one task owns
//! all decision state and publishes the applied value on a `watch`.

pub mod control;
pub mod governor;

pub use control::{ControlCommand, ControlError, ControlHandle, ControlReport, ControlTask};
pub use governor::{GovernorOutcome, GovernorStats, HoldReason, SafetyGovernor, Verdict};
