//! reflex-core — shared types for the reflexgrid control loop.
//!
//! Everything the other crates exchange lives here: virtual time, tasks
//! and workers, the fixed telemetry feature schema, decisions, and the
//! `reflex.toml` run configuration.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::RunConfig;
pub use error::{ConfigError, ConfigResult};
pub use time::{SimDuration, SimTime};
pub use types::*;
