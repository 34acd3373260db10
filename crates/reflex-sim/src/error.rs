//! Simulator error types.

use reflex_core::KnobValue;
use thiserror::Error;

/// Rejected pool operations. Reported and counted; never fatal to a run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("cannot resize pool to {requested} workers: at least 1 is required")]
    BelowMinimum { requested: KnobValue },
}

/// Reasons a run cannot start.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] reflex_core::ConfigError),

    #[error("decision engine: {0}")]
    Engine(#[from] reflex_engine::EngineError),

    #[error("initial pool: {0}")]
    Pool(#[from] PoolError),
}

pub type SimResult<T> = Result<T, SimError>;
