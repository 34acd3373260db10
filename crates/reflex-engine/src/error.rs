//! Decision engine error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load model {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: reflex_format::FormatError,
    },

    #[error("{0} engine has no model to reload")]
    ReloadUnsupported(&'static str),

    #[error("invalid engine configuration: {0}")]
    Config(#[from] reflex_core::ConfigError),
}

pub type EngineResult<T> = Result<T, EngineError>;
