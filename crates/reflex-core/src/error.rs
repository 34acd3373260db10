//! Configuration error types.

use thiserror::Error;

/// Fatal validation failures, reported before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker bounds invalid: min {min} must be >= 1 and <= max {max}")]
    InvalidBounds { min: u32, max: u32 },

    #[error("{field} = {value} lies outside worker bounds [{min}, {max}]")]
    OutOfBounds {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{field} must be a positive, finite rate (got {value})")]
    InvalidRate { field: &'static str, value: f64 },

    #[error("{field} must be non-zero")]
    ZeroLength { field: &'static str },

    #[error("{field} = {value} out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("engine `{engine}` requires `{field}` to be set")]
    MissingPath {
        engine: &'static str,
        field: &'static str,
    },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
