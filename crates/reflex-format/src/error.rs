//! Model artifact error types.

use thiserror::Error;

/// Reasons an artifact or normalization table is rejected at load time.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("artifact truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("bad magic {0:?}, expected \"RFX1\"")]
    BadMagic([u8; 4]),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("unsupported model kind {0}")]
    UnsupportedKind(u8),

    #[error("feature count mismatch: artifact has {found}, schema has {expected}")]
    FeatureCountMismatch { expected: usize, found: usize },

    #[error("checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },

    #[error("{0} trailing bytes after digest")]
    TrailingBytes(usize),

    #[error("tree has no nodes")]
    EmptyTree,

    #[error("tree has {0} nodes, limit is {max}", max = crate::tree::MAX_NODES)]
    TooManyNodes(usize),

    #[error("node {index}: {reason}")]
    InvalidNode { index: usize, reason: String },

    #[error("output bounds invalid: [{min}, {max}]")]
    InvalidOutputBounds { min: f32, max: f32 },

    #[error("metadata is not in canonical encoding")]
    NonCanonicalMetadata,

    #[error("normalization table references unknown feature `{0}`")]
    UnknownFeature(String),

    #[error("normalization table is missing feature `{0}`")]
    MissingFeature(&'static str),

    #[error("normalization table lists feature `{0}` twice")]
    DuplicateFeature(String),

    #[error("normalization range for `{feature}` invalid: [{min}, {max}]")]
    InvalidRange { feature: String, min: f64, max: f64 },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FormatResult<T> = Result<T, FormatError>;
