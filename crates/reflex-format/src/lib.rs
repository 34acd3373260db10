//! reflex-format — the compact model artifact.
//!
//! A reflex is a small decision tree trained offline. It ships as two
//! files:
//!
//! ```text
//! pool.reflex       binary: header, arena of tree nodes, output bounds,
//!                   metadata, SHA-256 digest
//! pool-norm.json    per-feature (name, min, max) normalization table
//! ```
//!
//! Both are validated completely at load time so that inference on the
//! hot path is a plain loop over array indices that cannot fail.

pub mod artifact;
pub mod error;
pub mod model;
pub mod normalize;
pub mod tree;

pub use artifact::{FORMAT_VERSION, MAGIC, ModelMetadata, ReflexArtifact};
pub use error::{FormatError, FormatResult};
pub use model::ReflexModel;
pub use normalize::{FeatureBounds, NormalizationTable};
pub use tree::{DecisionTree, LEAF_MARKER, TreeNode};
