//! `.reflex` binary container.
//!
//! ```text
//! magic "RFX1" | version u16 | kind u8 | features u8 | nodes u16
//! out_min f32 | out_max f32 | meta_len u16
//! node[nodes] (9 bytes each) | metadata (compact JSON) | SHA-256 (32 bytes)
//! ```
//!
//! All integers little-endian. The encoding is canonical, so decoding
//! and re-encoding an artifact reproduces the input byte for byte.

use std::path::Path;

use reflex_core::FEATURE_COUNT;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{FormatError, FormatResult};
use crate::tree::{DecisionTree, NODE_BYTES, TreeNode};

pub const MAGIC: [u8; 4] = *b"RFX1";
pub const FORMAT_VERSION: u16 = 1;
const KIND_DECISION_TREE: u8 = 0;
const HEADER_BYTES: usize = 20;
const DIGEST_BYTES: usize = 32;

/// Provenance written by the offline trainer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub created_at: String,
    pub trainer: String,
    pub feature_schema: String,
    pub notes: String,
}

/// A decoded, validated model artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflexArtifact {
    tree: DecisionTree,
    output_min: f32,
    output_max: f32,
    metadata: ModelMetadata,
}

impl ReflexArtifact {
    pub fn new(
        tree: DecisionTree,
        output_min: f32,
        output_max: f32,
        metadata: ModelMetadata,
    ) -> FormatResult<Self> {
        if !(output_min.is_finite() && output_max.is_finite() && output_min <= output_max) {
            return Err(FormatError::InvalidOutputBounds {
                min: output_min,
                max: output_max,
            });
        }
        Ok(Self {
            tree,
            output_min,
            output_max,
            metadata,
        })
    }

    /// Artifact whose every inference returns `value`.
    pub fn constant(value: f32, metadata: ModelMetadata) -> FormatResult<Self> {
        Self::new(DecisionTree::constant(value)?, value, value, metadata)
    }

    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }

    pub fn output_bounds(&self) -> (f32, f32) {
        (self.output_min, self.output_max)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Tree output clamped to the artifact's output bounds.
    pub fn eval(&self, normalized: &[f64; FEATURE_COUNT]) -> f32 {
        self.tree
            .eval(normalized)
            .clamp(self.output_min, self.output_max)
    }

    pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
        let meta = serde_json::to_vec(&self.metadata)?;
        let meta_len = u16::try_from(meta.len()).map_err(|_| FormatError::NonCanonicalMetadata)?;
        let nodes = self.tree.nodes();

        let mut buf =
            Vec::with_capacity(HEADER_BYTES + nodes.len() * NODE_BYTES + meta.len() + DIGEST_BYTES);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.push(KIND_DECISION_TREE);
        buf.push(FEATURE_COUNT as u8);
        buf.extend_from_slice(&(nodes.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.output_min.to_le_bytes());
        buf.extend_from_slice(&self.output_max.to_le_bytes());
        buf.extend_from_slice(&meta_len.to_le_bytes());
        for node in nodes {
            node.encode(&mut buf);
        }
        buf.extend_from_slice(&meta);

        let digest = Sha256::digest(&buf);
        buf.extend_from_slice(&digest);
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> FormatResult<Self> {
        let mut r = Reader::new(data);

        let magic: [u8; 4] = r.array()?;
        if magic != MAGIC {
            return Err(FormatError::BadMagic(magic));
        }
        let version = r.u16()?;
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let kind = r.u8()?;
        if kind != KIND_DECISION_TREE {
            return Err(FormatError::UnsupportedKind(kind));
        }
        let features = r.u8()? as usize;
        if features != FEATURE_COUNT {
            return Err(FormatError::FeatureCountMismatch {
                expected: FEATURE_COUNT,
                found: features,
            });
        }
        let node_count = r.u16()? as usize;
        let output_min = r.f32()?;
        let output_max = r.f32()?;
        let meta_len = r.u16()? as usize;

        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            nodes.push(TreeNode::decode(&r.array::<NODE_BYTES>()?));
        }
        let meta_bytes = r.take(meta_len)?;

        let body_len = r.position();
        let stored: [u8; DIGEST_BYTES] = r.array()?;
        if r.remaining() > 0 {
            return Err(FormatError::TrailingBytes(r.remaining()));
        }
        let computed = Sha256::digest(&data[..body_len]);
        if computed.as_slice() != stored {
            return Err(FormatError::ChecksumMismatch {
                stored: hex::encode(stored),
                computed: hex::encode(computed),
            });
        }

        let metadata: ModelMetadata = serde_json::from_slice(meta_bytes)?;
        if serde_json::to_vec(&metadata)? != meta_bytes {
            return Err(FormatError::NonCanonicalMetadata);
        }

        Self::new(
            DecisionTree::from_nodes(nodes)?,
            output_min,
            output_max,
            metadata,
        )
    }

    pub fn load(path: &Path) -> FormatResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn save(&self, path: &Path) -> FormatResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Hex SHA-256 of the encoded artifact body.
    pub fn digest_hex(&self) -> FormatResult<String> {
        let bytes = self.to_bytes()?;
        Ok(hex::encode(&bytes[bytes.len() - DIGEST_BYTES..]))
    }
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> FormatResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        let Some(end) = end else {
            return Err(FormatError::Truncated {
                needed: self.pos + n,
                available: self.data.len(),
            });
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> FormatResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> FormatResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> FormatResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> FormatResult<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            created_at: "2026-10-01T12:00:00Z".to_string(),
            trainer: "cart-depth4".to_string(),
            feature_schema: "compute-v1".to_string(),
            notes: "unit test".to_string(),
        }
    }

    fn pool_artifact() -> ReflexArtifact {
        let tree = DecisionTree::from_nodes(vec![
            TreeNode::split(0, 0.5, 1, 2),
            TreeNode::leaf(2.0),
            TreeNode::split(5, 0.8, 3, 4),
            TreeNode::leaf(8.0),
            TreeNode::leaf(48.0),
        ])
        .unwrap();
        ReflexArtifact::new(tree, 1.0, 32.0, metadata()).unwrap()
    }

    #[test]
    fn reencoding_is_byte_identical() {
        let bytes = pool_artifact().to_bytes().unwrap();
        let decoded = ReflexArtifact::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, pool_artifact());
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn canonical_example_fits_in_a_kilobyte() {
        let bytes = pool_artifact().to_bytes().unwrap();
        assert!(bytes.len() <= 1024, "artifact is {} bytes", bytes.len());
    }

    #[test]
    fn output_is_clamped_to_bounds() {
        let artifact = pool_artifact();
        let mut f = [0.0; FEATURE_COUNT];
        f[0] = 0.9;
        f[5] = 0.9;
        assert_eq!(artifact.eval(&f), 32.0);
    }

    #[test]
    fn rejects_corruption() {
        let mut bytes = pool_artifact().to_bytes().unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x55;
        assert!(matches!(
            ReflexArtifact::from_bytes(&bytes),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut bytes = pool_artifact().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            ReflexArtifact::from_bytes(&bytes),
            Err(FormatError::BadMagic(_))
        ));

        let mut bytes = pool_artifact().to_bytes().unwrap();
        bytes[4] = 9;
        assert!(matches!(
            ReflexArtifact::from_bytes(&bytes),
            Err(FormatError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn rejects_truncation_and_trailing_bytes() {
        let bytes = pool_artifact().to_bytes().unwrap();
        assert!(matches!(
            ReflexArtifact::from_bytes(&bytes[..bytes.len() - 1]),
            Err(FormatError::Truncated { .. })
        ));
        assert!(matches!(
            ReflexArtifact::from_bytes(&bytes[..10]),
            Err(FormatError::Truncated { .. })
        ));

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(
            ReflexArtifact::from_bytes(&padded),
            Err(FormatError::TrailingBytes(1))
        ));
    }

    #[test]
    fn rejects_invalid_output_bounds() {
        let tree = DecisionTree::constant(2.0).unwrap();
        assert!(ReflexArtifact::new(tree.clone(), 5.0, 1.0, metadata()).is_err());
        assert!(ReflexArtifact::new(tree, f32::NAN, 1.0, metadata()).is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.reflex");
        let artifact = ReflexArtifact::constant(2.0, metadata()).unwrap();
        artifact.save(&path).unwrap();

        let loaded = ReflexArtifact::load(&path).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.digest_hex().unwrap().len(), 64);
    }
}
