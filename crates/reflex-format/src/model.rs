use std::path::Path;

use reflex_core::FEATURE_COUNT;

use crate::artifact::ReflexArtifact;
use crate::error::FormatResult;
use crate::normalize::NormalizationTable;

/// A loaded artifact paired with its normalization table.
///
/// Replaced as a whole on reload; never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflexModel {
    artifact: ReflexArtifact,
    table: NormalizationTable,
}

impl ReflexModel {
    pub fn new(artifact: ReflexArtifact, table: NormalizationTable) -> Self {
        Self { artifact, table }
    }

    pub fn load(model_path: &Path, normalizer_path: &Path) -> FormatResult<Self> {
        let artifact = ReflexArtifact::load(model_path)?;
        let table = NormalizationTable::from_file(normalizer_path)?;
        Ok(Self::new(artifact, table))
    }

    pub fn artifact(&self) -> &ReflexArtifact {
        &self.artifact
    }

    pub fn table(&self) -> &NormalizationTable {
        &self.table
    }

    /// Normalize raw features and walk the tree. Inputs must be finite.
    #[inline]
    pub fn infer(&self, raw: &[f64; FEATURE_COUNT]) -> f32 {
        self.artifact.eval(&self.table.normalize(raw))
    }
}
