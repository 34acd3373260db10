//! Per-feature min/max normalization table.

use std::path::Path;

use reflex_core::{FEATURE_COUNT, Feature};
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, FormatResult};

/// One row of the table as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBounds {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableFile {
    features: Vec<FeatureBounds>,
}

/// Validated normalization table, indexed by schema position.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationTable {
    min: [f64; FEATURE_COUNT],
    max: [f64; FEATURE_COUNT],
}

impl NormalizationTable {
    /// Build from named rows. Every schema feature must appear exactly once.
    pub fn from_bounds(rows: &[FeatureBounds]) -> FormatResult<Self> {
        let mut min = [0.0; FEATURE_COUNT];
        let mut max = [0.0; FEATURE_COUNT];
        let mut seen = [false; FEATURE_COUNT];

        for row in rows {
            let feature = Feature::from_name(&row.name)
                .ok_or_else(|| FormatError::UnknownFeature(row.name.clone()))?;
            let i = feature.index();
            if seen[i] {
                return Err(FormatError::DuplicateFeature(row.name.clone()));
            }
            if !(row.min.is_finite() && row.max.is_finite() && row.min <= row.max) {
                return Err(FormatError::InvalidRange {
                    feature: row.name.clone(),
                    min: row.min,
                    max: row.max,
                });
            }
            seen[i] = true;
            min[i] = row.min;
            max[i] = row.max;
        }

        if let Some(missing) = Feature::ALL.into_iter().find(|f| !seen[f.index()]) {
            return Err(FormatError::MissingFeature(missing.name()));
        }

        Ok(Self { min, max })
    }

    pub fn from_json_str(json: &str) -> FormatResult<Self> {
        let file: TableFile = serde_json::from_str(json)?;
        Self::from_bounds(&file.features)
    }

    pub fn from_file(path: &Path) -> FormatResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Pretty JSON in schema order.
    pub fn to_json_string(&self) -> FormatResult<String> {
        let file = TableFile {
            features: self.rows(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn rows(&self) -> Vec<FeatureBounds> {
        Feature::ALL
            .into_iter()
            .map(|f| FeatureBounds {
                name: f.name().to_string(),
                min: self.min[f.index()],
                max: self.max[f.index()],
            })
            .collect()
    }

    pub fn bounds(&self, feature: Feature) -> (f64, f64) {
        (self.min[feature.index()], self.max[feature.index()])
    }

    /// `(x - min) / (max - min)` clamped to [0, 1]; degenerate ranges map to 0.5.
    ///
    /// Inputs must be finite; callers screen NaN before normalizing.
    pub fn normalize(&self, values: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            let range = self.max[i] - self.min[i];
            out[i] = if range > 0.0 {
                ((values[i] - self.min[i]) / range).clamp(0.0, 1.0)
            } else {
                0.5
            };
        }
        out
    }
}
