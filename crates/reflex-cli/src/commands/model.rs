//! `reflex model` — inspect and generate artifacts.

use std::path::Path;

use anyhow::{Context, Result};
use reflex_core::Feature;
use reflex_format::{
    FORMAT_VERSION, FeatureBounds, ModelMetadata, NormalizationTable, ReflexArtifact,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ModelReport {
    pub path: String,
    pub format_version: u16,
    pub size_bytes: usize,
    pub nodes: usize,
    pub depth: usize,
    pub leaf_min: f32,
    pub leaf_max: f32,
    pub out_min: f32,
    pub out_max: f32,
    pub digest: String,
    pub metadata: ModelMetadata,
}

pub fn describe(path: &Path) -> Result<ModelReport> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let artifact = ReflexArtifact::from_bytes(&bytes)
        .with_context(|| format!("{} is not a valid model artifact", path.display()))?;

    let digest = &bytes[bytes.len().saturating_sub(32)..];
    let (leaf_min, leaf_max) = artifact.tree().leaf_range();
    let (out_min, out_max) = artifact.output_bounds();
    Ok(ModelReport {
        path: path.display().to_string(),
        format_version: FORMAT_VERSION,
        size_bytes: bytes.len(),
        nodes: artifact.tree().len(),
        depth: artifact.tree().depth(),
        leaf_min,
        leaf_max,
        out_min,
        out_max,
        digest: hex::encode(digest),
        metadata: artifact.metadata().clone(),
    })
}

pub fn format_report(report: &ModelReport) -> String {
    let meta = &report.metadata;
    let mut out = String::new();
    out.push_str(&format!("Model: {}\n", report.path));
    out.push_str(&format!("  format:      v{}\n", report.format_version));
    out.push_str(&format!("  size:        {} bytes\n", report.size_bytes));
    out.push_str(&format!(
        "  tree:        {} nodes, depth {}\n",
        report.nodes, report.depth
    ));
    out.push_str(&format!(
        "  leaves:      [{}, {}]\n",
        report.leaf_min, report.leaf_max
    ));
    out.push_str(&format!(
        "  output:      [{}, {}]\n",
        report.out_min, report.out_max
    ));
    out.push_str(&format!("  sha256:      {}\n", report.digest));
    out.push_str(&format!("  created_at:  {}\n", meta.created_at));
    out.push_str(&format!("  trainer:     {}\n", meta.trainer));
    out.push_str(&format!("  schema:      {}\n", meta.feature_schema));
    if !meta.notes.is_empty() {
        out.push_str(&format!("  notes:       {}\n", meta.notes));
    }
    out
}

pub fn inspect(path: &Path, format: &str) -> Result<()> {
    let report = describe(path)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print!("{}", format_report(&report));
        }
    }
    Ok(())
}

pub fn constant(value: f32, output: &Path, normalizer: Option<&Path>) -> Result<()> {
    let metadata = ModelMetadata {
        trainer: "reflex model constant".to_string(),
        notes: format!("always proposes {value}"),
        ..Default::default()
    };
    let artifact = ReflexArtifact::constant(value, metadata)
        .with_context(|| format!("cannot build a constant model for {value}"))?;
    artifact
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("✓ Generated {}", output.display());

    if let Some(path) = normalizer {
        let rows: Vec<FeatureBounds> = Feature::ALL
            .iter()
            .map(|f| FeatureBounds {
                name: f.name().to_string(),
                min: 0.0,
                max: 1.0,
            })
            .collect();
        let json = NormalizationTable::from_bounds(&rows)?.to_json_string()?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        println!("✓ Generated {}", path.display());
    }
    Ok(())
}
