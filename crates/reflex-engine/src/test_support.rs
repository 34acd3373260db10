use reflex_core::{FEATURE_COUNT, Feature, FeatureVector, SimDuration, SimTime};
use reflex_format::{
    DecisionTree, FeatureBounds, ModelMetadata, NormalizationTable, ReflexArtifact, ReflexModel,
    TreeNode,
};

/// Every feature normalized over [0, 100].
pub fn percent_table() -> NormalizationTable {
    let rows: Vec<FeatureBounds> = Feature::ALL
        .iter()
        .map(|f| FeatureBounds {
            name: f.name().to_string(),
            min: 0.0,
            max: 100.0,
        })
        .collect();
    NormalizationTable::from_bounds(&rows).unwrap()
}

pub fn constant_model(value: f32) -> ReflexModel {
    let artifact = ReflexArtifact::constant(value, ModelMetadata::default()).unwrap();
    ReflexModel::new(artifact, percent_table())
}

/// runq_len <= 20 → 2 workers, otherwise 24 (wider than most test ranges).
pub fn runq_model() -> ReflexModel {
    let tree = DecisionTree::from_nodes(vec![
        TreeNode::split(Feature::RunqLen.index() as u8, 0.2, 1, 2),
        TreeNode::leaf(2.0),
        TreeNode::leaf(24.0),
    ])
    .unwrap();
    let artifact = ReflexArtifact::new(tree, 1.0, 64.0, ModelMetadata::default()).unwrap();
    ReflexModel::new(artifact, percent_table())
}

pub fn sample(tick: u64) -> FeatureVector {
    let at = SimTime::ZERO + SimDuration::from_millis(500 * tick);
    FeatureVector::new(tick, at, [0.0; FEATURE_COUNT])
}
