//! Model-driven engine: normalize, walk the tree, round.
//!
//! Leaves are bounded by the artifact's own output range only. A value
//! outside the pool's knob range is passed on as proposed so the governor
//! clamps it and the run reports the deviation.

use reflex_core::{FeatureVector, KnobRange, KnobValue, round_knob};
use reflex_format::ReflexModel;
use tracing::{info, warn};

use crate::engine::DecisionEngine;
use crate::error::EngineResult;

pub struct ReflexEngine {
    model: ReflexModel,
    last_good: KnobValue,
    anomalies: u64,
}

impl ReflexEngine {
    pub fn new(model: ReflexModel, range: KnobRange, fallback: KnobValue) -> Self {
        Self {
            model,
            last_good: range.clamp(fallback),
            anomalies: 0,
        }
    }

    pub fn model(&self) -> &ReflexModel {
        &self.model
    }

    pub fn last_good(&self) -> KnobValue {
        self.last_good
    }
}

impl DecisionEngine for ReflexEngine {
    fn name(&self) -> &'static str {
        "reflex"
    }

    fn decide(&mut self, features: &FeatureVector) -> KnobValue {
        if let Some(feature) = features.first_non_finite() {
            self.anomalies += 1;
            warn!(
                tick = features.tick(),
                feature = %feature,
                value = features.get(feature),
                fallback = self.last_good,
                "invalid feature, keeping last known-good decision"
            );
            return self.last_good;
        }

        let value = round_knob(f64::from(self.model.infer(features.values())));
        self.last_good = value;
        value
    }

    fn anomalies(&self) -> u64 {
        self.anomalies
    }

    fn reload(&mut self, model: ReflexModel) -> EngineResult<()> {
        info!(
            nodes = model.artifact().tree().len(),
            trainer = %model.artifact().metadata().trainer,
            "reloading reflex model"
        );
        self.model = model;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use reflex_core::{FEATURE_COUNT, Feature};

    use super::*;
    use crate::test_support::{constant_model, runq_model, sample};

    #[test]
    fn walks_the_tree_and_leaves_range_clamping_to_the_governor() {
        let range = KnobRange::new(1, 16).unwrap();
        let mut engine = ReflexEngine::new(runq_model(), range, 8);
        assert_eq!(engine.decide(&sample(1).with(Feature::RunqLen, 5.0)), 2);
        // leaf 24 exceeds the pool's range but not the artifact's
        assert_eq!(engine.decide(&sample(2).with(Feature::RunqLen, 80.0)), 24);
        assert_eq!(engine.last_good(), 24);
    }

    #[test]
    fn nan_feature_falls_back_to_last_good() {
        let mut engine = ReflexEngine::new(runq_model(), KnobRange::default(), 8);
        assert_eq!(engine.decide(&sample(1).with(Feature::RunqLen, 80.0)), 24);

        let poisoned = sample(2).with(Feature::TaskTimeP95Us, f64::NAN);
        assert_eq!(engine.decide(&poisoned), 24);
        assert_eq!(engine.anomalies(), 1);

        assert_eq!(engine.decide(&sample(3)), 2);
        assert_eq!(engine.anomalies(), 1);
    }

    #[test]
    fn anomaly_before_any_decision_uses_fallback() {
        let mut engine = ReflexEngine::new(runq_model(), KnobRange::default(), 8);
        let poisoned = sample(1).with(Feature::ArrivalRate, f64::INFINITY);
        assert_eq!(engine.decide(&poisoned), 8);
        assert_eq!(engine.anomalies(), 1);
    }

    #[test]
    fn total_over_in_schema_inputs() {
        let range = KnobRange::new(2, 32).unwrap();
        let mut engine = ReflexEngine::new(runq_model(), range, 8);
        let (out_min, out_max) = engine.model().artifact().output_bounds();
        for i in 0..200u64 {
            let x = i as f64 * 7.5 - 100.0;
            let fv = reflex_core::FeatureVector::new(i, sample(i).at(), [x; FEATURE_COUNT]);
            let value = engine.decide(&fv) as f32;
            assert!((out_min..=out_max).contains(&value), "value={value}");
        }
        assert_eq!(engine.anomalies(), 0);
    }

    #[test]
    fn reload_swaps_the_whole_model() {
        let mut engine = ReflexEngine::new(runq_model(), KnobRange::default(), 8);
        assert_eq!(engine.decide(&sample(1)), 2);
        engine.reload(constant_model(12.0)).unwrap();
        assert_eq!(engine.decide(&sample(2)), 12);
        assert_eq!(engine.model().artifact().tree().len(), 1);
    }
}
