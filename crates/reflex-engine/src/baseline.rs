use reflex_core::{FeatureVector, KnobRange, KnobValue};

use crate::engine::DecisionEngine;

/// Ignores telemetry and always proposes the same worker count.
#[derive(Debug, Clone)]
pub struct BaselineEngine {
    value: KnobValue,
}

impl BaselineEngine {
    /// The constant is clamped into `range` once, up front.
    pub fn new(value: KnobValue, range: KnobRange) -> Self {
        Self {
            value: range.clamp(value),
        }
    }

    pub fn value(&self) -> KnobValue {
        self.value
    }
}

impl DecisionEngine for BaselineEngine {
    fn name(&self) -> &'static str {
        "baseline"
    }

    fn decide(&mut self, _features: &FeatureVector) -> KnobValue {
        self.value
    }
}
