//! The engine contract and construction from configuration.

use reflex_core::config::{EngineConfig, EngineKind};
use reflex_core::{ConfigError, FeatureVector, KnobRange, KnobValue};
use reflex_format::ReflexModel;

use crate::baseline::BaselineEngine;
use crate::error::{EngineError, EngineResult};
use crate::pid::PidEngine;
use crate::reflex::ReflexEngine;

/// Capability shared by every decision strategy.
pub trait DecisionEngine: Send {
    /// Short label used in logs and summaries.
    fn name(&self) -> &'static str;

    /// Propose a knob value for this sample. Total: never fails. The value
    /// may lie outside the pool's range; the governor clamps it.
    fn decide(&mut self, features: &FeatureVector) -> KnobValue;

    /// Samples rejected as invalid so far.
    fn anomalies(&self) -> u64 {
        0
    }

    /// Atomically replace the loaded model.
    fn reload(&mut self, _model: ReflexModel) -> EngineResult<()> {
        Err(EngineError::ReloadUnsupported(self.name()))
    }
}

/// Build the engine named by `config`.
///
/// `fallback` seeds the last-known-good value of engines that can reject
/// input; callers pass the pool's starting worker count.
pub fn build_engine(
    config: &EngineConfig,
    range: KnobRange,
    fallback: KnobValue,
) -> EngineResult<Box<dyn DecisionEngine>> {
    let engine: Box<dyn DecisionEngine> = match config.kind {
        EngineKind::Baseline => Box::new(BaselineEngine::new(config.baseline_workers, range)),
        EngineKind::Reflex => {
            let model_path = config.model.as_deref().ok_or(ConfigError::MissingPath {
                engine: "reflex",
                field: "engine.model",
            })?;
            let norm_path = config.normalizer.as_deref().ok_or(ConfigError::MissingPath {
                engine: "reflex",
                field: "engine.normalizer",
            })?;
            let model = ReflexModel::load(model_path, norm_path).map_err(|source| {
                EngineError::ModelLoad {
                    path: model_path.to_path_buf(),
                    source,
                }
            })?;
            Box::new(ReflexEngine::new(model, range, fallback))
        }
        EngineKind::Pid => Box::new(PidEngine::new(
            config.target_p95_us,
            config.kp,
            config.ki,
            config.kd,
            range,
            fallback,
        )),
    };
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{constant_model, sample};

    #[test]
    fn builds_baseline_by_default() {
        let mut engine = build_engine(&EngineConfig::default(), KnobRange::default(), 8).unwrap();
        assert_eq!(engine.name(), "baseline");
        assert_eq!(engine.decide(&sample(1)), 8);
        assert!(matches!(
            engine.reload(constant_model(2.0)),
            Err(EngineError::ReloadUnsupported("baseline"))
        ));
    }

    #[test]
    fn reflex_requires_model_paths() {
        let config = EngineConfig {
            kind: EngineKind::Reflex,
            ..Default::default()
        };
        assert!(matches!(
            build_engine(&config, KnobRange::default(), 8),
            Err(EngineError::Config(ConfigError::MissingPath { .. }))
        ));
    }

    #[test]
    fn reflex_reports_unreadable_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            kind: EngineKind::Reflex,
            model: Some(dir.path().join("missing.reflex")),
            normalizer: Some(dir.path().join("missing.json")),
            ..Default::default()
        };
        let err = build_engine(&config, KnobRange::default(), 8).err().unwrap();
        assert!(err.to_string().contains("missing.reflex"));
    }

    #[test]
    fn reflex_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let model = constant_model(2.0);
        let model_path = dir.path().join("pool.reflex");
        let norm_path = dir.path().join("pool-norm.json");
        model.artifact().save(&model_path).unwrap();
        std::fs::write(&norm_path, model.table().to_json_string().unwrap()).unwrap();

        let config = EngineConfig {
            kind: EngineKind::Reflex,
            model: Some(model_path),
            normalizer: Some(norm_path),
            ..Default::default()
        };
        let mut engine = build_engine(&config, KnobRange::default(), 8).unwrap();
        assert_eq!(engine.name(), "reflex");
        assert_eq!(engine.decide(&sample(1)), 2);
    }
}
