//! End-to-end scenarios.
//!
//! Each test drives the full loop (workload, pool, telemetry, engine,
//! governor, metrics) through `Simulation::run`, with model artifacts
//! written to a temporary directory exactly as the CLI would load them.

use std::path::{Path, PathBuf};

use reflex_core::config::{EngineKind, ServiceTimeConfig, WorkloadConfig, WorkloadProfile};
use reflex_core::{
    ApplyCause, FEATURE_COUNT, Feature, FeatureVector, KnobValue, RunConfig, SimTime,
};
use reflex_format::{
    DecisionTree, FeatureBounds, ModelMetadata, NormalizationTable, ReflexArtifact, ReflexModel,
    TreeNode,
};
use reflex_metrics::RunStatus;
use reflex_sim::analytic::mmc_sojourn_quantile_us;
use reflex_sim::{SimError, Simulation};

fn steady(rate_per_sec: f64, mean_us: f64) -> WorkloadConfig {
    WorkloadConfig {
        profile: WorkloadProfile::Steady,
        rate_per_sec,
        service: ServiceTimeConfig::Exponential { mean_us },
        ..Default::default()
    }
}

fn bursty() -> WorkloadConfig {
    WorkloadConfig {
        profile: WorkloadProfile::Bursty,
        high_rate_per_sec: 1_000.0,
        low_rate_per_sec: 100.0,
        period_ms: 2_000,
        service: ServiceTimeConfig::Exponential { mean_us: 500.0 },
        ..Default::default()
    }
}

fn baseline(workers: KnobValue, workload: WorkloadConfig, horizon_secs: f64) -> RunConfig {
    let mut config = RunConfig::default();
    config.workload = workload;
    config.run.horizon_secs = horizon_secs;
    config.run.initial_workers = workers;
    config.engine.kind = EngineKind::Baseline;
    config.engine.baseline_workers = workers;
    config
}

fn reflex(
    dir: &Path,
    nodes: Vec<TreeNode>,
    initial: KnobValue,
    workload: WorkloadConfig,
) -> RunConfig {
    let (model, normalizer) = write_model(dir, nodes);
    let mut config = baseline(initial, workload, 60.0);
    config.engine.kind = EngineKind::Reflex;
    config.engine.model = Some(model);
    config.engine.normalizer = Some(normalizer);
    config
}

/// Bounds: queue length over [0, 100], rates over [0, 2000]/s, the rest [0, 1e4].
fn table() -> NormalizationTable {
    let rows: Vec<FeatureBounds> = Feature::ALL
        .iter()
        .map(|f| {
            let max = match f {
                Feature::RunqLen => 100.0,
                Feature::ArrivalRate | Feature::CompletionRate | Feature::CtxSwitchesPerSec => {
                    2_000.0
                }
                Feature::WorkerUtil => 1.0,
                _ => 10_000.0,
            };
            FeatureBounds {
                name: f.name().to_string(),
                min: 0.0,
                max,
            }
        })
        .collect();
    NormalizationTable::from_bounds(&rows).unwrap()
}

/// Output bounds written into every test artifact. Wider than the default
/// knob range so a leaf can lie outside the pool's bounds.
const OUT_MIN: f32 = 1.0;
const OUT_MAX: f32 = 128.0;

fn write_model(dir: &Path, nodes: Vec<TreeNode>) -> (PathBuf, PathBuf) {
    let tree = DecisionTree::from_nodes(nodes).unwrap();
    let metadata = ModelMetadata {
        trainer: "scenario-tests".to_string(),
        ..Default::default()
    };
    let artifact = ReflexArtifact::new(tree, OUT_MIN, OUT_MAX, metadata).unwrap();

    let model = dir.join("pool.reflex");
    let normalizer = dir.join("pool-norm.json");
    artifact.save(&model).unwrap();
    std::fs::write(&normalizer, table().to_json_string().unwrap()).unwrap();
    (model, normalizer)
}

fn constant(value: f32) -> Vec<TreeNode> {
    vec![TreeNode::leaf(value)]
}

/// Two workers under light load, sixteen once the arrival rate passes 500/s.
fn rate_switch() -> Vec<TreeNode> {
    vec![
        TreeNode::split(Feature::ArrivalRate.index() as u8, 0.25, 1, 2),
        TreeNode::leaf(2.0),
        TreeNode::leaf(16.0),
    ]
}

#[test]
fn baseline_matches_mmc_theory() {
    // λ = 100/s, 500 µs exponential service, 8 workers, 10 s runs. One run
    // holds ~1000 tasks, too few for a stable p95, so average over seeds.
    let seeds = 0..20u64;
    let mut p95_sum = 0.0;
    for seed in seeds.clone() {
        let mut config = baseline(8, steady(100.0, 500.0), 10.0);
        config.run.seed = seed;
        let report = Simulation::new(config).unwrap().run().unwrap();
        assert_eq!(report.summary.arrivals, report.summary.completions);
        p95_sum += report.summary.latency_p95_us;
    }
    let simulated = p95_sum / seeds.count() as f64;
    let analytic = mmc_sojourn_quantile_us(8, 100.0, 500.0, 0.95).unwrap();
    let error = (simulated - analytic).abs() / analytic;
    assert!(
        error < 0.05,
        "simulated p95 {simulated:.1} µs vs analytic {analytic:.1} µs ({:.2}%)",
        error * 100.0
    );
}

#[test]
fn constant_model_differs_from_baseline_only_by_worker_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = reflex(dir.path(), constant(2.0), 8, steady(100.0, 500.0));
    config.run.horizon_secs = 10.0;

    let via_model = Simulation::new(config).unwrap().run().unwrap().summary;
    let fixed_eight = Simulation::new(baseline(8, steady(100.0, 500.0), 10.0))
        .unwrap()
        .run()
        .unwrap()
        .summary;
    let fixed_two = Simulation::new(baseline(2, steady(100.0, 500.0), 10.0))
        .unwrap()
        .run()
        .unwrap()
        .summary;

    // The first tick moves the pool from 8 to 2; nothing moves it again.
    assert_eq!(via_model.info.engine, "reflex");
    assert_eq!(via_model.applied, 1);
    assert_eq!(via_model.decisions[0].cause, ApplyCause::Initial);
    assert_eq!(via_model.decisions[0].value, 2);
    assert_eq!(via_model.flips, 0);
    assert_eq!(via_model.final_workers, 2);
    assert!(via_model.is_clean());

    // Same seed, same arrival stream: only the worker count differs.
    assert_eq!(via_model.arrivals, fixed_eight.arrivals);
    assert_eq!(via_model.completions, fixed_eight.completions);
    assert_eq!(via_model.arrivals, fixed_two.arrivals);

    // Fewer workers never shorten a FCFS sojourn on the same sample path.
    assert!(via_model.latency_p95_us >= fixed_eight.latency_p95_us);

    // And the gap to N=8 is what M/M/c predicts for 2 vs 8 workers, give or
    // take one order statistic around the 95th percentile.
    let predicted = mmc_sojourn_quantile_us(2, 100.0, 500.0, 0.95).unwrap()
        / mmc_sojourn_quantile_us(8, 100.0, 500.0, 0.95).unwrap()
        - 1.0;
    let observed = via_model.latency_p95_us / fixed_eight.latency_p95_us - 1.0;
    assert!(
        (observed - predicted).abs() < 0.02,
        "observed gap {:.3}% vs predicted {:.3}%",
        observed * 100.0,
        predicted * 100.0
    );
}

#[test]
fn out_of_range_leaf_is_clamped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = reflex(dir.path(), constant(100.0), 8, steady(100.0, 500.0));
    config.run.horizon_secs = 10.0;
    config.bounds.max_workers = 16;

    let summary = Simulation::new(config).unwrap().run().unwrap().summary;
    assert_eq!(summary.final_workers, 16);
    assert_eq!(summary.clamped, summary.proposals);
    assert!(summary.clamped > 0);
    assert_eq!(summary.status, RunStatus::Degraded);
    assert_eq!(summary.decisions[0].value, 16);
    assert_eq!(summary.arrivals, summary.completions);
}

#[test]
fn governor_bounds_flips_under_bursty_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = reflex(dir.path(), rate_switch(), 8, bursty());
    config.governor.dwell_ms = 10_000;

    let summary = Simulation::new(config.clone()).unwrap().run().unwrap().summary;
    let max_flips = config.run.horizon_secs / (config.governor.dwell_ms as f64 / 1_000.0);

    assert!(summary.flips >= 1, "engine never moved the pool");
    assert!(summary.flips as f64 <= max_flips, "flips={}", summary.flips);
    assert!(summary.oscillation_rate_hz <= config.governor.max_flip_rate_hz());
    assert!(summary.proposals > summary.applied);

    let mut decisions = summary.decisions.iter().filter(|d| d.is_flip());
    if let Some(mut previous) = decisions.next() {
        for next in decisions {
            let gap = next.at.saturating_since(previous.at);
            assert!(gap.as_secs_f64() >= 10.0, "flips {previous:?} and {next:?} too close");
            previous = next;
        }
    }
}

#[test]
fn nan_feature_is_survived_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = reflex(dir.path(), rate_switch(), 8, bursty());
    config.run.horizon_secs = 10.0;

    let mut sim = Simulation::new(config).unwrap();
    sim.inject_nan(5, Feature::TaskTimeP95Us);
    let report = sim.run().unwrap();

    assert_eq!(report.summary.anomalies, 1);
    assert_eq!(report.summary.status, RunStatus::Degraded);
    assert_eq!(report.summary.arrivals, report.summary.completions);
    assert!(report.telemetry.iter().all(|f| f.first_non_finite().is_none()));
    assert!((1..=64).contains(&report.summary.final_workers));
}

#[test]
fn identical_inputs_give_identical_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut workload = bursty();
    workload.profile = WorkloadProfile::Adversarial;
    workload.rate_per_sec = 600.0;
    workload.phase_ms = 700;
    let mut config = reflex(dir.path(), rate_switch(), 4, workload);
    config.run.horizon_secs = 20.0;
    config.governor.dwell_ms = 2_000;

    let a = Simulation::new(config.clone()).unwrap().run().unwrap();
    let b = Simulation::new(config.clone()).unwrap().run().unwrap();
    assert_eq!(a.summary, b.summary);
    assert_eq!(a.telemetry, b.telemetry);

    config.run.seed += 1;
    let c = Simulation::new(config).unwrap().run().unwrap();
    assert_ne!(a.telemetry, c.telemetry);
}

#[test]
fn every_profile_conserves_tasks() {
    for profile in [
        WorkloadProfile::Steady,
        WorkloadProfile::Bursty,
        WorkloadProfile::Adversarial,
    ] {
        let mut workload = bursty();
        workload.profile = profile;
        workload.rate_per_sec = 800.0;
        let mut config = baseline(4, workload, 8.0);
        config.engine.kind = EngineKind::Pid;
        config.engine.target_p95_us = 1_500.0;
        config.governor.dwell_ms = 1_000;

        let summary = Simulation::new(config).unwrap().run().unwrap().summary;
        assert_eq!(summary.arrivals, summary.completions, "{profile:?}");
        assert!(summary.arrivals > 0, "{profile:?}");
        assert!(summary.flips as f64 <= 8.0, "{profile:?} flips={}", summary.flips);
    }
}

#[test]
fn reflex_without_model_file_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = reflex(dir.path(), constant(4.0), 8, bursty());
    std::fs::write(dir.path().join("pool.reflex"), b"RFX1 but not really").unwrap();
    assert!(matches!(Simulation::new(config.clone()), Err(SimError::Engine(_))));

    config.engine.model = None;
    assert!(matches!(Simulation::new(config), Err(SimError::Config(_))));
}

#[test]
fn saved_model_infers_like_the_original() {
    let dir = tempfile::tempdir().unwrap();
    let (model_path, norm_path) = write_model(dir.path(), rate_switch());
    let loaded = ReflexModel::load(&model_path, &norm_path).unwrap();
    let original = ReflexModel::new(
        ReflexArtifact::new(
            DecisionTree::from_nodes(rate_switch()).unwrap(),
            OUT_MIN,
            OUT_MAX,
            ModelMetadata::default(),
        )
        .unwrap(),
        table(),
    );

    for rate in (0..=2_400).step_by(50) {
        let mut values = [0.0; FEATURE_COUNT];
        values[Feature::ArrivalRate.index()] = f64::from(rate);
        let features = FeatureVector::new(0, SimTime::ZERO, values);
        let expected = if rate <= 500 { 2.0 } else { 16.0 };
        assert_eq!(loaded.infer(features.values()), expected, "rate={rate}");
        assert_eq!(loaded.infer(features.values()), original.infer(features.values()));
    }
}
