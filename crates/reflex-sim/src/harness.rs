//! The run loop.
//!
//! Wires the workload generator, the pool, the telemetry aggregator, one
//! decision engine, the safety governor and the metrics tracker together
//! over a single event queue:
//!
//! ```text
//! arrival ──► pool ──► completion ──► metrics + telemetry window
//! tick ──► telemetry.sample ──► engine.decide ──► governor.review ──► pool.resize
//! ```
//!
//! Arrivals are generated lazily, one pending at a time, so memory stays
//! bounded by the backlog rather than by the horizon.

use std::collections::BTreeMap;

use reflex_core::config::EngineKind;
use reflex_core::{
    Decision, Feature, FeatureVector, KnobRange, KnobValue, RunConfig, SimDuration, SimTime,
};
use reflex_engine::{DecisionEngine, build_engine};
use reflex_governor::SafetyGovernor;
use reflex_metrics::{MetricsSnapshot, MetricsTracker, RunInfo, RunSummary};
use tracing::{debug, info, warn};

use crate::error::SimResult;
use crate::pool::{PoolEvent, PoolSimulator};
use crate::telemetry::TelemetryAggregator;
use crate::workload::WorkloadGenerator;

/// Pool sizes probed by [`sweep`] unless the caller picks others.
pub const DEFAULT_SWEEP: [KnobValue; 7] = [1, 2, 4, 8, 16, 32, 64];

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    /// One feature vector per decision tick, as measured.
    pub telemetry: Vec<FeatureVector>,
    /// Cumulative metrics taken after each tick's decision.
    pub snapshots: Vec<MetricsSnapshot>,
}

pub struct Simulation {
    config: RunConfig,
    engine: Box<dyn DecisionEngine>,
    faults: BTreeMap<u64, Feature>,
}

impl Simulation {
    /// Validate `config` and build the engine it names. Model files are
    /// loaded here, so a bad artifact fails before any event runs.
    pub fn new(config: RunConfig) -> SimResult<Self> {
        config.validate()?;
        let range = config.bounds.range()?;
        let engine = build_engine(&config.engine, range, config.run.initial_workers)?;
        Ok(Self {
            config,
            engine,
            faults: BTreeMap::new(),
        })
    }

    /// Run with a caller-built engine instead of the configured one.
    ///
    /// The engine's own range is not checked against `config.bounds`. Its
    /// proposals go through a governor built from `config.bounds`, so an
    /// engine built for a wider range has out-of-range proposals clamped
    /// and counted, and the run reports as degraded.
    pub fn with_engine(config: RunConfig, engine: Box<dyn DecisionEngine>) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            faults: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Replace `feature` with NaN in the sample the engine sees at `tick`.
    /// The recorded telemetry keeps the measured value.
    pub fn inject_nan(&mut self, tick: u64, feature: Feature) -> &mut Self {
        self.faults.insert(tick, feature);
        self
    }

    pub fn run(mut self) -> SimResult<RunReport> {
        let run = self.config.run.clone();
        let range: KnobRange = self.config.bounds.range()?;
        let horizon = SimTime::ZERO + run.horizon();
        let cadence = run.cadence();
        let max_tasks = run.max_tasks.unwrap_or(u64::MAX);

        let mut pool = PoolSimulator::new(run.initial_workers)?;
        let mut workload = WorkloadGenerator::new(self.config.workload.clone(), run.seed);
        let mut governor = SafetyGovernor::new(&self.config.governor, range);
        let mut metrics = MetricsTracker::new();
        let mut telemetry = TelemetryAggregator::new();
        let mut samples = Vec::new();
        let mut snapshots = Vec::new();

        info!(
            engine = self.engine.name(),
            profile = self.config.workload.profile.label(),
            seed = run.seed,
            horizon_secs = run.horizon_secs,
            initial_workers = run.initial_workers,
            "run starting"
        );

        let mut scheduled = 0u64;
        let mut last_arrival = SimTime::ZERO;
        schedule_arrival(
            &mut pool,
            &mut workload,
            &mut last_arrival,
            &mut scheduled,
            horizon,
            max_tasks,
        );
        if SimTime::ZERO + cadence <= horizon {
            pool.schedule_tick(SimTime::ZERO + cadence, 1);
        }

        while let Some(next) = pool.peek_time() {
            if !run.drain && next > horizon {
                break;
            }
            let Some(step) = pool.step() else {
                break;
            };
            telemetry.record_dispatches(step.dispatched);

            match step.event {
                PoolEvent::Arrival { service, .. } => {
                    metrics.record_arrival();
                    telemetry.record_arrival(service);
                    schedule_arrival(
                        &mut pool,
                        &mut workload,
                        &mut last_arrival,
                        &mut scheduled,
                        horizon,
                        max_tasks,
                    );
                }
                PoolEvent::Completion(task) => {
                    metrics.record_completion(&task);
                    telemetry.record_completion(&task);
                }
                PoolEvent::Tick(tick) => {
                    let state = pool.state();
                    let measured = telemetry.sample(tick, &state);
                    let seen = match self.faults.get(&tick) {
                        Some(&feature) => {
                            warn!(tick, %feature, "injecting NaN into engine input");
                            measured.with(feature, f64::NAN)
                        }
                        None => measured.clone(),
                    };

                    let proposal = Decision {
                        value: self.engine.decide(&seen),
                        tick,
                        at: step.at,
                    };
                    let outcome = governor.review(proposal, &seen);
                    metrics.record_outcome(&outcome);

                    if let Some(applied) = outcome.applied() {
                        if applied.value != pool.active() {
                            match pool.resize(applied.value) {
                                Ok(resize) => telemetry.record_dispatches(resize.dispatched),
                                Err(e) => {
                                    warn!(tick, error = %e, "resize rejected");
                                    metrics.record_rejected_resize();
                                }
                            }
                        }
                    }
                    samples.push(measured);
                    snapshots.push(metrics.snapshot(step.at));

                    let next_tick =
                        SimTime::ZERO + SimDuration::from_nanos(cadence.as_nanos() * (tick + 1));
                    if next_tick <= horizon && state.arrivals < max_tasks {
                        pool.schedule_tick(next_tick, tick + 1);
                    }
                }
            }
            debug_assert!(pool.state().is_conserved());
        }

        let end = if run.drain {
            pool.now()
        } else {
            pool.now().max(horizon)
        };
        let info = RunInfo {
            engine: self.engine.name().to_string(),
            profile: self.config.workload.profile.label().to_string(),
            seed: run.seed,
        };
        let summary = metrics.finish(info, end, self.engine.anomalies(), pool.active());
        debug!(
            ticks = samples.len(),
            pending = pool.pending_events(),
            "run loop finished"
        );

        Ok(RunReport {
            summary,
            telemetry: samples,
            snapshots,
        })
    }
}

/// Generate the next arrival and schedule it if the admission window is
/// still open.
fn schedule_arrival(
    pool: &mut PoolSimulator,
    workload: &mut WorkloadGenerator,
    last: &mut SimTime,
    scheduled: &mut u64,
    horizon: SimTime,
    max_tasks: u64,
) {
    if *scheduled >= max_tasks {
        return;
    }
    let spec = workload.next_arrival();
    let at = *last + spec.delay;
    if at > horizon {
        return;
    }
    *last = at;
    *scheduled += 1;
    pool.schedule_arrival(at, spec.service);
}

/// Latency at one fixed pool size.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub workers: KnobValue,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub points: Vec<SweepPoint>,
}

impl SweepReport {
    /// The pool size with the lowest p95, smallest size on ties.
    pub fn best(&self) -> Option<&SweepPoint> {
        self.points.iter().min_by(|a, b| {
            a.summary
                .latency_p95_us
                .total_cmp(&b.summary.latency_p95_us)
                .then(a.workers.cmp(&b.workers))
        })
    }
}

/// Run the configured workload once per pool size with a constant
/// engine, for an empirical view of the best fixed size.
pub fn sweep(config: &RunConfig, sizes: &[KnobValue]) -> SimResult<SweepReport> {
    let mut points = Vec::with_capacity(sizes.len());
    for &workers in sizes {
        let mut fixed = config.clone();
        fixed.engine.kind = EngineKind::Baseline;
        fixed.engine.baseline_workers = workers;
        fixed.run.initial_workers = workers;
        fixed.bounds.min_workers = fixed.bounds.min_workers.min(workers).max(1);
        fixed.bounds.max_workers = fixed.bounds.max_workers.max(workers);

        let report = Simulation::new(fixed)?.run()?;
        info!(
            workers,
            p95_us = report.summary.latency_p95_us,
            throughput = report.summary.throughput_per_sec,
            "sweep point"
        );
        points.push(SweepPoint {
            workers,
            summary: report.summary,
        });
    }
    Ok(SweepReport { points })
}
