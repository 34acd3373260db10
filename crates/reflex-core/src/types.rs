//! Shared types used across reflexgrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::time::{SimDuration, SimTime};

/// The tunable under control: the number of active workers.
pub type KnobValue = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Lifecycle of a task. Transitions only move forward, exactly once each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Created,
    Queued,
    Dispatched,
    Completed,
}

/// A unit of synthetic work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub arrival: SimTime,
    pub service: SimDuration,
    pub dispatched_at: Option<SimTime>,
    pub completed_at: Option<SimTime>,
    pub worker: Option<WorkerId>,
    phase: TaskPhase,
}

impl Task {
    pub fn new(id: TaskId, arrival: SimTime, service: SimDuration) -> Self {
        Self {
            id,
            arrival,
            service,
            dispatched_at: None,
            completed_at: None,
            worker: None,
            phase: TaskPhase::Created,
        }
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn mark_queued(&mut self) {
        debug_assert_eq!(self.phase, TaskPhase::Created, "{} queued twice", self.id);
        self.phase = TaskPhase::Queued;
    }

    pub fn mark_dispatched(&mut self, worker: WorkerId, at: SimTime) {
        debug_assert_eq!(self.phase, TaskPhase::Queued, "{} dispatched twice", self.id);
        self.phase = TaskPhase::Dispatched;
        self.worker = Some(worker);
        self.dispatched_at = Some(at);
    }

    pub fn mark_completed(&mut self, at: SimTime) {
        debug_assert_eq!(self.phase, TaskPhase::Dispatched, "{} completed twice", self.id);
        self.phase = TaskPhase::Completed;
        self.completed_at = Some(at);
    }

    /// Arrival-to-completion latency, once completed.
    pub fn sojourn(&self) -> Option<SimDuration> {
        self.completed_at.map(|done| done.saturating_since(self.arrival))
    }

    /// Time spent queued before a worker picked the task up.
    pub fn wait(&self) -> Option<SimDuration> {
        self.dispatched_at.map(|at| at.saturating_since(self.arrival))
    }
}

// ── Feature schema ─────────────────────────────────────────────

pub const FEATURE_COUNT: usize = 10;

/// Named telemetry features, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    RunqLen,
    ArrivalRate,
    CompletionRate,
    TaskTimeP50Us,
    TaskTimeP95Us,
    WorkerUtil,
    CtxSwitchesPerSec,
    TaskSizeMeanUs,
    TaskSizeVarUs2,
    IdleWorkerCount,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::RunqLen,
        Feature::ArrivalRate,
        Feature::CompletionRate,
        Feature::TaskTimeP50Us,
        Feature::TaskTimeP95Us,
        Feature::WorkerUtil,
        Feature::CtxSwitchesPerSec,
        Feature::TaskSizeMeanUs,
        Feature::TaskSizeVarUs2,
        Feature::IdleWorkerCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::RunqLen => "runq_len",
            Feature::ArrivalRate => "arrival_rate",
            Feature::CompletionRate => "completion_rate",
            Feature::TaskTimeP50Us => "task_time_p50_us",
            Feature::TaskTimeP95Us => "task_time_p95_us",
            Feature::WorkerUtil => "worker_util",
            Feature::CtxSwitchesPerSec => "ctx_switches_per_sec",
            Feature::TaskSizeMeanUs => "task_size_mean_us",
            Feature::TaskSizeVarUs2 => "task_size_var_us2",
            Feature::IdleWorkerCount => "idle_worker_count",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn from_index(index: usize) -> Option<Feature> {
        Feature::ALL.get(index).copied()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One telemetry sample, emitted once per cadence tick. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    tick: u64,
    at: SimTime,
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn new(tick: u64, at: SimTime, values: [f64; FEATURE_COUNT]) -> Self {
        Self { tick, at, values }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn at(&self) -> SimTime {
        self.at
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// The first feature holding NaN or an infinity, if any.
    pub fn first_non_finite(&self) -> Option<Feature> {
        Feature::ALL
            .into_iter()
            .find(|f| !self.values[f.index()].is_finite())
    }

    /// Copy with one field replaced. Used to build probes and fault injections.
    pub fn with(&self, feature: Feature, value: f64) -> Self {
        let mut values = self.values;
        values[feature.index()] = value;
        Self {
            tick: self.tick,
            at: self.at,
            values,
        }
    }
}

// ── Decisions ──────────────────────────────────────────────────

/// Inclusive range of valid knob values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnobRange {
    min: KnobValue,
    max: KnobValue,
}

impl KnobRange {
    pub fn new(min: KnobValue, max: KnobValue) -> ConfigResult<Self> {
        if min < 1 || min > max {
            return Err(ConfigError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> KnobValue {
        self.min
    }

    pub fn max(&self) -> KnobValue {
        self.max
    }

    pub fn contains(&self, value: KnobValue) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn clamp(&self, value: KnobValue) -> KnobValue {
        value.clamp(self.min, self.max)
    }

}

/// Round a real-valued engine output to the nearest knob value. Negative
/// and NaN outputs map to 0, which no [`KnobRange`] contains, so the
/// governor clamps and reports them.
pub fn round_knob(value: f64) -> KnobValue {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, f64::from(KnobValue::MAX)) as KnobValue
}

impl Default for KnobRange {
    fn default() -> Self {
        Self { min: 1, max: 64 }
    }
}

/// A raw engine proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub value: KnobValue,
    pub tick: u64,
    pub at: SimTime,
}

/// Why a governor-approved value reached the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyCause {
    /// First decision of the run; establishes the operating point.
    Initial,
    /// A regular change that passed dwell and deadband.
    Change,
    /// Revert to the last known-good value after a regression.
    Rollback,
}

/// A value actually pushed to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDecision {
    pub value: KnobValue,
    pub previous: Option<KnobValue>,
    pub tick: u64,
    pub at: SimTime,
    pub cause: ApplyCause,
}

impl AppliedDecision {
    /// Flips are every applied change after the initial one.
    pub fn is_flip(&self) -> bool {
        self.cause != ApplyCause::Initial
    }
}
