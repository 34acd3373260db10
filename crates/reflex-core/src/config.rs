//! reflex.toml run configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::time::SimDuration;
use crate::types::{KnobRange, KnobValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run: RunSection,
    pub workload: WorkloadConfig,
    pub bounds: BoundsConfig,
    pub governor: GovernorConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// Seed for the workload generator. Same seed, same events.
    pub seed: u64,
    /// Simulated-time horizon for arrivals and decision ticks.
    pub horizon_secs: f64,
    /// Optional cap on admitted arrivals.
    pub max_tasks: Option<u64>,
    /// Telemetry / decision cadence in simulated milliseconds.
    pub cadence_ms: u64,
    /// Worker count before the first decision is applied.
    pub initial_workers: KnobValue,
    /// Let queued and in-flight work finish after the horizon.
    pub drain: bool,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            seed: 42,
            horizon_secs: 10.0,
            max_tasks: None,
            cadence_ms: 500,
            initial_workers: 8,
            drain: true,
        }
    }
}

impl RunSection {
    pub fn cadence(&self) -> SimDuration {
        SimDuration::from_millis(self.cadence_ms)
    }

    pub fn horizon(&self) -> SimDuration {
        SimDuration::from_secs_f64(self.horizon_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadProfile {
    #[default]
    Steady,
    Bursty,
    Adversarial,
}

impl WorkloadProfile {
    pub fn label(self) -> &'static str {
        match self {
            WorkloadProfile::Steady => "steady",
            WorkloadProfile::Bursty => "bursty",
            WorkloadProfile::Adversarial => "adversarial",
        }
    }
}

/// Service-time distribution, parameterised in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ServiceTimeConfig {
    Fixed { mean_us: f64 },
    Exponential { mean_us: f64 },
    Uniform { mean_us: f64, variance_us2: f64 },
}

impl ServiceTimeConfig {
    pub fn mean_us(&self) -> f64 {
        match *self {
            ServiceTimeConfig::Fixed { mean_us }
            | ServiceTimeConfig::Exponential { mean_us }
            | ServiceTimeConfig::Uniform { mean_us, .. } => mean_us,
        }
    }

    pub fn variance_us2(&self) -> f64 {
        match *self {
            ServiceTimeConfig::Fixed { .. } => 0.0,
            ServiceTimeConfig::Exponential { mean_us } => mean_us * mean_us,
            ServiceTimeConfig::Uniform { variance_us2, .. } => variance_us2,
        }
    }

    /// Same shape, mean scaled by `factor` (variance scaled by `factor²`).
    pub fn scaled(&self, factor: f64) -> Self {
        match *self {
            ServiceTimeConfig::Fixed { mean_us } => ServiceTimeConfig::Fixed {
                mean_us: mean_us * factor,
            },
            ServiceTimeConfig::Exponential { mean_us } => ServiceTimeConfig::Exponential {
                mean_us: mean_us * factor,
            },
            ServiceTimeConfig::Uniform {
                mean_us,
                variance_us2,
            } => ServiceTimeConfig::Uniform {
                mean_us: mean_us * factor,
                variance_us2: variance_us2 * factor * factor,
            },
        }
    }
}

impl Default for ServiceTimeConfig {
    fn default() -> Self {
        ServiceTimeConfig::Exponential { mean_us: 500.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub profile: WorkloadProfile,
    /// Steady and adversarial base arrival rate.
    pub rate_per_sec: f64,
    pub service: ServiceTimeConfig,
    /// Bursty: rate during the high phase.
    pub high_rate_per_sec: f64,
    /// Bursty: rate during the low phase.
    pub low_rate_per_sec: f64,
    /// Bursty: length of each phase.
    pub period_ms: u64,
    /// Adversarial: length of each jitter phase.
    pub phase_ms: u64,
    /// Adversarial: rate multiplier drawn from [1 - j, 1 + j] per phase.
    pub rate_jitter: f64,
    /// Adversarial: service-mean multiplier drawn from [1 - j, 1 + j] per phase.
    pub service_jitter: f64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            profile: WorkloadProfile::Steady,
            rate_per_sec: 100.0,
            service: ServiceTimeConfig::default(),
            high_rate_per_sec: 1000.0,
            low_rate_per_sec: 100.0,
            period_ms: 2000,
            phase_ms: 1000,
            rate_jitter: 0.5,
            service_jitter: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsConfig {
    pub min_workers: KnobValue,
    pub max_workers: KnobValue,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 64,
        }
    }
}

impl BoundsConfig {
    pub fn range(&self) -> ConfigResult<KnobRange> {
        KnobRange::new(self.min_workers, self.max_workers)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Minimum simulated time between two applied changes.
    pub dwell_ms: u64,
    /// Proposals closer than this to the applied value are ignored.
    pub deadband: KnobValue,
    /// Relative p95 regression that triggers a rollback.
    pub rollback_tolerance: f64,
    /// Ticks observed after a change before judging it.
    pub rollback_window_ticks: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 10_000,
            deadband: 1,
            rollback_tolerance: 0.5,
            rollback_window_ticks: 4,
        }
    }
}

impl GovernorConfig {
    pub fn dwell(&self) -> SimDuration {
        SimDuration::from_millis(self.dwell_ms)
    }

    /// Upper bound on applied changes per simulated second.
    pub fn max_flip_rate_hz(&self) -> f64 {
        if self.dwell_ms == 0 {
            f64::INFINITY
        } else {
            1_000.0 / self.dwell_ms as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Baseline,
    Reflex,
    Pid,
}

impl EngineKind {
    pub fn label(self) -> &'static str {
        match self {
            EngineKind::Baseline => "baseline",
            EngineKind::Reflex => "reflex",
            EngineKind::Pid => "pid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Baseline: the constant worker count.
    pub baseline_workers: KnobValue,
    /// Reflex: path to the `.reflex` model artifact.
    pub model: Option<PathBuf>,
    /// Reflex: path to the normalization table (JSON).
    pub normalizer: Option<PathBuf>,
    /// PID: p95 latency setpoint in microseconds.
    pub target_p95_us: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Baseline,
            baseline_workers: 8,
            model: None,
            normalizer: None,
            target_p95_us: 2_000.0,
            kp: 4.0,
            ki: 0.5,
            kd: 0.0,
        }
    }
}

impl RunConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every condition that must abort a run before it starts.
    pub fn validate(&self) -> ConfigResult<()> {
        let range = self.bounds.range()?;
        check_in_bounds("run.initial_workers", self.run.initial_workers, range)?;

        if !(self.run.horizon_secs.is_finite() && self.run.horizon_secs > 0.0) {
            return Err(ConfigError::ZeroLength {
                field: "run.horizon_secs",
            });
        }
        if self.run.max_tasks == Some(0) {
            return Err(ConfigError::ZeroLength {
                field: "run.max_tasks",
            });
        }
        if self.run.cadence_ms == 0 {
            return Err(ConfigError::ZeroLength {
                field: "run.cadence_ms",
            });
        }

        self.validate_workload()?;

        let gov = &self.governor;
        if !(gov.rollback_tolerance.is_finite() && gov.rollback_tolerance >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "governor.rollback_tolerance",
                value: gov.rollback_tolerance,
                reason: "must be finite and >= 0",
            });
        }
        if gov.rollback_window_ticks == 0 {
            return Err(ConfigError::ZeroLength {
                field: "governor.rollback_window_ticks",
            });
        }

        match self.engine.kind {
            EngineKind::Baseline => {
                check_in_bounds("engine.baseline_workers", self.engine.baseline_workers, range)?;
            }
            EngineKind::Reflex => {
                if self.engine.model.is_none() {
                    return Err(ConfigError::MissingPath {
                        engine: "reflex",
                        field: "engine.model",
                    });
                }
                if self.engine.normalizer.is_none() {
                    return Err(ConfigError::MissingPath {
                        engine: "reflex",
                        field: "engine.normalizer",
                    });
                }
            }
            EngineKind::Pid => {
                check_rate("engine.target_p95_us", self.engine.target_p95_us)?;
                for (field, gain) in [
                    ("engine.kp", self.engine.kp),
                    ("engine.ki", self.engine.ki),
                    ("engine.kd", self.engine.kd),
                ] {
                    if !gain.is_finite() {
                        return Err(ConfigError::OutOfRange {
                            field,
                            value: gain,
                            reason: "gain must be finite",
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_workload(&self) -> ConfigResult<()> {
        let w = &self.workload;
        match w.profile {
            WorkloadProfile::Steady => check_rate("workload.rate_per_sec", w.rate_per_sec)?,
            WorkloadProfile::Bursty => {
                check_rate("workload.high_rate_per_sec", w.high_rate_per_sec)?;
                check_rate("workload.low_rate_per_sec", w.low_rate_per_sec)?;
                if w.period_ms == 0 {
                    return Err(ConfigError::ZeroLength {
                        field: "workload.period_ms",
                    });
                }
            }
            WorkloadProfile::Adversarial => {
                check_rate("workload.rate_per_sec", w.rate_per_sec)?;
                if w.phase_ms == 0 {
                    return Err(ConfigError::ZeroLength {
                        field: "workload.phase_ms",
                    });
                }
                for (field, jitter) in [
                    ("workload.rate_jitter", w.rate_jitter),
                    ("workload.service_jitter", w.service_jitter),
                ] {
                    if !(0.0..1.0).contains(&jitter) {
                        return Err(ConfigError::OutOfRange {
                            field,
                            value: jitter,
                            reason: "jitter must lie in [0, 1)",
                        });
                    }
                }
            }
        }

        check_rate("workload.service.mean_us", w.service.mean_us())?;
        let variance = w.service.variance_us2();
        if !(variance.is_finite() && variance >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "workload.service.variance_us2",
                value: variance,
                reason: "must be finite and >= 0",
            });
        }
        Ok(())
    }
}

fn check_rate(field: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate { field, value })
    }
}

fn check_in_bounds(field: &'static str, value: KnobValue, range: KnobRange) -> ConfigResult<()> {
    if range.contains(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfBounds {
            field,
            value,
            min: range.min(),
            max: range.max(),
        })
    }
}
