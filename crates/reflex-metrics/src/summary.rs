//! End-of-run summary.

use std::path::Path;

use reflex_core::{AppliedDecision, KnobValue};
use serde::{Deserialize, Serialize};

/// Whether anything recoverable went wrong during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Clean,
    /// At least one rollback, anomaly, clamped proposal or rejected resize.
    Degraded,
}

/// Identifies a run in its summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub engine: String,
    pub profile: String,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    #[serde(flatten)]
    pub info: RunInfo,
    pub duration_secs: f64,

    pub arrivals: u64,
    pub completions: u64,
    pub throughput_per_sec: f64,
    pub latency_p50_us: f64,
    pub latency_p95_us: f64,
    pub latency_p99_us: f64,
    pub latency_mean_us: f64,
    pub latency_max_us: f64,

    pub proposals: u64,
    pub applied: u64,
    pub flips: u64,
    pub rollbacks: u64,
    pub clamped: u64,
    pub anomalies: u64,
    pub rejected_resizes: u64,
    /// Applied changes (flips) per simulated second.
    pub oscillation_rate_hz: f64,
    pub final_workers: KnobValue,

    pub decisions: Vec<AppliedDecision>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.status == RunStatus::Clean
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json_pretty().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
