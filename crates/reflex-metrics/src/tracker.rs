//! Metrics tracker — consumes pool and governor events, never mutates them.

use reflex_core::{AppliedDecision, ApplyCause, KnobValue, SimTime, Task};
use reflex_governor::{GovernorOutcome, Verdict};
use tracing::info;

use crate::histogram::LatencyHistogram;
use crate::summary::{RunInfo, RunStatus, RunSummary};

/// Point-in-time view of the counters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub at: SimTime,
    pub arrivals: u64,
    pub completions: u64,
    pub throughput_per_sec: f64,
    pub latency_p50_us: Option<f64>,
    pub latency_p95_us: Option<f64>,
    pub latency_p99_us: Option<f64>,
    pub proposals: u64,
    pub flips: u64,
    pub rollbacks: u64,
}

#[derive(Debug, Default)]
pub struct MetricsTracker {
    latency: LatencyHistogram,
    arrivals: u64,
    completions: u64,
    proposals: u64,
    clamped: u64,
    rejected_resizes: u64,
    decisions: Vec<AppliedDecision>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_arrival(&mut self) {
        self.arrivals += 1;
    }

    /// Record a completed task's sojourn latency. Tasks without a
    /// completion timestamp are ignored.
    pub fn record_completion(&mut self, task: &Task) {
        if let Some(sojourn) = task.sojourn() {
            self.completions += 1;
            self.latency.record(sojourn.as_nanos());
        }
    }

    pub fn record_outcome(&mut self, outcome: &GovernorOutcome) {
        self.proposals += 1;
        if outcome.clamped_to.is_some() {
            self.clamped += 1;
        }
        if let Verdict::Apply(applied) = outcome.verdict {
            self.decisions.push(applied);
        }
    }

    pub fn record_rejected_resize(&mut self) {
        self.rejected_resizes += 1;
    }

    pub fn flips(&self) -> u64 {
        self.decisions.iter().filter(|d| d.is_flip()).count() as u64
    }

    pub fn rollbacks(&self) -> u64 {
        self.decisions
            .iter()
            .filter(|d| d.cause == ApplyCause::Rollback)
            .count() as u64
    }

    pub fn decisions(&self) -> &[AppliedDecision] {
        &self.decisions
    }

    pub fn latency(&self) -> &LatencyHistogram {
        &self.latency
    }

    pub fn snapshot(&self, at: SimTime) -> MetricsSnapshot {
        MetricsSnapshot {
            at,
            arrivals: self.arrivals,
            completions: self.completions,
            throughput_per_sec: per_sec(self.completions, at),
            latency_p50_us: self.latency.quantile_us(0.50),
            latency_p95_us: self.latency.quantile_us(0.95),
            latency_p99_us: self.latency.quantile_us(0.99),
            proposals: self.proposals,
            flips: self.flips(),
            rollbacks: self.rollbacks(),
        }
    }

    /// Final summary at simulated time `end`.
    pub fn finish(
        &self,
        info: RunInfo,
        end: SimTime,
        anomalies: u64,
        final_workers: KnobValue,
    ) -> RunSummary {
        let flips = self.flips();
        let rollbacks = self.rollbacks();
        let degraded =
            rollbacks > 0 || anomalies > 0 || self.clamped > 0 || self.rejected_resizes > 0;

        let summary = RunSummary {
            status: if degraded {
                RunStatus::Degraded
            } else {
                RunStatus::Clean
            },
            info,
            duration_secs: end.as_secs_f64(),
            arrivals: self.arrivals,
            completions: self.completions,
            throughput_per_sec: per_sec(self.completions, end),
            latency_p50_us: self.latency.quantile_us(0.50).unwrap_or(0.0),
            latency_p95_us: self.latency.quantile_us(0.95).unwrap_or(0.0),
            latency_p99_us: self.latency.quantile_us(0.99).unwrap_or(0.0),
            latency_mean_us: self.latency.mean_us().unwrap_or(0.0),
            latency_max_us: self.latency.max_us().unwrap_or(0.0),
            proposals: self.proposals,
            applied: self.decisions.len() as u64,
            flips,
            rollbacks,
            clamped: self.clamped,
            anomalies,
            rejected_resizes: self.rejected_resizes,
            oscillation_rate_hz: per_sec(flips, end),
            final_workers,
            decisions: self.decisions.clone(),
        };

        info!(
            engine = %summary.info.engine,
            status = ?summary.status,
            completions = summary.completions,
            p95_us = summary.latency_p95_us,
            flips,
            rollbacks,
            anomalies,
            "run finished"
        );
        summary
    }
}

fn per_sec(count: u64, at: SimTime) -> f64 {
    let secs = at.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}
