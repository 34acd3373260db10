//! Per-tick feature extraction.
//!
//! The aggregator watches pool events between two ticks and turns that
//! window into one [`FeatureVector`]. Latency percentiles and task-size
//! moments are carried forward when a window has no samples, so a quiet
//! window does not read as "zero latency".

use reflex_core::{FEATURE_COUNT, Feature, FeatureVector, SimDuration, SimTime, Task};
use reflex_metrics::LatencyHistogram;

use crate::pool::PoolState;

#[derive(Debug, Default)]
pub struct TelemetryAggregator {
    window_start: SimTime,
    arrivals: u64,
    completions: u64,
    dispatches: u64,
    latency: LatencyHistogram,
    size_count: u64,
    size_sum_us: f64,
    size_sum_sq_us: f64,
    last_p50_us: f64,
    last_p95_us: f64,
    last_size_mean_us: f64,
    last_size_var_us2: f64,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_arrival(&mut self, service: SimDuration) {
        self.arrivals += 1;
        let us = service.as_micros_f64();
        self.size_count += 1;
        self.size_sum_us += us;
        self.size_sum_sq_us += us * us;
    }

    pub fn record_completion(&mut self, task: &Task) {
        if let Some(sojourn) = task.sojourn() {
            self.completions += 1;
            self.latency.record(sojourn.as_nanos());
        }
    }

    pub fn record_dispatches(&mut self, count: usize) {
        self.dispatches += count as u64;
    }

    /// Close the current window and emit its feature vector.
    pub fn sample(&mut self, tick: u64, state: &PoolState) -> FeatureVector {
        let secs = state.now.saturating_since(self.window_start).as_secs_f64();
        let per_sec = |count: u64| if secs > 0.0 { count as f64 / secs } else { 0.0 };

        if let Some(p50) = self.latency.quantile_us(0.50) {
            self.last_p50_us = p50;
        }
        if let Some(p95) = self.latency.quantile_us(0.95) {
            self.last_p95_us = p95;
        }
        if self.size_count > 0 {
            let n = self.size_count as f64;
            let mean = self.size_sum_us / n;
            self.last_size_mean_us = mean;
            self.last_size_var_us2 = (self.size_sum_sq_us / n - mean * mean).max(0.0);
        }

        let workers = state.workers();
        let util = if workers > 0 {
            state.busy as f64 / workers as f64
        } else {
            0.0
        };

        let mut values = [0.0; FEATURE_COUNT];
        values[Feature::RunqLen.index()] = state.queued as f64;
        values[Feature::ArrivalRate.index()] = per_sec(self.arrivals);
        values[Feature::CompletionRate.index()] = per_sec(self.completions);
        values[Feature::TaskTimeP50Us.index()] = self.last_p50_us;
        values[Feature::TaskTimeP95Us.index()] = self.last_p95_us;
        values[Feature::WorkerUtil.index()] = util;
        values[Feature::CtxSwitchesPerSec.index()] = per_sec(self.dispatches);
        values[Feature::TaskSizeMeanUs.index()] = self.last_size_mean_us;
        values[Feature::TaskSizeVarUs2.index()] = self.last_size_var_us2;
        values[Feature::IdleWorkerCount.index()] = state.idle as f64;

        self.reset_window(state.now);
        FeatureVector::new(tick, state.now, values)
    }

    fn reset_window(&mut self, now: SimTime) {
        self.window_start = now;
        self.arrivals = 0;
        self.completions = 0;
        self.dispatches = 0;
        self.latency.clear();
        self.size_count = 0;
        self.size_sum_us = 0.0;
        self.size_sum_sq_us = 0.0;
    }
}
