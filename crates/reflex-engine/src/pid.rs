//! Setpoint tracking on p95 latency.
//!
//! ```text
//! e(t)   = (p95 - target) / target
//! I(t)   = clamp(I(t-1) + e(t), -limit, limit)
//! u(t)   = anchor + kp*e(t) + ki*I(t) + kd*(e(t) - e(t-1))
//! ```
//!
//! Positive error (too slow) grows the pool. `limit` keeps `ki*I` within
//! the width of the knob range so the integral cannot wind up past what
//! the output could ever express. `u(t)` is rounded but not clamped: a
//! saturated controller proposes outside the range and the governor
//! reports the clamp.

use reflex_core::{Feature, FeatureVector, KnobRange, KnobValue, round_knob};
use tracing::warn;

use crate::engine::DecisionEngine;

#[derive(Debug, Clone)]
pub struct PidEngine {
    target_us: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    anchor: f64,
    integral: f64,
    integral_limit: f64,
    prev_error: Option<f64>,
    last_good: KnobValue,
    anomalies: u64,
}

impl PidEngine {
    pub fn new(
        target_us: f64,
        kp: f64,
        ki: f64,
        kd: f64,
        range: KnobRange,
        anchor: KnobValue,
    ) -> Self {
        let span = f64::from(range.max() - range.min()).max(1.0);
        let integral_limit = if ki.abs() > f64::EPSILON {
            span / ki.abs()
        } else {
            0.0
        };
        let anchor = range.clamp(anchor);
        Self {
            target_us,
            kp,
            ki,
            kd,
            anchor: f64::from(anchor),
            integral: 0.0,
            integral_limit,
            prev_error: None,
            last_good: anchor,
            anomalies: 0,
        }
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }
}

impl DecisionEngine for PidEngine {
    fn name(&self) -> &'static str {
        "pid"
    }

    fn decide(&mut self, features: &FeatureVector) -> KnobValue {
        if let Some(feature) = features.first_non_finite() {
            self.anomalies += 1;
            warn!(
                tick = features.tick(),
                feature = %feature,
                fallback = self.last_good,
                "invalid feature, keeping last known-good decision"
            );
            return self.last_good;
        }

        let p95 = features.get(Feature::TaskTimeP95Us);
        let error = (p95 - self.target_us) / self.target_us;
        self.integral = (self.integral + error).clamp(-self.integral_limit, self.integral_limit);
        let derivative = self.prev_error.map_or(0.0, |prev| error - prev);
        self.prev_error = Some(error);

        let output =
            self.anchor + self.kp * error + self.ki * self.integral + self.kd * derivative;
        let value = round_knob(output);
        self.last_good = value;
        value
    }

    fn anomalies(&self) -> u64 {
        self.anomalies
    }
}
