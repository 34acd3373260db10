//! Safety governor state machine.

use std::collections::VecDeque;

use reflex_core::config::GovernorConfig;
use reflex_core::{
    AppliedDecision, ApplyCause, Decision, Feature, FeatureVector, KnobRange, KnobValue,
    SimDuration, SimTime,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Why a proposal did not reach the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// Proposal equals the applied value.
    Unchanged,
    /// Change smaller than the deadband.
    Deadband,
    /// Minimum dwell since the last change has not elapsed.
    Dwell,
    /// The last change is still being judged.
    Observing,
    /// A rollback is pending; proposals are ignored until it lands.
    Reverting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Apply(AppliedDecision),
    Hold(HoldReason),
}

/// Result of reviewing one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorOutcome {
    pub proposed: Decision,
    /// Set when the proposal lay outside the knob range.
    pub clamped_to: Option<KnobValue>,
    pub verdict: Verdict,
}

impl GovernorOutcome {
    pub fn applied(&self) -> Option<&AppliedDecision> {
        match &self.verdict {
            Verdict::Apply(applied) => Some(applied),
            Verdict::Hold(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorStats {
    pub proposals: u64,
    pub clamped: u64,
    pub applied: u64,
    pub flips: u64,
    pub rollbacks: u64,
    pub held_deadband: u64,
    pub held_dwell: u64,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Steady,
    /// Judging a change against the p95 observed before it.
    Observing {
        baseline_p95: f64,
        sum_p95: f64,
        ticks: u32,
    },
    /// Regression confirmed; waiting for dwell to revert.
    Reverting { observed_p95: f64 },
}

pub struct SafetyGovernor {
    range: KnobRange,
    dwell: SimDuration,
    deadband: KnobValue,
    tolerance: f64,
    window_ticks: u32,

    applied: Option<KnobValue>,
    last_good: Option<KnobValue>,
    last_change_at: Option<SimTime>,
    recent_p95: VecDeque<f64>,
    phase: Phase,
    stats: GovernorStats,
}

impl SafetyGovernor {
    pub fn new(config: &GovernorConfig, range: KnobRange) -> Self {
        let window_ticks = config.rollback_window_ticks.max(1);
        Self {
            range,
            dwell: config.dwell(),
            deadband: config.deadband,
            tolerance: config.rollback_tolerance,
            window_ticks,
            applied: None,
            last_good: None,
            last_change_at: None,
            recent_p95: VecDeque::with_capacity(window_ticks as usize),
            phase: Phase::Steady,
            stats: GovernorStats::default(),
        }
    }

    pub fn applied(&self) -> Option<KnobValue> {
        self.applied
    }

    pub fn last_good(&self) -> Option<KnobValue> {
        self.last_good
    }

    pub fn stats(&self) -> GovernorStats {
        self.stats
    }

    pub fn is_reverting(&self) -> bool {
        matches!(self.phase, Phase::Reverting { .. })
    }

    /// Review one proposal against the telemetry sample it was made from.
    pub fn review(&mut self, proposal: Decision, features: &FeatureVector) -> GovernorOutcome {
        self.stats.proposals += 1;
        self.observe(features);

        let at = features.at();
        let tick = features.tick();

        let mut value = proposal.value;
        let mut clamped_to = None;
        if !self.range.contains(value) {
            value = self.range.clamp(value);
            clamped_to = Some(value);
            self.stats.clamped += 1;
            warn!(
                tick,
                proposed = proposal.value,
                clamped = value,
                min = self.range.min(),
                max = self.range.max(),
                "proposal outside knob range, clamped"
            );
        }

        let verdict = self.judge(value, tick, at);
        GovernorOutcome {
            proposed: proposal,
            clamped_to,
            verdict,
        }
    }

    fn judge(&mut self, value: KnobValue, tick: u64, at: SimTime) -> Verdict {
        let Some(current) = self.applied else {
            self.last_good = Some(value);
            return self.apply(value, None, tick, at, ApplyCause::Initial);
        };

        match self.phase {
            Phase::Reverting { observed_p95 } => {
                if !self.dwell_elapsed(at) {
                    return Verdict::Hold(HoldReason::Reverting);
                }
                let target = self.last_good.unwrap_or(current);
                self.stats.rollbacks += 1;
                self.phase = Phase::Steady;
                warn!(
                    tick,
                    from = current,
                    to = target,
                    observed_p95_us = observed_p95,
                    "rolling back to last known-good value"
                );
                return self.apply(target, Some(current), tick, at, ApplyCause::Rollback);
            }
            Phase::Observing { .. } => return Verdict::Hold(HoldReason::Observing),
            Phase::Steady => {}
        }

        let delta = value.abs_diff(current);
        if delta == 0 {
            return Verdict::Hold(HoldReason::Unchanged);
        }
        if delta < self.deadband {
            self.stats.held_deadband += 1;
            return Verdict::Hold(HoldReason::Deadband);
        }
        if !self.dwell_elapsed(at) {
            self.stats.held_dwell += 1;
            return Verdict::Hold(HoldReason::Dwell);
        }

        if let Some(baseline_p95) = self.baseline_p95() {
            self.phase = Phase::Observing {
                baseline_p95,
                sum_p95: 0.0,
                ticks: 0,
            };
        } else {
            // Nothing to compare against; accept the change outright.
            self.last_good = Some(value);
        }
        debug!(tick, from = current, to = value, "applying change");
        self.apply(value, Some(current), tick, at, ApplyCause::Change)
    }

    fn apply(
        &mut self,
        value: KnobValue,
        previous: Option<KnobValue>,
        tick: u64,
        at: SimTime,
        cause: ApplyCause,
    ) -> Verdict {
        let applied = AppliedDecision {
            value,
            previous,
            tick,
            at,
            cause,
        };
        self.applied = Some(value);
        self.last_change_at = Some(at);
        self.stats.applied += 1;
        if applied.is_flip() {
            self.stats.flips += 1;
        }
        Verdict::Apply(applied)
    }

    fn dwell_elapsed(&self, at: SimTime) -> bool {
        self.last_change_at
            .is_none_or(|last| at.saturating_since(last) >= self.dwell)
    }

    fn baseline_p95(&self) -> Option<f64> {
        if self.recent_p95.is_empty() {
            return None;
        }
        let mean = self.recent_p95.iter().sum::<f64>() / self.recent_p95.len() as f64;
        (mean > 0.0).then_some(mean)
    }

    /// Feed this tick's p95 into the rolling window and any pending judgment.
    fn observe(&mut self, features: &FeatureVector) {
        let p95 = features.get(Feature::TaskTimeP95Us);
        if !p95.is_finite() {
            return;
        }

        if self.recent_p95.len() == self.window_ticks as usize {
            self.recent_p95.pop_front();
        }
        self.recent_p95.push_back(p95);

        let Phase::Observing {
            baseline_p95,
            sum_p95,
            ticks,
        } = &mut self.phase
        else {
            return;
        };
        *sum_p95 += p95;
        *ticks += 1;
        if *ticks < self.window_ticks {
            return;
        }

        let baseline = *baseline_p95;
        let observed = *sum_p95 / f64::from(*ticks);
        if observed > baseline * (1.0 + self.tolerance) {
            warn!(
                tick = features.tick(),
                baseline_p95_us = baseline,
                observed_p95_us = observed,
                tolerance = self.tolerance,
                "change regressed p95"
            );
            self.phase = Phase::Reverting {
                observed_p95: observed,
            };
        } else {
            info!(
                tick = features.tick(),
                value = self.applied,
                baseline_p95_us = baseline,
                observed_p95_us = observed,
                "change accepted"
            );
            self.last_good = self.applied;
            self.phase = Phase::Steady;
        }
    }
}

#[cfg(test)]
mod tests {
    use reflex_core::FEATURE_COUNT;

    use super::*;

    fn config(dwell_ms: u64) -> GovernorConfig {
        GovernorConfig {
            dwell_ms,
            deadband: 2,
            rollback_tolerance: 0.5,
            rollback_window_ticks: 2,
        }
    }

    /// Tick `n` lands at n × 500 ms.
    fn sample(tick: u64, p95: f64) -> FeatureVector {
        let at = SimTime::ZERO + SimDuration::from_millis(500 * tick);
        FeatureVector::new(tick, at, [0.0; FEATURE_COUNT]).with(Feature::TaskTimeP95Us, p95)
    }

    fn propose(gov: &mut SafetyGovernor, tick: u64, value: KnobValue, p95: f64) -> Verdict {
        let fv = sample(tick, p95);
        let decision = Decision {
            value,
            tick,
            at: fv.at(),
        };
        gov.review(decision, &fv).verdict
    }

    fn applied_value(verdict: Verdict) -> Option<(KnobValue, ApplyCause)> {
        match verdict {
            Verdict::Apply(a) => Some((a.value, a.cause)),
            Verdict::Hold(_) => None,
        }
    }

    #[test]
    fn first_decision_is_applied_without_checks() {
        let mut gov = SafetyGovernor::new(&config(10_000), KnobRange::default());
        let verdict = propose(&mut gov, 1, 2, 100.0);
        assert_eq!(applied_value(verdict), Some((2, ApplyCause::Initial)));
        assert_eq!(gov.stats().flips, 0);
        assert_eq!(gov.applied(), Some(2));
    }

    #[test]
    fn deadband_and_unchanged_are_held() {
        let mut gov = SafetyGovernor::new(&config(0), KnobRange::default());
        propose(&mut gov, 1, 8, 100.0);
        assert_eq!(propose(&mut gov, 2, 8, 100.0), Verdict::Hold(HoldReason::Unchanged));
        assert_eq!(propose(&mut gov, 3, 9, 100.0), Verdict::Hold(HoldReason::Deadband));
        assert_eq!(gov.stats().held_deadband, 1);
    }

    #[test]
    fn dwell_boundary_is_inclusive() {
        // 1 s dwell, ticks every 500 ms.
        let mut gov = SafetyGovernor::new(&config(1_000), KnobRange::default());
        propose(&mut gov, 1, 8, 0.0);
        assert_eq!(propose(&mut gov, 2, 16, 0.0), Verdict::Hold(HoldReason::Dwell));
        // exactly 1 s after the initial application
        assert_eq!(
            applied_value(propose(&mut gov, 3, 16, 0.0)),
            Some((16, ApplyCause::Change))
        );
        assert_eq!(gov.stats().flips, 1);
        assert_eq!(gov.stats().held_dwell, 1);
    }

    #[test]
    fn out_of_range_proposals_are_clamped() {
        let range = KnobRange::new(2, 16).unwrap();
        let mut gov = SafetyGovernor::new(&config(0), range);
        let fv = sample(1, 0.0);
        let outcome = gov.review(
            Decision {
                value: 40,
                tick: 1,
                at: fv.at(),
            },
            &fv,
        );
        assert_eq!(outcome.clamped_to, Some(16));
        assert_eq!(outcome.applied().map(|a| a.value), Some(16));
        assert_eq!(gov.stats().clamped, 1);
    }

    #[test]
    fn regression_rolls_back() {
        let mut gov = SafetyGovernor::new(&config(1_000), KnobRange::default());
        propose(&mut gov, 1, 8, 1_000.0);
        propose(&mut gov, 2, 8, 1_000.0);
        assert_eq!(
            applied_value(propose(&mut gov, 3, 2, 1_000.0)),
            Some((2, ApplyCause::Change))
        );
        assert_eq!(propose(&mut gov, 4, 2, 3_000.0), Verdict::Hold(HoldReason::Observing));
        // second post-change tick confirms the regression; dwell already satisfied
        assert_eq!(
            applied_value(propose(&mut gov, 5, 30, 3_000.0)),
            Some((8, ApplyCause::Rollback))
        );

        let stats = gov.stats();
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(stats.flips, 2);
        assert_eq!(gov.applied(), Some(8));
        assert_eq!(gov.last_good(), Some(8));
    }

    #[test]
    fn rollback_waits_for_dwell_and_ignores_proposals() {
        let mut gov = SafetyGovernor::new(&config(2_000), KnobRange::default());
        propose(&mut gov, 1, 8, 1_000.0);
        for tick in 2..=4 {
            propose(&mut gov, tick, 8, 1_000.0);
        }
        assert_eq!(
            applied_value(propose(&mut gov, 5, 2, 1_000.0)),
            Some((2, ApplyCause::Change))
        );
        propose(&mut gov, 6, 2, 3_000.0);
        assert_eq!(propose(&mut gov, 7, 2, 3_000.0), Verdict::Hold(HoldReason::Reverting));
        assert!(gov.is_reverting());
        assert_eq!(propose(&mut gov, 8, 30, 3_000.0), Verdict::Hold(HoldReason::Reverting));
        assert_eq!(
            applied_value(propose(&mut gov, 9, 30, 3_000.0)),
            Some((8, ApplyCause::Rollback))
        );
        assert!(!gov.is_reverting());
        assert_eq!(gov.stats().rollbacks, 1);
    }

    #[test]
    fn accepted_change_becomes_last_good() {
        let mut gov = SafetyGovernor::new(&config(1_000), KnobRange::default());
        propose(&mut gov, 1, 2, 2_000.0);
        propose(&mut gov, 2, 2, 2_000.0);
        propose(&mut gov, 3, 8, 2_000.0);
        assert_eq!(gov.last_good(), Some(2));
        propose(&mut gov, 4, 8, 500.0);
        propose(&mut gov, 5, 8, 500.0);
        assert_eq!(gov.last_good(), Some(8));
        assert!(!gov.is_reverting());
        assert_eq!(gov.stats().rollbacks, 0);
    }

    #[test]
    fn flips_respect_dwell_under_constant_pressure() {
        // Alternate 2 / 32 on every 500 ms tick for 60 s with a 10 s dwell.
        let mut gov = SafetyGovernor::new(&config(10_000), KnobRange::default());
        for tick in 1..=120u64 {
            let value = if tick % 2 == 0 { 2 } else { 32 };
            propose(&mut gov, tick, value, 0.0);
        }
        assert!(gov.stats().flips <= 6, "flips = {}", gov.stats().flips);
        assert!(gov.stats().flips >= 5);
    }
}
