//! Seeded synthetic workload.
//!
//! The generator is an infinite stream of `(inter-arrival delay, service
//! time)` pairs. It keeps its own notion of elapsed virtual time (the sum
//! of the delays it has produced) so that phase boundaries are a pure
//! function of the seed and the configuration, independent of how the
//! pool behaves.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reflex_core::config::{ServiceTimeConfig, WorkloadConfig, WorkloadProfile};
use reflex_core::SimDuration;

/// One generated arrival, relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalSpec {
    pub delay: SimDuration,
    pub service: SimDuration,
}

/// Adversarial per-phase multipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Jitter {
    phase: u64,
    rate: f64,
    service: f64,
}

#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    config: WorkloadConfig,
    seed: u64,
    rng: ChaCha8Rng,
    elapsed: SimDuration,
    jitter: Option<Jitter>,
}

impl WorkloadGenerator {
    pub fn new(config: WorkloadConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            elapsed: SimDuration::ZERO,
            jitter: None,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn profile(&self) -> WorkloadProfile {
        self.config.profile
    }

    /// Virtual time of the most recent arrival.
    pub fn elapsed(&self) -> SimDuration {
        self.elapsed
    }

    /// Rewind to the start of the stream. The replayed sequence is
    /// identical to the first one.
    pub fn restart(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.elapsed = SimDuration::ZERO;
        self.jitter = None;
    }

    /// Arrival rate (per second) in force at `elapsed`, plus the service
    /// distribution to sample from.
    fn regime(&mut self) -> (f64, ServiceTimeConfig) {
        let w = &self.config;
        match w.profile {
            WorkloadProfile::Steady => (w.rate_per_sec, w.service),
            WorkloadProfile::Bursty => {
                let period = SimDuration::from_millis(w.period_ms).as_nanos().max(1);
                let high = self.elapsed.as_nanos() % (2 * period) < period;
                let rate = if high {
                    w.high_rate_per_sec
                } else {
                    w.low_rate_per_sec
                };
                (rate, w.service)
            }
            WorkloadProfile::Adversarial => {
                let phase_ns = SimDuration::from_millis(w.phase_ms).as_nanos().max(1);
                let phase = self.elapsed.as_nanos() / phase_ns;
                let jitter = match self.jitter {
                    Some(j) if j.phase == phase => j,
                    _ => {
                        let j = Jitter {
                            phase,
                            rate: draw_multiplier(&mut self.rng, w.rate_jitter),
                            service: draw_multiplier(&mut self.rng, w.service_jitter),
                        };
                        self.jitter = Some(j);
                        j
                    }
                };
                (
                    w.rate_per_sec * jitter.rate,
                    w.service.scaled(jitter.service),
                )
            }
        }
    }

    pub fn next_arrival(&mut self) -> ArrivalSpec {
        let (rate, service) = self.regime();

        // 1 - u lies in (0, 1], so the logarithm stays finite.
        let u: f64 = self.rng.random();
        let delay = SimDuration::from_secs_f64(-(1.0 - u).ln() / rate);

        let service = SimDuration::from_micros_f64(sample_service(&mut self.rng, service));
        self.elapsed = self.elapsed + delay;
        ArrivalSpec { delay, service }
    }
}

impl Iterator for WorkloadGenerator {
    type Item = ArrivalSpec;

    fn next(&mut self) -> Option<ArrivalSpec> {
        Some(self.next_arrival())
    }
}

/// Uniform multiplier in `[1 - j, 1 + j]`. No draw when `j == 0`.
fn draw_multiplier(rng: &mut ChaCha8Rng, jitter: f64) -> f64 {
    if jitter == 0.0 {
        1.0
    } else {
        rng.random_range(1.0 - jitter..=1.0 + jitter)
    }
}

/// Service time in microseconds, never negative.
fn sample_service(rng: &mut ChaCha8Rng, service: ServiceTimeConfig) -> f64 {
    match service {
        ServiceTimeConfig::Fixed { mean_us } => mean_us,
        ServiceTimeConfig::Exponential { mean_us } => {
            let u: f64 = rng.random();
            -mean_us * (1.0 - u).ln()
        }
        ServiceTimeConfig::Uniform {
            mean_us,
            variance_us2,
        } => {
            // A uniform on [m - h, m + h] has variance h²/3.
            let half_width = (3.0 * variance_us2).sqrt();
            let u: f64 = rng.random();
            (mean_us + half_width * (2.0 * u - 1.0)).max(0.0)
        }
    }
}
