//! Closed-form M/M/c reference values.
//!
//! Used to check the simulator against queueing theory: with Poisson
//! arrivals at rate `λ`, exponential service at rate `μ` per worker and
//! `c` workers, the sojourn time distribution is known exactly.

/// Erlang-C probability that an arriving task has to wait.
/// `None` when the system is unstable (`λ >= cμ`).
pub fn erlang_c(workers: u32, arrival_rate: f64, service_rate: f64) -> Option<f64> {
    if workers == 0 || arrival_rate <= 0.0 || service_rate <= 0.0 {
        return None;
    }
    let c = f64::from(workers);
    let offered = arrival_rate / service_rate;
    let rho = offered / c;
    if rho >= 1.0 {
        return None;
    }

    // Erlang-B by recursion, then convert to Erlang-C.
    let mut b = 1.0;
    for k in 1..=workers {
        b = offered * b / (f64::from(k) + offered * b);
    }
    Some(b / (1.0 - rho * (1.0 - b)))
}

/// `P(T > t)` for the sojourn time `T` of an M/M/c queue, `t` in seconds.
pub fn mmc_sojourn_survival(
    workers: u32,
    arrival_rate: f64,
    service_rate: f64,
    t: f64,
) -> Option<f64> {
    let wait = erlang_c(workers, arrival_rate, service_rate)?;
    let mu = service_rate;
    let theta = f64::from(workers) * mu - arrival_rate;

    let service_tail = (-mu * t).exp();
    let queued_tail = if (theta - mu).abs() < 1e-12 * mu {
        (1.0 + mu * t) * (-mu * t).exp()
    } else {
        (theta * (-mu * t).exp() - mu * (-theta * t).exp()) / (theta - mu)
    };
    Some((1.0 - wait) * service_tail + wait * queued_tail)
}

/// Sojourn-time quantile `q` in seconds, found by bisection on the
/// survival function.
pub fn mmc_sojourn_quantile(
    workers: u32,
    arrival_rate: f64,
    service_rate: f64,
    q: f64,
) -> Option<f64> {
    if !(0.0..1.0).contains(&q) {
        return None;
    }
    let target = 1.0 - q;
    let survival = |t: f64| mmc_sojourn_survival(workers, arrival_rate, service_rate, t);

    let mut lo = 0.0;
    let mut hi = 1.0 / service_rate;
    while survival(hi)? > target {
        hi *= 2.0;
        if !hi.is_finite() {
            return None;
        }
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if survival(mid)? > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}

/// Same as [`mmc_sojourn_quantile`], with rates per second in and
/// microseconds out.
pub fn mmc_sojourn_quantile_us(
    workers: u32,
    arrival_rate: f64,
    mean_service_us: f64,
    q: f64,
) -> Option<f64> {
    let service_rate = 1e6 / mean_service_us;
    mmc_sojourn_quantile(workers, arrival_rate, service_rate, q).map(|secs| secs * 1e6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_server_reduces_to_mm1() {
        // M/M/1: waiting probability equals utilisation, sojourn is Exp(μ - λ).
        let c = erlang_c(1, 0.5, 1.0).unwrap();
        assert!((c - 0.5).abs() < 1e-12);

        let p95 = mmc_sojourn_quantile(1, 0.5, 1.0, 0.95).unwrap();
        let exact = -(0.05f64).ln() / 0.5;
        assert!((p95 - exact).abs() < 1e-9, "p95={p95} exact={exact}");
    }

    #[test]
    fn erlang_c_known_value() {
        // 2 servers, offered load 1 Erlang: C = 1/3.
        let c = erlang_c(2, 1.0, 1.0).unwrap();
        assert!((c - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn unstable_systems_have_no_answer() {
        assert_eq!(erlang_c(2, 2.0, 1.0), None);
        assert_eq!(mmc_sojourn_quantile(1, 3.0, 1.0, 0.95), None);
        assert_eq!(erlang_c(0, 1.0, 1.0), None);
    }

    #[test]
    fn theta_equal_to_mu_uses_the_limit() {
        // c = 2, μ = 1, λ = 1 gives θ = cμ - λ = μ.
        let s = mmc_sojourn_survival(2, 1.0, 1.0, 0.7).unwrap();
        let near = mmc_sojourn_survival(2, 1.0 + 1e-7, 1.0, 0.7).unwrap();
        assert!((s - near).abs() < 1e-5);
    }

    #[test]
    fn light_load_p95_is_service_p95() {
        let p95 = mmc_sojourn_quantile_us(8, 100.0, 500.0, 0.95).unwrap();
        let service_only = 500.0 * 20f64.ln();
        assert!((p95 - service_only).abs() / service_only < 0.001, "p95={p95}");
    }
}
