//! Prometheus text exposition format.
//!
//! Renders run summaries for scraping or for dropping next to the JSON
//! summary as a `.prom` file.

use crate::summary::RunSummary;

/// Render summaries into Prometheus text format with `engine`,
/// `profile` and `seed` labels.
pub fn render_prometheus(summaries: &[RunSummary]) -> String {
    let mut out = String::new();

    gauge(
        &mut out,
        "reflex_latency_p50_us",
        "P50 task latency in microseconds.",
        summaries,
        |s| format!("{:.3}", s.latency_p50_us),
    );
    gauge(
        &mut out,
        "reflex_latency_p95_us",
        "P95 task latency in microseconds.",
        summaries,
        |s| format!("{:.3}", s.latency_p95_us),
    );
    gauge(
        &mut out,
        "reflex_latency_p99_us",
        "P99 task latency in microseconds.",
        summaries,
        |s| format!("{:.3}", s.latency_p99_us),
    );
    gauge(
        &mut out,
        "reflex_throughput_per_second",
        "Completed tasks per simulated second.",
        summaries,
        |s| format!("{:.3}", s.throughput_per_sec),
    );
    gauge(
        &mut out,
        "reflex_oscillation_rate_hz",
        "Applied decision changes per simulated second.",
        summaries,
        |s| format!("{:.4}", s.oscillation_rate_hz),
    );
    gauge(
        &mut out,
        "reflex_workers",
        "Worker count at the end of the run.",
        summaries,
        |s| s.final_workers.to_string(),
    );
    gauge(
        &mut out,
        "reflex_run_degraded",
        "1 if any recoverable fault occurred during the run.",
        summaries,
        |s| if s.is_clean() { "0" } else { "1" }.to_string(),
    );

    counter(&mut out, "reflex_tasks_completed_total", "Tasks completed.", summaries, |s| {
        s.completions
    });
    counter(&mut out, "reflex_proposals_total", "Engine proposals reviewed.", summaries, |s| {
        s.proposals
    });
    counter(&mut out, "reflex_flips_total", "Applied decision changes.", summaries, |s| {
        s.flips
    });
    counter(&mut out, "reflex_rollbacks_total", "Governor rollbacks.", summaries, |s| {
        s.rollbacks
    });
    counter(
        &mut out,
        "reflex_anomalies_total",
        "Feature vectors rejected by the engine.",
        summaries,
        |s| s.anomalies,
    );
    counter(
        &mut out,
        "reflex_clamped_total",
        "Proposals clamped into the knob range.",
        summaries,
        |s| s.clamped,
    );

    out
}

fn labels(s: &RunSummary) -> String {
    format!(
        "engine=\"{}\",profile=\"{}\",seed=\"{}\"",
        s.info.engine, s.info.profile, s.info.seed
    )
}

fn gauge(
    out: &mut String,
    name: &str,
    help: &str,
    summaries: &[RunSummary],
    value: impl Fn(&RunSummary) -> String,
) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    for s in summaries {
        out.push_str(&format!("{name}{{{}}} {}\n", labels(s), value(s)));
    }
}

fn counter(
    out: &mut String,
    name: &str,
    help: &str,
    summaries: &[RunSummary],
    value: impl Fn(&RunSummary) -> u64,
) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} counter\n"));
    for s in summaries {
        out.push_str(&format!("{name}{{{}}} {}\n", labels(s), value(s)));
    }
}
