//! `reflex sweep` — the same workload at several fixed pool sizes.

use anyhow::{Context, Result, bail};
use reflex_metrics::RunSummary;
use tracing::info;

use super::run::{RunArgs, write_prometheus};

pub fn sweep(args: &RunArgs, sizes: &[u32]) -> Result<()> {
    if sizes.is_empty() {
        bail!("--sizes must name at least one pool size");
    }
    let config = args.load_config()?;
    let report = reflex_sim::sweep(&config, sizes).context("sweep failed")?;

    println!(
        "{:>8}  {:>12}  {:>12}  {:>12}  {:>12}",
        "workers", "p50_us", "p95_us", "p99_us", "tasks/s"
    );
    for point in &report.points {
        let s = &point.summary;
        println!(
            "{:>8}  {:>12.1}  {:>12.1}  {:>12.1}  {:>12.1}",
            point.workers,
            s.latency_p50_us,
            s.latency_p95_us,
            s.latency_p99_us,
            s.throughput_per_sec
        );
    }
    if let Some(best) = report.best() {
        println!("best by p95: {} workers", best.workers);
        info!(workers = best.workers, p95_us = best.summary.latency_p95_us, "sweep finished");
    }

    let summaries: Vec<RunSummary> = report.points.iter().map(|p| p.summary.clone()).collect();
    if let Some(path) = &args.summary {
        let json = serde_json::to_string_pretty(&summaries)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    }
    if let Some(path) = &args.prometheus {
        write_prometheus(path, &summaries)?;
    }
    Ok(())
}
