//! `reflex baseline` / `reflex run` — one simulated run.
//!
//! Loads `reflex.toml` (or the defaults), applies flag overrides, runs the
//! harness and persists the summary and telemetry. The summary JSON is
//! always printed to stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use reflex_core::RunConfig;
use reflex_core::config::{EngineKind, WorkloadProfile};
use reflex_metrics::{RunSummary, render_prometheus};
use reflex_sim::{RunReport, Simulation, telemetry_log};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Steady,
    Bursty,
    Adversarial,
}

impl From<ProfileArg> for WorkloadProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Steady => WorkloadProfile::Steady,
            ProfileArg::Bursty => WorkloadProfile::Bursty,
            ProfileArg::Adversarial => WorkloadProfile::Adversarial,
        }
    }
}

/// Flags shared by every command that runs the simulator.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Run file (default: built-in defaults).
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Workload profile.
    #[arg(long, value_enum)]
    pub profile: Option<ProfileArg>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Simulated seconds of arrivals and decision ticks.
    #[arg(long)]
    pub horizon_secs: Option<f64>,
    /// Stop admitting arrivals after this many tasks.
    #[arg(long)]
    pub max_tasks: Option<u64>,
    #[arg(long)]
    pub initial_workers: Option<u32>,
    /// Minimum time between applied changes, in milliseconds.
    #[arg(long)]
    pub dwell_ms: Option<u64>,
    /// Write the summary JSON here as well as to stdout.
    #[arg(long)]
    pub summary: Option<PathBuf>,
    /// Write the summary in Prometheus text format here.
    #[arg(long)]
    pub prometheus: Option<PathBuf>,
    /// Write one telemetry row per tick (CSV) here.
    #[arg(long)]
    pub telemetry: Option<PathBuf>,
}

impl RunArgs {
    /// The run file plus flag overrides. Not yet validated.
    pub fn load_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(profile) = self.profile {
            config.workload.profile = profile.into();
        }
        if let Some(seed) = self.seed {
            config.run.seed = seed;
        }
        if let Some(horizon) = self.horizon_secs {
            config.run.horizon_secs = horizon;
        }
        if let Some(max_tasks) = self.max_tasks {
            config.run.max_tasks = Some(max_tasks);
        }
        if let Some(workers) = self.initial_workers {
            config.run.initial_workers = workers;
        }
        if let Some(dwell) = self.dwell_ms {
            config.governor.dwell_ms = dwell;
        }
        Ok(config)
    }
}

pub fn baseline(args: &RunArgs, workers: Option<u32>) -> Result<()> {
    let mut config = args.load_config()?;
    config.engine.kind = EngineKind::Baseline;
    if let Some(workers) = workers {
        config.engine.baseline_workers = workers;
    }
    execute(config, args)
}

pub fn run(
    args: &RunArgs,
    model: Option<PathBuf>,
    normalizer: Option<PathBuf>,
    pid_target_us: Option<f64>,
) -> Result<()> {
    let mut config = args.load_config()?;
    if model.is_some() {
        config.engine.kind = EngineKind::Reflex;
        config.engine.model = model;
        config.engine.normalizer = normalizer;
    } else if let Some(target) = pid_target_us {
        config.engine.kind = EngineKind::Pid;
        config.engine.target_p95_us = target;
    }
    execute(config, args)
}

fn execute(config: RunConfig, args: &RunArgs) -> Result<()> {
    let report = simulate(config)?;
    println!("{}", report.summary.to_json_pretty()?);
    persist(&report, args)
}

pub fn simulate(config: RunConfig) -> Result<RunReport> {
    let engine = config.engine.kind.label();
    let simulation = Simulation::new(config)
        .with_context(|| format!("failed to set up the {engine} run"))?;
    simulation.run().context("simulation failed")
}

pub fn persist(report: &RunReport, args: &RunArgs) -> Result<()> {
    if let Some(path) = &args.summary {
        report
            .summary
            .write_json(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }
    if let Some(path) = &args.prometheus {
        write_prometheus(path, std::slice::from_ref(&report.summary))?;
    }
    if let Some(path) = &args.telemetry {
        telemetry_log::save_csv(path, &report.telemetry)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), rows = report.telemetry.len(), "telemetry written");
    }
    Ok(())
}

pub fn write_prometheus(path: &Path, summaries: &[RunSummary]) -> Result<()> {
    std::fs::write(path, render_prometheus(summaries))
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "prometheus metrics written");
    Ok(())
}
