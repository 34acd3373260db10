use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::run::RunArgs;

#[derive(Parser)]
#[command(
    name = "reflex",
    about = "reflexgrid — learned worker-pool control, simulated",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulator with the constant-policy engine.
    Baseline {
        #[command(flatten)]
        args: RunArgs,
        /// Constant worker count (default: engine.baseline_workers).
        #[arg(long)]
        workers: Option<u32>,
    },
    /// Run the simulator with the engine named in the config.
    ///
    /// Passing --model and --normalizer selects the reflex engine.
    Run {
        #[command(flatten)]
        args: RunArgs,
        /// Model artifact (.reflex).
        #[arg(long, requires = "normalizer")]
        model: Option<PathBuf>,
        /// Normalization table (JSON).
        #[arg(long, requires = "model")]
        normalizer: Option<PathBuf>,
        /// Drive p95 toward this setpoint with the PID engine instead.
        #[arg(long, conflicts_with = "model")]
        pid_target_us: Option<f64>,
    },
    /// Run the workload at a series of fixed pool sizes.
    Sweep {
        #[command(flatten)]
        args: RunArgs,
        /// Pool sizes to try.
        #[arg(long, value_delimiter = ',', default_values_t = reflex_sim::DEFAULT_SWEEP)]
        sizes: Vec<u32>,
    },
    /// Inspect or generate model artifacts.
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Manage reflex.toml run files.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Print header, tree shape, digest and metadata of an artifact.
    Inspect {
        path: PathBuf,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Write a model that always proposes the same value.
    Constant {
        /// The value every inference returns.
        #[arg(long)]
        value: f32,
        /// Where to write the artifact.
        #[arg(short, long)]
        output: PathBuf,
        /// Also write a matching normalization table here.
        #[arg(long)]
        normalizer: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a reflex.toml with every default spelled out.
    Init {
        #[arg(short, long, default_value = "reflex.toml")]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("reflex=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    match cli.command {
        Commands::Baseline { args, workers } => commands::run::baseline(&args, workers),
        Commands::Run {
            args,
            model,
            normalizer,
            pid_target_us,
        } => commands::run::run(&args, model, normalizer, pid_target_us),
        Commands::Sweep { args, sizes } => commands::sweep::sweep(&args, &sizes),
        Commands::Model { action } => match action {
            ModelAction::Inspect { path, format } => commands::model::inspect(&path, &format),
            ModelAction::Constant {
                value,
                output,
                normalizer,
            } => commands::model::constant(value, &output, normalizer.as_deref()),
        },
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => commands::config::init(&path, force),
        },
    }
}
