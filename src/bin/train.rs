//! Training CLI: loads a configuration file, layers command-line
//! overrides on top (each freezes the field it touches so the file can
//! no longer move it), and runs policy iteration to convergence.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use grid_agent::config::TrainConfig;
use grid_agent::train::TrainManager;

#[derive(Parser, Debug)]
#[command(about = "Train a gridworld policy by policy iteration")]
struct Args {
    /// Path to the configuration file.
    configs: PathBuf,

    #[arg(long)]
    policy: Option<String>,

    #[arg(long)]
    processes: Option<i64>,

    #[arg(long)]
    use_float: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    max_iter: Option<i64>,

    #[arg(long)]
    value_function_tolerance: Option<f64>,

    #[arg(long)]
    changed_actions_tolerance: Option<i64>,

    #[arg(long)]
    changed_actions_percentage_tolerance: Option<f64>,

    /// Optional NDJSON stats log, one `TrainData` record per iteration
    /// (consumed by `grid_agent_view_traindata`).
    #[arg(long)]
    stats: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), grid_agent::Error> {
    let mut config = TrainConfig::from_file(&args.configs)?;

    if let Some(policy) = args.policy {
        config.set_policy_path(policy);
    }
    if let Some(processes) = args.processes {
        config.num_workers.set_and_freeze(processes);
    }
    if args.use_float {
        config.use_float.set_and_freeze(true);
    }
    if args.dry_run {
        config.is_dry_run.set_and_freeze(true);
    }
    if let Some(max_iter) = args.max_iter {
        config.max_iterations.set_and_freeze(max_iter);
    }
    if let Some(tolerance) = args.value_function_tolerance {
        config.value_tolerance.set_and_freeze(tolerance);
    }
    if let Some(tolerance) = args.changed_actions_tolerance {
        config.action_tolerance.set_and_freeze(tolerance);
    }
    if let Some(tolerance) = args.changed_actions_percentage_tolerance {
        config.action_percentage_tolerance.set_and_freeze(tolerance);
    }

    config.validate()?;

    let mut manager = TrainManager::new(&config)?;
    manager.run(args.stats.as_deref(), |record| {
        tracing::info!(
            iteration = record.iteration_number,
            mean_value = record.mean_value,
            max_value_diff = record.max_value_diff,
            changed_actions = record.changed_actions_number,
            changed_actions_percentage = record.changed_actions_percentage,
            "policy iteration progress"
        );
    })?;

    Ok(())
}
