//! Game-simulation CLI: loads a configuration file (and the trained
//! policy it names), overrides starting positions from the command
//! line, and plays one episode to completion, rendering it as ASCII
//! frames either manually (press Enter) or on a timer.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use grid_agent::config::GameConfig;
use grid_agent::geometry::Vec2D;
use grid_agent::policy::Policy;
use grid_agent::simulate::{GameManager, LearnedPolicy, MovingEntity, UniformIntent};
use grid_agent::state::State;
use grid_agent::view::AsciiView;
use grid_agent::vss::ValidStateSpace;

/// Ticks run until a terminal outcome or this many ticks, whichever
/// comes first — the spec places no bound on episode length, so this
/// guards the manual/auto playback loops against a policy that never
/// reaches either actor.
const MAX_STEPS: usize = 10_000;

#[derive(Parser, Debug)]
#[command(about = "Play one episode of the gridworld game against a trained policy")]
struct Args {
    /// Path to the configuration file.
    configs: PathBuf,

    #[arg(long)]
    policy: Option<String>,

    #[arg(long, value_parser = parse_point)]
    agent_start: Option<Vec2D>,

    #[arg(long, value_parser = parse_point)]
    target_start: Option<Vec2D>,

    #[arg(long, value_parser = parse_point)]
    opponent_start: Option<Vec2D>,

    /// Seconds to sleep between frames in auto-play mode.
    #[arg(long, default_value_t = 0.5)]
    time_step: f64,

    /// Step through frames by pressing Enter instead of auto-playing.
    #[arg(long)]
    manual: bool,
}

/// Parse the `(x,y)` format §6 specifies for start-position overrides.
fn parse_point(raw: &str) -> Result<Vec2D, String> {
    let trimmed = raw.trim().trim_start_matches('(').trim_end_matches(')');
    let (x_str, y_str) = trimmed
        .split_once(',')
        .ok_or_else(|| format!("expected '(x,y)', got '{raw}'"))?;
    let x: i32 = x_str.trim().parse().map_err(|_| format!("bad x in '{raw}'"))?;
    let y: i32 = y_str.trim().parse().map_err(|_| format!("bad y in '{raw}'"))?;
    Ok(Vec2D::new(x, y))
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
    let mut config = GameConfig::from_file(&args.configs)?;
    if let Some(policy_path) = args.policy {
        config.set_policy_path(policy_path);
    }
    if let Some(pos) = args.agent_start {
        config.agent_start.set_and_freeze(pos);
    }
    if let Some(pos) = args.target_start {
        config.target_start.set_and_freeze(pos);
    }
    if let Some(pos) = args.opponent_start {
        config.opponent_start.set_and_freeze(pos);
    }
    config.validate()?;

    let vss = ValidStateSpace::build(config.map_size(), config.obstacles());

    // A missing policy file is a documented warning, not an error: the
    // agent falls back to acting uniformly at random (§7).
    let policy = match Policy::read_from_file(config.policy_path(), vss.space_size()) {
        Ok(policy) => Some(policy),
        Err(err) => {
            tracing::warn!(
                path = config.policy_path(),
                error = %err,
                "no usable policy file; the agent will act uniformly at random"
            );
            None
        }
    };

    let agent_density = config.agent_transition_density()?;
    let target_density = config.target_transition_density()?;
    let opponent_density = config.opponent_transition_density()?;

    let agent = MovingEntity::new(
        LearnedPolicy {
            vss: &vss,
            policy: policy.as_ref(),
        },
        &agent_density,
    );
    let target = MovingEntity::new(UniformIntent, &target_density);
    let opponent = MovingEntity::new(UniformIntent, &opponent_density);

    let manager = GameManager {
        vss: &vss,
        max_steps: MAX_STEPS,
    };
    let start = State::new(
        *config.agent_start.get(),
        *config.opponent_start.get(),
        *config.target_start.get(),
    );

    let mut rng = rand::rng();
    let mut ticks = Vec::new();
    let result = manager.run(start, &agent, &opponent, &target, &mut rng, |data| ticks.push(*data));

    let view = AsciiView::new(config.map_size_struct(), config.obstacles().to_vec());
    if args.manual {
        view.start_manual(ticks)?;
    } else {
        view.start_auto(ticks, Duration::from_secs_f64(args.time_step.max(0.0)))?;
    }

    println!("result: {result:?}");
    Ok(())
}
