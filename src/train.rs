//! Training orchestration: builds the valid state space and the shared
//! value/policy buffers from a [`crate::config::TrainConfig`], drives
//! sequential or parallel policy iteration to convergence, and reports
//! one [`TrainData`] record per iteration to a caller-supplied callback
//! (`entities/train_manager.py::TrainManager`).

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{RewardKind, TrainConfig};
use crate::density::DiscreteTransitionDensity;
use crate::error::Error;
use crate::parallel;
use crate::policy::Policy;
use crate::reward::{DenseReward, RewardFunction, SparseReward};
use crate::sequential::{self, IterationConfig, IterationStats};
use crate::value::ValueFunctions;
use crate::vss::ValidStateSpace;

/// The minimum number of valid states policy iteration can sensibly run
/// over: with fewer than three states there is no meaningful transition
/// structure (an agent, a target, nowhere else to be), so construction
/// fails fast rather than iterating over a degenerate space.
const MIN_SPACE_SIZE: usize = 3;

/// One iteration's worth of progress, serializable as a line of the
/// optional NDJSON stats log and handed to the per-iteration callback.
/// The very first record (iteration 0, before any sweep has run) is
/// seeded so that the stop criteria never falsely trigger on an empty
/// history: `changed_actions` starts at the full space size (100%) and
/// `max_value_diff` starts at `+infinity`, guaranteeing at least one
/// real iteration always runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainData {
    pub iteration_number: usize,
    pub mean_value: f64,
    pub max_value_diff: f64,
    pub changed_actions_number: usize,
    pub changed_actions_percentage: f64,
}

impl TrainData {
    fn seed(space_size: usize) -> Self {
        TrainData {
            iteration_number: 0,
            mean_value: 0.0,
            max_value_diff: f64::INFINITY,
            changed_actions_number: space_size,
            changed_actions_percentage: 1.0,
        }
    }

    fn from_stats(iteration_number: usize, stats: IterationStats, space_size: usize) -> Self {
        TrainData {
            iteration_number,
            mean_value: stats.mean_value,
            max_value_diff: stats.max_value_diff,
            changed_actions_number: stats.changed_actions,
            changed_actions_percentage: stats.changed_actions as f64 / space_size.max(1) as f64,
        }
    }
}

/// Drives policy iteration for one training session: owns the valid
/// state space and the shared value/policy buffers, and exposes a
/// single entry point, [`TrainManager::run`], that iterates to
/// convergence while fanning out progress to a callback and, if
/// configured, to a stats log on disk.
pub struct TrainManager {
    vss: ValidStateSpace,
    values: ValueFunctions,
    policy: Policy,
    density: DiscreteTransitionDensity,
    reward_kind: RewardKind,
    iteration_config: IterationConfig,
    num_workers: usize,
    policy_path: String,
    is_dry_run: bool,
}

impl TrainManager {
    pub fn new(config: &TrainConfig) -> Result<Self, Error> {
        config.validate()?;
        let vss = ValidStateSpace::build(config.map_size(), config.obstacles());
        if vss.space_size() < MIN_SPACE_SIZE {
            return Err(Error::Config(format!(
                "valid state space has only {} states, need at least {MIN_SPACE_SIZE}",
                vss.space_size()
            )));
        }
        let values = ValueFunctions::with_width(vss.space_size(), config.float_width());
        let policy = Policy::new(vss.space_size());
        let density = config.transition_density()?;

        Ok(TrainManager {
            vss,
            values,
            policy,
            density,
            reward_kind: *config.reward_kind.get(),
            iteration_config: IterationConfig {
                discount: *config.discount.get(),
                convergence_tolerance: *config.value_tolerance.get(),
                max_iterations: *config.max_iterations.get() as usize,
                action_tolerance: *config.action_tolerance.get() as usize,
                action_percentage_tolerance: *config.action_percentage_tolerance.get(),
            },
            num_workers: *config.num_workers.get() as usize,
            policy_path: config.policy_path().to_string(),
            is_dry_run: *config.is_dry_run.get(),
        })
    }

    pub fn space_size(&self) -> usize {
        self.vss.space_size()
    }

    pub fn vss(&self) -> &ValidStateSpace {
        &self.vss
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Iterate policy iteration to convergence (or the configured
    /// iteration budget), invoking `on_iteration` once per completed
    /// sweep (the seeded zeroth record is reported first, matching the
    /// original orchestrator's pre-loop callback invocation) and
    /// appending each record as a line of `stats_path` if given. Writes
    /// the final policy to `self.policy_path` unless this run is a dry
    /// run.
    pub fn run(
        &mut self,
        stats_path: Option<&Path>,
        mut on_iteration: impl FnMut(&TrainData),
    ) -> Result<Vec<TrainData>, Error> {
        let space_size = self.vss.space_size();
        let mut history = vec![TrainData::seed(space_size)];
        on_iteration(&history[0]);
        self.append_stats_line(stats_path, &history[0])?;

        let reports = self.run_iterations()?;
        for (offset, stats) in reports.into_iter().enumerate() {
            let record = TrainData::from_stats(offset + 1, stats, space_size);
            on_iteration(&record);
            self.append_stats_line(stats_path, &record)?;
            history.push(record);
        }

        if !self.is_dry_run {
            self.policy.write_to_file(&self.policy_path)?;
            info!(path = %self.policy_path, "policy written to disk");
        } else {
            info!("dry run: skipping policy write");
        }

        Ok(history)
    }

    fn run_iterations(&mut self) -> Result<Vec<IterationStats>, Error> {
        match self.reward_kind {
            RewardKind::Dense => self.dispatch(&DenseReward),
            RewardKind::Sparse => self.dispatch(&SparseReward),
        }
    }

    fn dispatch<R: RewardFunction + Sync>(&mut self, reward: &R) -> Result<Vec<IterationStats>, Error> {
        if self.num_workers <= 1 {
            Ok(sequential::run(
                &self.vss,
                &mut self.values,
                &self.policy,
                &self.density,
                reward,
                &self.iteration_config,
            ))
        } else {
            parallel::run(
                &self.vss,
                &self.values,
                &self.policy,
                &self.density,
                reward,
                &self.iteration_config,
                self.num_workers,
            )
        }
    }

    fn append_stats_line(&self, stats_path: Option<&Path>, record: &TrainData) -> Result<(), Error> {
        let Some(path) = stats_path else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(record)
            .map_err(|e| Error::Config(format!("failed to serialize training stats: {e}")))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from_text(text: &str, name: &str) -> TrainConfig {
        let mut path = std::env::temp_dir();
        path.push(format!("grid_agent_train_test_cfg_{}_{name}.cfg", std::process::id()));
        std::fs::write(&path, text).unwrap();
        let config = TrainConfig::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        config
    }

    fn tiny_config() -> TrainConfig {
        let mut config = config_from_text("mapsize 3 1\n", "tiny");
        config.max_iterations.set_and_freeze(20);
        config.value_tolerance.set_and_freeze(1e-9);
        config
    }

    #[test]
    fn seed_record_reports_full_space_and_infinite_diff() {
        let seed = TrainData::seed(42);
        assert_eq!(seed.changed_actions_number, 42);
        assert_eq!(seed.changed_actions_percentage, 1.0);
        assert!(seed.max_value_diff.is_infinite());
    }

    #[test]
    fn run_converges_and_reports_seed_plus_iterations() {
        let config = tiny_config();
        let mut manager = TrainManager::new(&config).unwrap();
        let mut seen = Vec::new();
        let history = manager
            .run(None, |record| seen.push(*record))
            .expect("training run should succeed");
        assert_eq!(history.len(), seen.len());
        assert_eq!(history[0].iteration_number, 0);
        assert!(history.last().unwrap().max_value_diff <= 1e-9);
    }

    #[test]
    fn rejects_spaces_smaller_than_three_states() {
        let config = config_from_text("mapsize 1 1\n", "degenerate");
        assert!(TrainManager::new(&config).is_err());
    }

    #[test]
    fn dry_run_does_not_write_policy_file() {
        let mut config = tiny_config();
        config.is_dry_run.set_and_freeze(true);
        let mut path = std::env::temp_dir();
        path.push(format!("grid_agent_train_test_dry_run_{}.bin", std::process::id()));
        let _ = std::fs::remove_file(&path);
        config.set_policy_path(path.to_string_lossy().to_string());
        let mut manager = TrainManager::new(&config).unwrap();
        manager.run(None, |_| {}).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn stats_log_gets_one_ndjson_line_per_record() {
        let config = tiny_config();
        let mut manager = TrainManager::new(&config).unwrap();
        let mut path = std::env::temp_dir();
        path.push(format!("grid_agent_train_test_stats_{}.ndjson", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let history = manager.run(Some(&path), |_| {}).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), history.len());
        let _ = std::fs::remove_file(&path);
    }
}
