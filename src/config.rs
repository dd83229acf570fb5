//! Configuration loading for training and game sessions: the line-based
//! directive format of spec.md §6 (whitespace-separated tokens, `#`
//! comments, blank lines ignored), layered under explicit caller-set
//! values so that a caller's choice always wins over the file's, and the
//! file's always wins over the built-in default (ported from
//! `configs/base_configs.py::ConfigArgument`/`BaseConfigs`).

use std::fs;
use std::path::Path;

use crate::density::DiscreteTransitionDensity;
use crate::error::Error;
use crate::geometry::{MapSize, Obstacle, Vec2D};
use crate::value::FloatWidth;

/// A single configuration value with freeze-on-write semantics: once set
/// by a caller (frozen), later file-driven assignments are no-ops. This
/// lets `TrainConfig`/`GameConfig` apply a configuration file after the
/// caller has already set some fields explicitly, without clobbering
/// them (`configs/base_configs.py::ConfigArgument`).
#[derive(Debug, Clone)]
pub struct ConfigArgument<T> {
    value: T,
    frozen: bool,
}

impl<T: Clone> ConfigArgument<T> {
    pub fn new(default: T) -> Self {
        ConfigArgument {
            value: default,
            frozen: false,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    /// A caller's explicit choice: always wins, and locks out any later
    /// file-driven value.
    pub fn set_and_freeze(&mut self, value: T) {
        self.value = value;
        self.frozen = true;
    }

    /// A value discovered while parsing a config file: applied only if
    /// no caller has frozen this argument already.
    pub fn set_if_not_frozen(&mut self, value: T) {
        if !self.frozen {
            self.value = value;
        }
    }

    /// Mutate the value in place, but only if it hasn't been frozen by
    /// the caller. Used to accumulate `obstacle` directives one line at
    /// a time without clobbering earlier lines.
    pub fn mutate_if_not_frozen(&mut self, f: impl FnOnce(&mut T)) {
        if !self.frozen {
            f(&mut self.value);
        }
    }
}

/// One whitespace-separated, case-folded, comment-and-blank-stripped
/// configuration line.
fn tokenize(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_lowercase().split_whitespace().map(str::to_string).collect())
        .collect()
}

fn parse_int(token: &str) -> Result<i64, Error> {
    token
        .parse()
        .map_err(|_| Error::Config(format!("expected an integer, got '{token}'")))
}

fn parse_float(token: &str) -> Result<f64, Error> {
    token
        .parse()
        .map_err(|_| Error::Config(format!("expected a number, got '{token}'")))
}

fn parse_density(tokens: &[String]) -> Result<(f64, f64, f64, f64), Error> {
    Ok((
        parse_float(&tokens[0])?,
        parse_float(&tokens[1])?,
        parse_float(&tokens[2])?,
        parse_float(&tokens[3])?,
    ))
}

/// The fields every configuration kind shares: map geometry, obstacles,
/// the policy file path, and the agent's transition density (used by
/// both training and the game simulator). Mirrors `BaseConfigs`.
#[derive(Debug, Clone)]
struct CommonFields {
    map_size: ConfigArgument<Vec2D>,
    obstacles: ConfigArgument<Vec<Obstacle>>,
    policy_path: ConfigArgument<String>,
    agent_density: ConfigArgument<(f64, f64, f64, f64)>,
}

impl Default for CommonFields {
    fn default() -> Self {
        CommonFields {
            map_size: ConfigArgument::new(Vec2D::new(3, 3)),
            obstacles: ConfigArgument::new(Vec::new()),
            policy_path: ConfigArgument::new("policy.bin".to_string()),
            // Spec default transition density: {chosen: 0.9, right: 0.05, opposite: 0.0, left: 0.05}.
            agent_density: ConfigArgument::new((0.9, 0.05, 0.0, 0.05)),
        }
    }
}

/// Try to process one of the directives shared by both config kinds
/// (`mapsize`, `obstacle`, `policy`, `ddmtd agent`). Returns `Ok(true)`
/// if the line was recognized (whether or not it was malformed: a
/// malformed recognized directive is a hard parse error, not a silent
/// skip), `Ok(false)` if the line belongs to neither, so the caller
/// should try its own directives next.
fn try_common_directive(fields: &mut CommonFields, tokens: &[String]) -> Result<bool, Error> {
    match tokens {
        [head, rest @ ..] if head == "mapsize" && rest.len() == 2 => {
            let n = parse_int(&rest[0])?;
            let m = parse_int(&rest[1])?;
            fields.map_size.set_if_not_frozen(Vec2D::new(n as i32, m as i32));
            Ok(true)
        }
        [head, rest @ ..] if head == "obstacle" && rest.len() == 4 => {
            let origin = Vec2D::new(parse_int(&rest[0])? as i32, parse_int(&rest[1])? as i32);
            let extent = Vec2D::new(parse_int(&rest[2])? as i32, parse_int(&rest[3])? as i32);
            fields
                .obstacles
                .mutate_if_not_frozen(|list| list.push(Obstacle::new(origin, extent)));
            Ok(true)
        }
        [head, rest @ ..] if head == "policy" && rest.len() == 1 => {
            fields.policy_path.set_if_not_frozen(rest[0].clone());
            Ok(true)
        }
        [head, entity, rest @ ..] if head == "ddmtd" && entity == "agent" && rest.len() == 4 => {
            fields.agent_density.set_if_not_frozen(parse_density(rest)?);
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn check_map_size(map_size: Vec2D) -> Result<(), Error> {
    if map_size.x <= 0 || map_size.y <= 0 {
        return Err(Error::Config(format!(
            "map size must be positive, got ({}, {})",
            map_size.x, map_size.y
        )));
    }
    Ok(())
}

fn check_obstacles(map_size: Vec2D, obstacles: &[Obstacle]) -> Result<(), Error> {
    for obstacle in obstacles {
        if !obstacle.is_inside_bounds(map_size) {
            return Err(Error::Config(format!(
                "obstacle {obstacle:?} lies outside the map bounds {map_size:?}"
            )));
        }
    }
    Ok(())
}

/// Which reward shaping the trained policy should optimize for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardKind {
    Dense,
    Sparse,
}

/// Training-session configuration: grid geometry, obstacle layout, the
/// agent's stochastic transition model, and the policy-iteration
/// schedule (`configs/train_configs.py::TrainConfigs`).
#[derive(Debug, Clone)]
pub struct TrainConfig {
    common: CommonFields,
    pub discount: ConfigArgument<f64>,
    pub max_iterations: ConfigArgument<i64>,
    pub value_tolerance: ConfigArgument<f64>,
    pub action_tolerance: ConfigArgument<i64>,
    pub action_percentage_tolerance: ConfigArgument<f64>,
    pub num_workers: ConfigArgument<i64>,
    pub use_float: ConfigArgument<bool>,
    pub is_dry_run: ConfigArgument<bool>,
    pub reward_kind: ConfigArgument<RewardKind>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            common: CommonFields::default(),
            discount: ConfigArgument::new(0.5),
            max_iterations: ConfigArgument::new(100),
            value_tolerance: ConfigArgument::new(0.0),
            action_tolerance: ConfigArgument::new(0),
            action_percentage_tolerance: ConfigArgument::new(0.0),
            num_workers: ConfigArgument::new(1),
            use_float: ConfigArgument::new(false),
            is_dry_run: ConfigArgument::new(false),
            reward_kind: ConfigArgument::new(RewardKind::Dense),
        }
    }
}

impl TrainConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut config = TrainConfig::default();
        config.merge_file(path)?;
        Ok(config)
    }

    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.merge_file_with(path, |_tokens| false)
    }

    /// Like [`TrainConfig::merge_file`], but unrecognized directives are
    /// offered to `extension` instead of being silently dropped — the
    /// "user-supplied extension hook" of spec.md §6. `extension` returns
    /// whether it handled the line; an unhandled line is ignored, not an
    /// error (matching the original's no-op default hook).
    pub fn merge_file_with(
        &mut self,
        path: impl AsRef<Path>,
        mut extension: impl FnMut(&[String]) -> bool,
    ) -> Result<(), Error> {
        let text = fs::read_to_string(path)?;
        for tokens in tokenize(&text) {
            if try_common_directive(&mut self.common, &tokens)? {
                continue;
            }
            if self.try_directive(&tokens)? {
                continue;
            }
            extension(&tokens);
        }
        Ok(())
    }

    fn try_directive(&mut self, tokens: &[String]) -> Result<bool, Error> {
        match tokens {
            [head, rest @ ..] if head == "maxiter" && rest.len() == 1 => {
                self.max_iterations.set_if_not_frozen(parse_int(&rest[0])?);
                Ok(true)
            }
            [head, rest @ ..] if head == "valuetolerance" && rest.len() == 1 => {
                self.value_tolerance.set_if_not_frozen(parse_float(&rest[0])?);
                Ok(true)
            }
            [head, rest @ ..] if head == "actiontolerance" && rest.len() == 1 => {
                self.action_tolerance.set_if_not_frozen(parse_int(&rest[0])?);
                Ok(true)
            }
            [head, rest @ ..] if head == "actionperctolerance" && rest.len() == 1 => {
                self.action_percentage_tolerance.set_if_not_frozen(parse_float(&rest[0])?);
                Ok(true)
            }
            [head, rest @ ..] if head == "discount" && rest.len() == 1 => {
                self.discount.set_if_not_frozen(parse_float(&rest[0])?);
                Ok(true)
            }
            [head, rest @ ..] if head == "processes" && rest.len() == 1 => {
                self.num_workers.set_if_not_frozen(parse_int(&rest[0])?);
                Ok(true)
            }
            [head] if head == "usefloat" => {
                self.use_float.set_if_not_frozen(true);
                Ok(true)
            }
            [head] if head == "usedouble" => {
                self.use_float.set_if_not_frozen(false);
                Ok(true)
            }
            [head] if head == "densereward" => {
                self.reward_kind.set_if_not_frozen(RewardKind::Dense);
                Ok(true)
            }
            [head] if head == "sparsereward" => {
                self.reward_kind.set_if_not_frozen(RewardKind::Sparse);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Check every field-level invariant that doesn't require building
    /// the valid state space (that check — `space_size < 3` — happens
    /// once the space is actually built, since `space_size` isn't known
    /// before then).
    pub fn validate(&self) -> Result<(), Error> {
        check_map_size(*self.common.map_size.get())?;
        check_obstacles(*self.common.map_size.get(), self.common.obstacles.get())?;
        let discount = *self.discount.get();
        if discount <= 0.0 || discount > 1.0 {
            return Err(Error::Config(format!(
                "discount must be in (0, 1], got {discount}"
            )));
        }
        if *self.max_iterations.get() <= 0 {
            return Err(Error::Config(format!(
                "max_iterations must be positive, got {}",
                self.max_iterations.get()
            )));
        }
        if *self.num_workers.get() <= 0 {
            return Err(Error::Config(format!(
                "processes must be positive, got {}",
                self.num_workers.get()
            )));
        }
        if *self.value_tolerance.get() < 0.0 {
            return Err(Error::Config("valuetolerance must be >= 0".to_string()));
        }
        if *self.action_tolerance.get() < 0 {
            return Err(Error::Config("actiontolerance must be >= 0".to_string()));
        }
        let action_pct = *self.action_percentage_tolerance.get();
        if !(0.0..=1.0).contains(&action_pct) {
            return Err(Error::Config(
                "actionperctolerance must be in [0, 1]".to_string(),
            ));
        }
        self.transition_density()?;
        Ok(())
    }

    pub fn map_size(&self) -> Vec2D {
        *self.common.map_size.get()
    }

    pub fn map_size_struct(&self) -> MapSize {
        let size = self.map_size();
        MapSize::new(size.x, size.y)
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        self.common.obstacles.get()
    }

    pub fn policy_path(&self) -> &str {
        self.common.policy_path.get()
    }

    pub fn set_policy_path(&mut self, path: String) {
        self.common.policy_path.set_and_freeze(path);
    }

    pub fn transition_density(&self) -> Result<DiscreteTransitionDensity, Error> {
        let (chosen, right, opposite, left) = *self.common.agent_density.get();
        DiscreteTransitionDensity::new(chosen, right, opposite, left)
    }

    pub fn float_width(&self) -> FloatWidth {
        if *self.use_float.get() {
            FloatWidth::F32
        } else {
            FloatWidth::F64
        }
    }
}

/// Game-session configuration: which grid and obstacles to play on,
/// where the trained policy lives, each actor's starting position, and
/// the adversaries' transition densities (`configs/game_configs.py::GameConfigs`).
#[derive(Debug, Clone)]
pub struct GameConfig {
    common: CommonFields,
    pub agent_start: ConfigArgument<Vec2D>,
    pub target_start: ConfigArgument<Vec2D>,
    pub opponent_start: ConfigArgument<Vec2D>,
    pub target_density: ConfigArgument<(f64, f64, f64, f64)>,
    pub opponent_density: ConfigArgument<(f64, f64, f64, f64)>,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            common: CommonFields::default(),
            agent_start: ConfigArgument::new(Vec2D::new(0, 0)),
            target_start: ConfigArgument::new(Vec2D::new(2, 2)),
            opponent_start: ConfigArgument::new(Vec2D::new(2, 0)),
            target_density: ConfigArgument::new((0.9, 0.05, 0.0, 0.05)),
            opponent_density: ConfigArgument::new((0.9, 0.05, 0.0, 0.05)),
        }
    }
}

impl GameConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut config = GameConfig::default();
        config.merge_file(path)?;
        Ok(config)
    }

    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.merge_file_with(path, |_tokens| false)
    }

    /// Like [`GameConfig::merge_file`], but unrecognized directives are
    /// offered to `extension` first (spec.md §6's user-supplied
    /// extension hook); see [`TrainConfig::merge_file_with`].
    pub fn merge_file_with(
        &mut self,
        path: impl AsRef<Path>,
        mut extension: impl FnMut(&[String]) -> bool,
    ) -> Result<(), Error> {
        let text = fs::read_to_string(path)?;
        for tokens in tokenize(&text) {
            if try_common_directive(&mut self.common, &tokens)? {
                continue;
            }
            if self.try_directive(&tokens)? {
                continue;
            }
            extension(&tokens);
        }
        Ok(())
    }

    fn try_directive(&mut self, tokens: &[String]) -> Result<bool, Error> {
        match tokens {
            [head, rest @ ..] if head == "agent" && rest.len() == 2 => {
                self.agent_start
                    .set_if_not_frozen(Vec2D::new(parse_int(&rest[0])? as i32, parse_int(&rest[1])? as i32));
                Ok(true)
            }
            [head, rest @ ..] if head == "target" && rest.len() == 2 => {
                self.target_start
                    .set_if_not_frozen(Vec2D::new(parse_int(&rest[0])? as i32, parse_int(&rest[1])? as i32));
                Ok(true)
            }
            [head, rest @ ..] if head == "opponent" && rest.len() == 2 => {
                self.opponent_start
                    .set_if_not_frozen(Vec2D::new(parse_int(&rest[0])? as i32, parse_int(&rest[1])? as i32));
                Ok(true)
            }
            [head, entity, rest @ ..] if head == "ddmtd" && entity == "target" && rest.len() == 4 => {
                self.target_density.set_if_not_frozen(parse_density(rest)?);
                Ok(true)
            }
            [head, entity, rest @ ..] if head == "ddmtd" && entity == "opponent" && rest.len() == 4 => {
                self.opponent_density.set_if_not_frozen(parse_density(rest)?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let map_size = *self.common.map_size.get();
        check_map_size(map_size)?;
        check_obstacles(map_size, self.common.obstacles.get())?;

        let agent = *self.agent_start.get();
        let target = *self.target_start.get();
        let opponent = *self.opponent_start.get();
        for (name1, pos1, name2, pos2) in [
            ("agent", agent, "target", target),
            ("agent", agent, "opponent", opponent),
            ("target", target, "opponent", opponent),
        ] {
            if pos1 == pos2 {
                return Err(Error::Config(format!(
                    "{name1} and {name2} must start at different positions, both at ({},{})",
                    pos1.x, pos1.y
                )));
            }
        }
        for (name, pos) in [("agent", agent), ("target", target), ("opponent", opponent)] {
            if pos.x < 0 || pos.x >= map_size.x || pos.y < 0 || pos.y >= map_size.y {
                return Err(Error::Config(format!(
                    "{name} start ({},{}) is out of bounds for map {}x{}",
                    pos.x, pos.y, map_size.x, map_size.y
                )));
            }
            if self.common.obstacles.get().iter().any(|o| o.is_inside(pos)) {
                return Err(Error::Config(format!(
                    "{name} start ({},{}) collides with an obstacle",
                    pos.x, pos.y
                )));
            }
        }

        self.agent_transition_density()?;
        self.target_transition_density()?;
        self.opponent_transition_density()?;
        Ok(())
    }

    pub fn map_size(&self) -> Vec2D {
        *self.common.map_size.get()
    }

    pub fn map_size_struct(&self) -> MapSize {
        let size = self.map_size();
        MapSize::new(size.x, size.y)
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        self.common.obstacles.get()
    }

    pub fn policy_path(&self) -> &str {
        self.common.policy_path.get()
    }

    pub fn set_policy_path(&mut self, path: String) {
        self.common.policy_path.set_and_freeze(path);
    }

    pub fn agent_transition_density(&self) -> Result<DiscreteTransitionDensity, Error> {
        let (chosen, right, opposite, left) = *self.common.agent_density.get();
        DiscreteTransitionDensity::new(chosen, right, opposite, left)
    }

    pub fn target_transition_density(&self) -> Result<DiscreteTransitionDensity, Error> {
        let (chosen, right, opposite, left) = *self.target_density.get();
        DiscreteTransitionDensity::new(chosen, right, opposite, left)
    }

    pub fn opponent_transition_density(&self) -> Result<DiscreteTransitionDensity, Error> {
        let (chosen, right, opposite, left) = *self.opponent_density.get();
        DiscreteTransitionDensity::new(chosen, right, opposite, left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn caller_freeze_beats_file_value() {
        let mut config = TrainConfig::default();
        config.discount.set_and_freeze(0.5);
        config.discount.set_if_not_frozen(0.99);
        assert_eq!(*config.discount.get(), 0.5);
    }

    #[test]
    fn file_value_applies_when_not_frozen() {
        let mut config = ConfigArgument::new(10usize);
        config.set_if_not_frozen(20);
        assert_eq!(*config.get(), 20);
    }

    #[test]
    fn tokenize_skips_blank_and_comment_lines_and_casefolds() {
        let lines = tokenize("# comment\n\nMapSize 4 4\n");
        assert_eq!(lines, vec![vec!["mapsize", "4", "4"]]);
    }

    #[test]
    fn validate_rejects_out_of_bounds_obstacle() {
        let mut config = TrainConfig::default();
        config.common.map_size.set_and_freeze(Vec2D::new(4, 4));
        config
            .common
            .obstacles
            .set_and_freeze(vec![Obstacle::new(Vec2D::new(3, 3), Vec2D::new(3, 3))]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_discount_out_of_range() {
        let mut config = TrainConfig::default();
        config.discount.set_and_freeze(0.0);
        assert!(config.validate().is_err());
        config.discount.set_and_freeze(1.5);
        assert!(config.validate().is_err());
        config.discount.set_and_freeze(1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn train_directives_parse_spec_format() {
        let mut config = TrainConfig::default();
        let text = "mapsize 5 5\nobstacle 2 0 1 4\ndiscount 0.9\nmaxiter 50\nprocesses 4\nusefloat\nsparsereward\nddmtd agent 0.7 0.1 0.1 0.1\n";
        let tmp = write_temp(text);
        config.merge_file(tmp.path()).unwrap();
        assert_eq!(config.map_size(), Vec2D::new(5, 5));
        assert_eq!(config.obstacles().len(), 1);
        assert_eq!(*config.discount.get(), 0.9);
        assert_eq!(*config.max_iterations.get(), 50);
        assert_eq!(*config.num_workers.get(), 4);
        assert!(*config.use_float.get());
        assert_eq!(*config.reward_kind.get(), RewardKind::Sparse);
        let density = config.transition_density().unwrap();
        assert_eq!(density.probability(crate::geometry::Action::Up, crate::geometry::Action::Up), 0.7);
    }

    #[test]
    fn unknown_directive_is_ignored_not_an_error() {
        let mut config = TrainConfig::default();
        let tmp = write_temp("totallyunknown 1 2 3\n");
        assert!(config.merge_file(tmp.path()).is_ok());
    }

    #[test]
    fn unknown_directive_reaches_the_extension_hook() {
        let mut config = TrainConfig::default();
        let tmp = write_temp("totallyunknown 1 2 3\nmapsize 4 4\n");
        let mut seen = Vec::new();
        config
            .merge_file_with(tmp.path(), |tokens| {
                seen.push(tokens.to_vec());
                true
            })
            .unwrap();
        assert_eq!(seen, vec![vec!["totallyunknown", "1", "2", "3"]]);
        assert_eq!(config.map_size(), Vec2D::new(4, 4));
    }

    #[test]
    fn malformed_density_sum_is_rejected_at_validate() {
        let mut config = TrainConfig::default();
        let tmp = write_temp("ddmtd agent 0.5 0.3 0.3 0.0\n");
        config.merge_file(tmp.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn game_directives_parse_positions_and_adversary_densities() {
        let mut config = GameConfig::default();
        let text = "mapsize 5 5\nagent 0 0\ntarget 4 4\nopponent 4 0\nddmtd target 0.9 0.05 0.0 0.05\n";
        let tmp = write_temp(text);
        config.merge_file(tmp.path()).unwrap();
        assert_eq!(*config.agent_start.get(), Vec2D::new(0, 0));
        assert_eq!(*config.target_start.get(), Vec2D::new(4, 4));
        assert_eq!(*config.opponent_start.get(), Vec2D::new(4, 0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn game_validate_rejects_colliding_start_positions() {
        let mut config = GameConfig::default();
        config.common.map_size.set_and_freeze(Vec2D::new(4, 4));
        config.agent_start.set_and_freeze(Vec2D::new(1, 1));
        config.target_start.set_and_freeze(Vec2D::new(1, 1));
        assert!(config.validate().is_err());
    }
}
