//! Playing out a learned policy: every tick, each of the three actors
//! asks its policy function for a chosen action, samples the actually
//! executed action from its transition density, and attempts the move.
//! Produces one `GameData` snapshot per tick until a terminal outcome
//! or the step budget runs out.

use rand::distr::{Distribution, Uniform};
use rand::Rng;

use crate::density::TransitionDensity;
use crate::geometry::{move_checking_bounds, Action, ACTIONS};
use crate::policy::Policy;
use crate::state::State;
use crate::vss::ValidStateSpace;

/// How an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    /// The agent reached the target.
    Success,
    /// The agent was caught by the opponent.
    Fail,
    /// Neither happened within the step budget.
    Timeout,
}

/// One tick's snapshot: the state after the tick's moves were applied,
/// together with the (density-sampled, actually executed) action each
/// of the three actors took this tick.
#[derive(Debug, Clone, Copy)]
pub struct GameData {
    pub state: State,
    pub agent_action: Action,
    pub target_action: Action,
    pub opponent_action: Action,
}

/// The "intended" action an actor asks for, before its transition
/// density perturbs it into the actually executed action. Every actor
/// — agent included — goes through this same two-stage process
/// (§4.8): a chosen action, then a sampled outcome.
pub trait PolicyFn {
    fn chosen_action(&self, state: &State, rng: &mut dyn rand::RngCore) -> Action;
}

/// Follows a fixed learned policy, looking up the action by valid
/// state index. Falls back to a uniform random action when no policy
/// is attached at all (the deliberate game-time fallback for a missing
/// policy file — logged by the caller, not here) or, in the bug case of
/// a state somehow missing from the space, so simulation never panics.
pub struct LearnedPolicy<'a> {
    pub vss: &'a ValidStateSpace,
    pub policy: Option<&'a Policy>,
}

impl PolicyFn for LearnedPolicy<'_> {
    fn chosen_action(&self, state: &State, rng: &mut dyn rand::RngCore) -> Action {
        match self.policy.and_then(|policy| {
            self.vss
                .get_valid_index(state)
                .map(|index| policy.get(index))
        }) {
            Some(action) => action,
            None => random_action(rng),
        }
    }
}

/// A uniformly random "intent", used for the opponent and the target:
/// neither learns a policy (a deliberate non-goal), so each tick they
/// simply intend a random direction, which their own transition
/// density then perturbs like any other actor's.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformIntent;

impl PolicyFn for UniformIntent {
    fn chosen_action(&self, _state: &State, rng: &mut dyn rand::RngCore) -> Action {
        random_action(rng)
    }
}

fn random_action(rng: &mut dyn rand::RngCore) -> Action {
    let distribution = Uniform::new(0usize, Action::COUNT).expect("non-empty action range");
    Action::from_index(distribution.sample(rng))
}

fn sample_actual<D: TransitionDensity>(density: &D, chosen: Action, rng: &mut dyn rand::RngCore) -> Action {
    let roll: f64 = rng.random();
    let mut cumulative = 0.0;
    for executed in ACTIONS {
        cumulative += density.probability(chosen, executed);
        if roll < cumulative {
            return executed;
        }
    }
    chosen
}

/// One actor: a policy function choosing the intended action, and a
/// transition density perturbing it into the one actually executed.
pub struct MovingEntity<'a, P: PolicyFn, D: TransitionDensity> {
    pub policy: P,
    pub density: &'a D,
}

impl<'a, P: PolicyFn, D: TransitionDensity> MovingEntity<'a, P, D> {
    pub fn new(policy: P, density: &'a D) -> Self {
        MovingEntity { policy, density }
    }

    /// The action this actor actually executes this tick.
    pub fn act(&self, state: &State, rng: &mut dyn rand::RngCore) -> Action {
        let chosen = self.policy.chosen_action(state, rng);
        sample_actual(self.density, chosen, rng)
    }
}

/// Drives one episode to completion. At each tick all three actors act
/// against the tick's starting state; the agent moves first and is
/// checked for an immediate win/capture, then the target and the
/// opponent both move and the same checks are applied once more. A
/// `GameData` snapshot — carrying all three executed actions — is
/// emitted to `on_tick` once per tick, whether or not the tick ended
/// the episode.
pub struct GameManager<'a> {
    pub vss: &'a ValidStateSpace,
    pub max_steps: usize,
}

impl<'a> GameManager<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn run<PA, DA, PO, DO, PT, DT>(
        &self,
        mut state: State,
        agent: &MovingEntity<'_, PA, DA>,
        opponent: &MovingEntity<'_, PO, DO>,
        target: &MovingEntity<'_, PT, DT>,
        rng: &mut dyn rand::RngCore,
        mut on_tick: impl FnMut(&GameData),
    ) -> GameResult
    where
        PA: PolicyFn,
        DA: TransitionDensity,
        PO: PolicyFn,
        DO: TransitionDensity,
        PT: PolicyFn,
        DT: TransitionDensity,
    {
        for _ in 0..self.max_steps {
            let agent_action = agent.act(&state, rng);
            let opponent_action = opponent.act(&state, rng);
            let target_action = target.act(&state, rng);

            self.attempt_agent_move(&mut state, agent_action);
            if state.agent == state.target {
                on_tick(&GameData {
                    state,
                    agent_action,
                    target_action,
                    opponent_action,
                });
                return GameResult::Success;
            }
            if state.agent == state.opponent {
                on_tick(&GameData {
                    state,
                    agent_action,
                    target_action,
                    opponent_action,
                });
                return GameResult::Fail;
            }

            self.attempt_target_move(&mut state, target_action);
            self.attempt_opponent_move(&mut state, opponent_action);

            if state.agent == state.target {
                on_tick(&GameData {
                    state,
                    agent_action,
                    target_action,
                    opponent_action,
                });
                return GameResult::Success;
            }
            if state.agent == state.opponent {
                on_tick(&GameData {
                    state,
                    agent_action,
                    target_action,
                    opponent_action,
                });
                return GameResult::Fail;
            }

            on_tick(&GameData {
                state,
                agent_action,
                target_action,
                opponent_action,
            });
        }
        GameResult::Timeout
    }

    /// The agent may legally land on the target or the opponent (those
    /// are terminal conditions, checked by the caller); a wall or
    /// obstacle move is rejected exactly like any other actor's.
    fn attempt_agent_move(&self, state: &mut State, action: Action) {
        let previous = state.agent;
        let in_bounds = move_checking_bounds(&mut state.agent, action, self.vss.map_size());
        let blocked_by_obstacle = in_bounds && !self.vss.is_state_outside_obstacles(state);
        if !in_bounds || blocked_by_obstacle {
            state.agent = previous;
        }
    }

    fn attempt_opponent_move(&self, state: &mut State, action: Action) {
        let previous = state.opponent;
        let in_bounds = move_checking_bounds(&mut state.opponent, action, self.vss.map_size());
        let collides =
            in_bounds && (!self.vss.is_state_outside_obstacles(state) || state.opponent == state.target);
        if !in_bounds || collides {
            state.opponent = previous;
        }
    }

    fn attempt_target_move(&self, state: &mut State, action: Action) {
        let previous = state.target;
        let in_bounds = move_checking_bounds(&mut state.target, action, self.vss.map_size());
        let collides =
            in_bounds && (!self.vss.is_state_outside_obstacles(state) || state.target == state.opponent);
        if !in_bounds || collides {
            state.target = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::DiscreteTransitionDensity;
    use crate::geometry::{Obstacle, Vec2D};
    use rand::rngs::mock::StepRng;

    #[test]
    fn agent_walking_straight_into_target_wins() {
        let vss = ValidStateSpace::build(Vec2D::new(5, 1), &[]);
        let policy = Policy::new(vss.space_size());
        for (index, state) in vss.iter() {
            let action = if state.agent.x < state.target.x {
                Action::Right
            } else if state.agent.x > state.target.x {
                Action::Left
            } else {
                Action::Up
            };
            policy.set(index, action);
        }
        let density = DiscreteTransitionDensity::deterministic();
        let agent = MovingEntity::new(
            LearnedPolicy {
                vss: &vss,
                policy: Some(&policy),
            },
            &density,
        );
        let still = MovingEntity::new(UniformIntent, &density);
        let manager = GameManager {
            vss: &vss,
            max_steps: 10,
        };
        let start = State::new(Vec2D::new(0, 0), Vec2D::new(4, 0), Vec2D::new(3, 0));
        let mut rng = StepRng::new(0, 0);
        let mut ticks = 0;
        let result = manager.run(start, &agent, &still, &still, &mut rng, |_| ticks += 1);
        assert_eq!(result, GameResult::Success);
        assert!(ticks > 0);
    }

    #[test]
    fn timeout_when_agent_stays_pinned_to_a_wall() {
        let vss = ValidStateSpace::build(Vec2D::new(5, 5), &[]);
        let policy = Policy::new(vss.space_size());
        for index in 0..vss.space_size() {
            policy.set(index, Action::Up);
        }
        let density = DiscreteTransitionDensity::deterministic();
        let agent = MovingEntity::new(
            LearnedPolicy {
                vss: &vss,
                policy: Some(&policy),
            },
            &density,
        );
        let still = MovingEntity::new(UniformIntent, &density);
        let manager = GameManager {
            vss: &vss,
            max_steps: 3,
        };
        // agent already at the top row (y=4): Up is always a wall-hit.
        let start = State::new(Vec2D::new(0, 4), Vec2D::new(4, 4), Vec2D::new(4, 0));
        let mut rng = StepRng::new(0, 0);
        let mut ticks = 0;
        let result = manager.run(start, &agent, &still, &still, &mut rng, |data| {
            ticks += 1;
            assert_eq!(data.state.agent, Vec2D::new(0, 4));
        });
        assert_eq!(result, GameResult::Timeout);
        assert_eq!(ticks, 3);
    }

    #[test]
    fn opponent_move_onto_target_is_undone() {
        let vss = ValidStateSpace::build(Vec2D::new(4, 1), &[]);
        let manager = GameManager {
            vss: &vss,
            max_steps: 5,
        };
        // opponent at x=1, target at x=2: a Right move would collide.
        let mut state = State::new(Vec2D::new(0, 0), Vec2D::new(1, 0), Vec2D::new(2, 0));
        manager.attempt_opponent_move(&mut state, Action::Right);
        assert_eq!(state.opponent, Vec2D::new(1, 0));
    }

    #[test]
    fn target_move_onto_opponent_is_undone() {
        let vss = ValidStateSpace::build(Vec2D::new(4, 1), &[]);
        let manager = GameManager {
            vss: &vss,
            max_steps: 5,
        };
        let mut state = State::new(Vec2D::new(0, 0), Vec2D::new(2, 0), Vec2D::new(1, 0));
        manager.attempt_target_move(&mut state, Action::Right);
        assert_eq!(state.target, Vec2D::new(1, 0));
    }

    #[test]
    fn agent_move_into_obstacle_is_undone() {
        let obstacles = vec![Obstacle::new(Vec2D::new(1, 0), Vec2D::new(1, 1))];
        let vss = ValidStateSpace::build(Vec2D::new(3, 1), &obstacles);
        let manager = GameManager {
            vss: &vss,
            max_steps: 5,
        };
        let mut state = State::new(Vec2D::new(0, 0), Vec2D::new(2, 0), Vec2D::new(2, 0));
        manager.attempt_agent_move(&mut state, Action::Right);
        assert_eq!(state.agent, Vec2D::new(0, 0), "obstacle at x=1 must block the agent");
    }

    #[test]
    fn agent_may_legally_land_on_target_or_opponent() {
        let vss = ValidStateSpace::build(Vec2D::new(4, 1), &[]);
        let manager = GameManager {
            vss: &vss,
            max_steps: 5,
        };
        let mut state = State::new(Vec2D::new(1, 0), Vec2D::new(3, 0), Vec2D::new(2, 0));
        manager.attempt_agent_move(&mut state, Action::Right);
        assert_eq!(state.agent, Vec2D::new(2, 0));
    }
}
