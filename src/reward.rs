//! Reward functions scoring an agent transition.

use crate::state::State;

pub trait RewardFunction {
    fn reward(&self, before: &State, after: &State) -> f64;
}

/// Dense shaping reward: a state that is already terminal (agent on
/// target or opponent) scores ±1.0 outright; otherwise, literal
/// arrival at the target or the opponent this step scores ±0.25; short
/// of either, proximity to the opponent is penalized, so the value
/// function has some gradient to follow even far from a terminal
/// condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseReward;

impl RewardFunction for DenseReward {
    fn reward(&self, before: &State, after: &State) -> f64 {
        if before.agent == before.target {
            return 1.0;
        }
        if before.agent == before.opponent {
            return -1.0;
        }
        if after.agent == after.target {
            return 0.25;
        }
        if after.agent == after.opponent {
            return -0.25;
        }
        if after.agent.manhattan_distance(after.opponent) == 1 {
            -0.1
        } else {
            -0.01
        }
    }
}

/// Terminal-only reward: zero everywhere except a win or a capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseReward;

impl RewardFunction for SparseReward {
    fn reward(&self, before: &State, _after: &State) -> f64 {
        if before.agent == before.target {
            1.0
        } else if before.agent == before.opponent {
            -1.0
        } else {
            0.0
        }
    }
}
