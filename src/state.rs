//! The joint state `(agent, opponent, target)` and its packed-index encoding.

use crate::geometry::{move_checking_bounds, Action, MapSize, Vec2D};

/// A joint state of the three actors on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct State {
    pub agent: Vec2D,
    pub opponent: Vec2D,
    pub target: Vec2D,
}

impl State {
    pub fn new(agent: Vec2D, opponent: Vec2D, target: Vec2D) -> Self {
        State {
            agent,
            opponent,
            target,
        }
    }

    /// `idx(S) = a.x + a.y*N + o.x*N*M + o.y*N^2*M + t.x*N^2*M^2 + t.y*N^3*M^2`.
    pub fn pack(&self, map_size: &MapSize) -> u64 {
        self.agent.x as u64
            + self.agent.y as u64 * map_size.n as u64
            + self.opponent.x as u64 * map_size.nm
            + self.opponent.y as u64 * map_size.n2m
            + self.target.x as u64 * map_size.n2m2
            + self.target.y as u64 * map_size.n3m2
    }

    /// Inverse of [`State::pack`].
    pub fn unpack(index: u64, map_size: &MapSize) -> State {
        let n = map_size.n as u64;
        let agent_x = index % n;
        let agent_y = (index % map_size.nm) / n;
        let opponent_x = (index % map_size.n2m) / map_size.nm;
        let opponent_y = (index % map_size.n2m2) / map_size.n2m;
        let target_x = (index % map_size.n3m2) / map_size.n2m2;
        let target_y = index / map_size.n3m2;
        State {
            agent: Vec2D::new(agent_x as i32, agent_y as i32),
            opponent: Vec2D::new(opponent_x as i32, opponent_y as i32),
            target: Vec2D::new(target_x as i32, target_y as i32),
        }
    }

    pub fn unpack_into(&mut self, index: u64, map_size: &MapSize) {
        *self = State::unpack(index, map_size);
    }

    /// Advance `self` to the next state in the enumeration order used to
    /// build the valid state space: agent fastest, then opponent, then
    /// target. Returns `false` once the enumeration wraps back to the start.
    pub fn advance(&mut self, map_size: &MapSize) -> bool {
        if Self::advance_pos(&mut self.agent, map_size) {
            return true;
        }
        if Self::advance_pos(&mut self.opponent, map_size) {
            return true;
        }
        Self::advance_pos(&mut self.target, map_size)
    }

    fn advance_pos(pos: &mut Vec2D, map_size: &MapSize) -> bool {
        pos.x += 1;
        if pos.x < map_size.n {
            return true;
        }
        pos.x = 0;
        pos.y += 1;
        if pos.y < map_size.m {
            return true;
        }
        pos.y = 0;
        false
    }

    /// Move `pos` by `action`, rejecting (and undoing) the move if it
    /// leaves the grid bounds.
    pub fn move_checking_bounds(pos: &mut Vec2D, action: Action, map_size: &MapSize) -> bool {
        move_checking_bounds(pos, action, map_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_bijection() {
        let map_size = MapSize::new(4, 3);
        for ax in 0..4 {
            for ay in 0..3 {
                for ox in 0..4 {
                    for oy in 0..3 {
                        let state = State::new(
                            Vec2D::new(ax, ay),
                            Vec2D::new(ox, oy),
                            Vec2D::new((ax + 1) % 4, (ay + 1) % 3),
                        );
                        let packed = state.pack(&map_size);
                        assert_eq!(State::unpack(packed, &map_size), state);
                    }
                }
            }
        }
    }

    #[test]
    fn advance_enumerates_agent_fastest() {
        let map_size = MapSize::new(2, 1);
        let mut state = State::default();
        let first = state.pack(&map_size);
        assert_eq!(first, 0);
        assert!(state.advance(&map_size));
        assert_eq!(state.agent, Vec2D::new(1, 0));
        assert!(state.advance(&map_size));
        assert_eq!(state.agent, Vec2D::new(0, 0));
        assert_eq!(state.opponent, Vec2D::new(1, 0));
    }
}
