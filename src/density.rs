//! The opponent's and target's movement model: given the action they
//! "meant" to take, the probability distribution over the action that
//! is actually executed.

use crate::error::Error;
use crate::geometry::Action;

pub trait TransitionDensity {
    /// Probability that `executed` happens when `chosen` was intended.
    fn probability(&self, chosen: Action, executed: Action) -> f64;
}

/// A discrete density parameterized by the four possible offsets from
/// the chosen action in the cyclic ordering `Up, Right, Down, Left`:
/// staying on the chosen action, veering right, reversing, or veering
/// left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscreteTransitionDensity {
    chosen: f64,
    right: f64,
    opposite: f64,
    left: f64,
}

const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

impl DiscreteTransitionDensity {
    pub fn new(chosen: f64, right: f64, opposite: f64, left: f64) -> Result<Self, Error> {
        for (name, p) in [
            ("chosen", chosen),
            ("right", right),
            ("opposite", opposite),
            ("left", left),
        ] {
            if p < 0.0 {
                return Err(Error::Config(format!(
                    "transition density probability '{name}' must be non-negative, got {p}"
                )));
            }
        }
        let sum = chosen + right + opposite + left;
        if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
            return Err(Error::Config(format!(
                "transition density probabilities must sum to 1, got {sum}"
            )));
        }
        Ok(DiscreteTransitionDensity {
            chosen,
            right,
            opposite,
            left,
        })
    }

    /// The deterministic density: the chosen action always executes.
    pub fn deterministic() -> Self {
        DiscreteTransitionDensity {
            chosen: 1.0,
            right: 0.0,
            opposite: 0.0,
            left: 0.0,
        }
    }
}

impl TransitionDensity for DiscreteTransitionDensity {
    fn probability(&self, chosen: Action, executed: Action) -> f64 {
        match chosen.offset_from(executed) {
            0 => self.chosen,
            1 => self.right,
            2 => self.opposite,
            _ => self.left,
        }
    }
}
