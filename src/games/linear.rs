//! Linear best-response game for solver validation.
//!
//! Every player wants each strategy component close to a target that falls
//! linearly in what the other players do:
//!
//! ```text
//! u_i(x) = -½ Σ_k (x_ik - (a - b·m_{-i,k}))²
//! ```
//!
//! where `m_{-i,k}` is the mean of the other players' `k`-th components. The
//! best response is `max(0, a - b·m)`; for `a ≥ 0` the symmetric equilibrium
//! is `a / (1 + b)` and the Jacobi iteration error contracts by `-b` per round.

use crate::equilibrium::game::{Payoff, PayoffOracle};
use crate::equilibrium::strategy::JointStrategy;

/// Quadratic game with closed-form linear best responses.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearResponseGame {
    num_players: usize,
    dimension: usize,
    /// Intercept of the best-response line.
    pub a: f64,
    /// Slope (reaction strength) of the best-response line.
    pub b: f64,
}

impl LinearResponseGame {
    /// Create a game with `num_players` players of dimension `dimension`.
    pub fn new(num_players: usize, dimension: usize, a: f64, b: f64) -> Self {
        Self {
            num_players,
            dimension,
            a,
            b,
        }
    }

    /// Mean of the other players' `k`-th components (0 for a single player).
    fn others_mean(&self, player: usize, profile: &JointStrategy, k: usize) -> f64 {
        if self.num_players < 2 {
            return 0.0;
        }
        let total: f64 = (0..self.num_players)
            .filter(|&j| j != player)
            .map(|j| profile.get(j, k))
            .sum();
        total / (self.num_players - 1) as f64
    }

    /// Unconstrained target `a - b·m`.
    fn target(&self, player: usize, profile: &JointStrategy, k: usize) -> f64 {
        self.a - self.b * self.others_mean(player, profile, k)
    }

    /// Closed-form best response of `player` to `profile`.
    pub fn best_response(&self, player: usize, profile: &JointStrategy) -> Vec<f64> {
        (0..self.dimension)
            .map(|k| self.target(player, profile, k).max(0.0))
            .collect()
    }

    /// The symmetric equilibrium profile.
    pub fn equilibrium(&self) -> JointStrategy {
        let value = if self.num_players < 2 {
            self.a.max(0.0)
        } else {
            self.a.max(0.0) / (1.0 + self.b)
        };
        JointStrategy::constant(self.num_players, self.dimension, value)
    }
}

impl PayoffOracle for LinearResponseGame {
    fn num_players(&self) -> usize {
        self.num_players
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn evaluate(&self, player: usize, profile: &JointStrategy) -> Payoff {
        let x = profile.row(player);
        let mut value = 0.0;
        let mut gradient = Vec::with_capacity(self.dimension);

        for (k, &xk) in x.iter().enumerate() {
            let gap = xk - self.target(player, profile, k);
            value -= 0.5 * gap * gap;
            gradient.push(-gap);
        }

        Payoff { value, gradient }
    }

    fn name(&self) -> String {
        format!("linear-response(a={}, b={})", self.a, self.b)
    }
}
