//! Per-player best-response subproblems.
//!
//! A [`Subproblem`] freezes every other player at the current profile and
//! exposes player `i`'s payoff as a function of their own row only. The
//! payoff is a benefit to maximize; solvers minimize, so [`Subproblem::cost`]
//! and [`Subproblem::cost_gradient`] flip the sign of value and gradient
//! together.

use crate::equilibrium::game::{Payoff, PayoffOracle};
use crate::equilibrium::strategy::JointStrategy;

/// Box constraint on one decision variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Lower bound (inclusive).
    pub lower: f64,
    /// Upper bound (inclusive, may be `+∞`).
    pub upper: f64,
}

impl Bounds {
    /// `[0, +∞)`.
    pub const NON_NEGATIVE: Bounds = Bounds {
        lower: 0.0,
        upper: f64::INFINITY,
    };

    /// Whether `lower <= upper`.
    pub fn is_consistent(&self) -> bool {
        self.lower <= self.upper
    }

    /// Whether `x` lies in the box.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    /// Closest point of the box to `x`.
    pub fn project(&self, x: f64) -> f64 {
        x.max(self.lower).min(self.upper)
    }
}

/// One player's optimization problem for one round.
pub struct Subproblem<'a, O: PayoffOracle> {
    player: usize,
    initial: Vec<f64>,
    bounds: Vec<Bounds>,
    oracle: &'a O,
    profile: &'a JointStrategy,
}

impl<'a, O: PayoffOracle> Subproblem<'a, O> {
    /// Player owning the decision variables.
    pub fn player(&self) -> usize {
        self.player
    }

    /// Starting point: the player's row of the current profile.
    pub fn initial_point(&self) -> &[f64] {
        &self.initial
    }

    /// Per-variable bounds.
    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    /// Number of decision variables.
    pub fn dimension(&self) -> usize {
        self.initial.len()
    }

    /// Payoff and gradient at `x`, other players held at the current profile.
    pub fn payoff(&self, x: &[f64]) -> Payoff {
        let candidate = self.profile.with_row(self.player, x);
        self.oracle.evaluate(self.player, &candidate)
    }

    /// Value to maximize at `x`.
    pub fn objective(&self, x: &[f64]) -> f64 {
        self.payoff(x).value
    }

    /// Minimization view: `(-f(x), -∇f(x))`.
    pub fn cost_and_gradient(&self, x: &[f64]) -> (f64, Vec<f64>) {
        let Payoff { value, gradient } = self.payoff(x);
        (-value, gradient.into_iter().map(|g| -g).collect())
    }

    /// Minimization view of the value: `-f(x)`.
    pub fn cost(&self, x: &[f64]) -> f64 {
        -self.objective(x)
    }

    /// Minimization view of the gradient: `-∇f(x)`.
    pub fn cost_gradient(&self, x: &[f64]) -> Vec<f64> {
        self.cost_and_gradient(x).1
    }
}

/// Builds [`Subproblem`]s from a fixed profile.
pub struct SubproblemBuilder<'a, O: PayoffOracle> {
    oracle: &'a O,
    profile: &'a JointStrategy,
}

impl<'a, O: PayoffOracle> SubproblemBuilder<'a, O> {
    /// Builder bound to one round's immutable profile.
    pub fn new(oracle: &'a O, profile: &'a JointStrategy) -> Self {
        Self { oracle, profile }
    }

    /// Subproblem for `player`: start at their row, every variable in `[0, +∞)`.
    pub fn build(&self, player: usize) -> Subproblem<'a, O> {
        let initial = self.profile.row(player).to_vec();
        let bounds = vec![Bounds::NON_NEGATIVE; initial.len()];

        Subproblem {
            player,
            initial,
            bounds,
            oracle: self.oracle,
            profile: self.profile,
        }
    }
}
