//! Nonlinear-program solver boundary.
//!
//! The iterator never assumes a particular optimizer. It hands each
//! [`Subproblem`] to an [`NlpSolver`] together with per-call [`NlpOptions`]
//! and receives a [`SolveResult`]. Anything other than
//! [`SolveStatus::Optimal`] is a failure the caller has to deal with; the
//! last iterate of a solver that gave up is never used as a best response.
//!
//! [`ProjectedGradient`] is the bundled implementation: a bound-constrained
//! first-order method with exact gradients and an Armijo line search along
//! the projection arc. Once two payoff values can no longer be told apart in
//! floating point, the line search switches to the slope at the trial point,
//! and a point that is stationary to `stall_tolerance` counts as optimal.

use serde::{Deserialize, Serialize};

use crate::equilibrium::game::PayoffOracle;
use crate::equilibrium::subproblem::{Bounds, Subproblem};

/// Per-call solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NlpOptions {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Stationarity tolerance.
    pub tolerance: f64,
}

impl Default for NlpOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5_000,
            tolerance: 1e-6,
        }
    }
}

/// Terminal status of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Converged to a local optimum within tolerance.
    Optimal,
    /// Stopped at the iteration cap.
    IterationLimit,
    /// The bounds admit no point, or the start lies outside them.
    Infeasible,
    /// Non-finite values, malformed gradients, or a stalled line search.
    InternalError,
}

impl SolveStatus {
    /// Whether the returned point may be used as a best response.
    pub fn is_success(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

/// Output of [`NlpSolver::solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    /// Final iterate (meaningful only when `status` is `Optimal`).
    pub point: Vec<f64>,
    /// Payoff at `point`, in the maximization sense.
    pub value: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Terminal status.
    pub status: SolveStatus,
    /// Diagnostic message.
    pub message: String,
}

/// A solve that did not produce a usable point.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveFailure {
    /// Status reported by the solver.
    pub status: SolveStatus,
    /// Diagnostic message.
    pub detail: String,
}

impl SolveResult {
    /// Successful result.
    pub fn optimal(point: Vec<f64>, value: f64, iterations: usize) -> Self {
        Self {
            point,
            value,
            iterations,
            status: SolveStatus::Optimal,
            message: String::from("converged"),
        }
    }

    /// Successful result stopped by roundoff rather than the tolerance.
    pub fn at_roundoff(point: Vec<f64>, value: f64, iterations: usize) -> Self {
        Self {
            message: String::from("converged to roundoff"),
            ..Self::optimal(point, value, iterations)
        }
    }

    /// Failed result with a diagnostic.
    pub fn failed(
        status: SolveStatus,
        point: Vec<f64>,
        iterations: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            point,
            value: f64::NAN,
            iterations,
            status,
            message: message.into(),
        }
    }

    /// The point, if the solve succeeded.
    pub fn into_best_response(self) -> Result<Vec<f64>, SolveFailure> {
        if self.status.is_success() {
            Ok(self.point)
        } else {
            Err(SolveFailure {
                status: self.status,
                detail: self.message,
            })
        }
    }
}

/// A bound-constrained optimizer for best-response subproblems.
///
/// Solvers are passed by reference into every call, so the same instance can
/// serve many subproblems and many worker threads at once.
pub trait NlpSolver: Sync {
    /// Maximize the subproblem's payoff within its bounds.
    fn solve<O: PayoffOracle>(&self, problem: &Subproblem<'_, O>, options: &NlpOptions)
        -> SolveResult;

    /// Solver name, used in logs.
    fn name(&self) -> &'static str {
        "nlp"
    }
}

/// Projected gradient descent on `-payoff` with Armijo backtracking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedGradient {
    /// Step length tried on the first iteration.
    pub initial_step: f64,
    /// Upper limit for the trial step.
    pub max_step: f64,
    /// Backtracking factor in `(0, 1)`.
    pub shrink: f64,
    /// Sufficient-decrease constant in `(0, 1)`.
    pub armijo: f64,
    /// Maximum halvings per line search.
    pub max_backtracks: usize,
    /// Stationarity accepted once the payoff stops changing beyond roundoff.
    pub stall_tolerance: f64,
}

/// Relative size of a cost change indistinguishable from rounding error.
const ROUNDOFF: f64 = 8.0 * f64::EPSILON;

impl Default for ProjectedGradient {
    fn default() -> Self {
        Self {
            initial_step: 1.0,
            max_step: 1e6,
            shrink: 0.5,
            armijo: 1e-4,
            max_backtracks: 60,
            stall_tolerance: 1e-6,
        }
    }
}

impl ProjectedGradient {
    /// Create a solver with default line-search settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the first trial step.
    pub fn with_initial_step(mut self, step: f64) -> Self {
        self.initial_step = step;
        self
    }

    /// Builder method: set the stationarity accepted at roundoff.
    pub fn with_stall_tolerance(mut self, tol: f64) -> Self {
        self.stall_tolerance = tol;
        self
    }

    /// `P(x - t g)`.
    fn project_step(x: &[f64], g: &[f64], t: f64, bounds: &[Bounds]) -> Vec<f64> {
        x.iter()
            .zip(g)
            .zip(bounds)
            .map(|((&xi, &gi), b)| b.project(xi - t * gi))
            .collect()
    }

    /// `‖x - P(x - g)‖_∞`, zero exactly at KKT points of the box problem.
    fn stationarity(x: &[f64], g: &[f64], bounds: &[Bounds]) -> f64 {
        x.iter()
            .zip(g)
            .zip(bounds)
            .map(|((&xi, &gi), b)| (xi - b.project(xi - gi)).abs())
            .fold(0.0, f64::max)
    }
}

impl NlpSolver for ProjectedGradient {
    fn solve<O: PayoffOracle>(
        &self,
        problem: &Subproblem<'_, O>,
        options: &NlpOptions,
    ) -> SolveResult {
        let bounds = problem.bounds();
        let mut x = problem.initial_point().to_vec();
        let dim = x.len();

        if let Some(j) = bounds.iter().position(|b| !b.is_consistent()) {
            return SolveResult::failed(
                SolveStatus::Infeasible,
                x,
                0,
                format!("variable {} has lower bound above upper bound", j),
            );
        }
        if let Some(j) = x.iter().zip(bounds).position(|(&xi, b)| !b.contains(xi)) {
            return SolveResult::failed(
                SolveStatus::Infeasible,
                x,
                0,
                format!("initial point violates bounds on variable {}", j),
            );
        }

        let (mut cost, mut grad) = problem.cost_and_gradient(&x);
        if let Some(msg) = check_evaluation(cost, &grad, dim) {
            return SolveResult::failed(SolveStatus::InternalError, x, 0, msg);
        }

        let mut step = self.initial_step;
        for iteration in 0..options.max_iterations {
            if Self::stationarity(&x, &grad, bounds) <= options.tolerance {
                return SolveResult::optimal(x, -cost, iteration);
            }

            let mut t = step;
            let mut accepted = None;
            for _ in 0..self.max_backtracks {
                let trial = Self::project_step(&x, &grad, t, bounds);
                let (trial_cost, trial_grad) = problem.cost_and_gradient(&trial);

                let decrease: f64 = grad
                    .iter()
                    .zip(x.iter().zip(&trial))
                    .map(|(&g, (&xi, &ti))| g * (xi - ti))
                    .sum();

                let finite = trial_cost.is_finite() && trial_grad.iter().all(|g| g.is_finite());
                let flat = (cost - trial_cost).abs() <= noise(cost);
                let sufficient = if flat {
                    // values are noise here; still descending at the trial point
                    let slope: f64 = trial_grad
                        .iter()
                        .zip(trial.iter().zip(&x))
                        .map(|(&g, (&ti, &xi))| g * (ti - xi))
                        .sum();
                    slope <= 0.0
                } else {
                    trial_cost <= cost - self.armijo * decrease
                };
                if finite && sufficient {
                    accepted = Some((trial, trial_cost, trial_grad, t));
                    break;
                }
                t *= self.shrink;
            }

            let Some((trial, trial_cost, trial_grad, t)) = accepted else {
                if Self::stationarity(&x, &grad, bounds) <= self.stall_tolerance {
                    return SolveResult::at_roundoff(x, -cost, iteration);
                }
                return SolveResult::failed(
                    SolveStatus::InternalError,
                    x,
                    iteration,
                    format!(
                        "line search made no progress after {} backtracks",
                        self.max_backtracks
                    ),
                );
            };

            if let Some(msg) = check_evaluation(trial_cost, &trial_grad, dim) {
                return SolveResult::failed(SolveStatus::InternalError, trial, iteration + 1, msg);
            }

            let stalled = (cost - trial_cost).abs() <= noise(cost);
            x = trial;
            cost = trial_cost;
            grad = trial_grad;
            step = (2.0 * t).min(self.max_step);

            let kkt = Self::stationarity(&x, &grad, bounds);
            if stalled && kkt > options.tolerance && kkt <= self.stall_tolerance {
                return SolveResult::at_roundoff(x, -cost, iteration + 1);
            }
        }

        if Self::stationarity(&x, &grad, bounds) <= options.tolerance {
            return SolveResult::optimal(x, -cost, options.max_iterations);
        }

        SolveResult::failed(
            SolveStatus::IterationLimit,
            x,
            options.max_iterations,
            format!("not stationary after {} iterations", options.max_iterations),
        )
    }

    fn name(&self) -> &'static str {
        "projected-gradient"
    }
}

fn noise(cost: f64) -> f64 {
    ROUNDOFF * cost.abs().max(1.0)
}

fn check_evaluation(cost: f64, grad: &[f64], dim: usize) -> Option<String> {
    if !cost.is_finite() {
        return Some(format!("payoff is not finite ({})", -cost));
    }
    if grad.len() != dim {
        return Some(format!("gradient has {} entries, expected {}", grad.len(), dim));
    }
    if grad.iter().any(|g| !g.is_finite()) {
        return Some("gradient is not finite".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::game::Payoff;
    use crate::equilibrium::strategy::JointStrategy;
    use crate::equilibrium::subproblem::SubproblemBuilder;

    /// Single player, u(x) = -½‖x - target‖², optionally broken.
    struct Quadratic {
        target: Vec<f64>,
        scale: f64,
        offset: f64,
        nan: bool,
    }

    impl Quadratic {
        fn new(target: Vec<f64>) -> Self {
            Self {
                target,
                scale: 1.0,
                offset: 0.0,
                nan: false,
            }
        }
    }

    impl PayoffOracle for Quadratic {
        fn num_players(&self) -> usize {
            1
        }
        fn dimension(&self) -> usize {
            self.target.len()
        }
        fn evaluate(&self, player: usize, profile: &JointStrategy) -> Payoff {
            let x = profile.row(player);
            if self.nan {
                return Payoff {
                    value: f64::NAN,
                    gradient: vec![0.0; x.len()],
                };
            }
            let value = self.offset
                - 0.5
                    * self.scale
                * x.iter()
                    .zip(&self.target)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>();
            let gradient = x
                .iter()
                .zip(&self.target)
                .map(|(a, b)| -self.scale * (a - b))
                .collect();
            Payoff { value, gradient }
        }
    }

    fn opts(max_iterations: usize, tolerance: f64) -> NlpOptions {
        NlpOptions {
            max_iterations,
            tolerance,
        }
    }

    #[test]
    fn test_interior_maximum() {
        let oracle = Quadratic::new(vec![2.0, 0.5]);
        let start = JointStrategy::constant(1, 2, 1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        let result = ProjectedGradient::new().solve(&sub, &opts(100, 1e-10));
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!((result.point[0] - 2.0).abs() < 1e-9);
        assert!((result.point[1] - 0.5).abs() < 1e-9);
        assert!(result.value.abs() < 1e-12);
    }

    #[test]
    fn test_maximizes_not_minimizes() {
        // if the sign were inverted the solver would run away from the target
        let oracle = Quadratic::new(vec![3.0]);
        let start = JointStrategy::constant(1, 1, 1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        let result = ProjectedGradient::new().solve(&sub, &opts(100, 1e-10));
        let point = result.into_best_response().unwrap();
        assert!((point[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_bound_is_active() {
        let oracle = Quadratic::new(vec![-1.0, 1.5]);
        let start = JointStrategy::constant(1, 2, 1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        let result = ProjectedGradient::new().solve(&sub, &opts(100, 1e-10));
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.point[0], 0.0);
        assert!((result.point[1] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_already_optimal_returns_start() {
        let oracle = Quadratic::new(vec![1.0, 1.0]);
        let start = JointStrategy::constant(1, 2, 1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        let result = ProjectedGradient::new().solve(&sub, &opts(10, 1e-12));
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.point, vec![1.0, 1.0]);
    }

    #[test]
    fn test_iteration_limit_is_reported() {
        // tiny steps: one iteration cannot reach the target
        let oracle = Quadratic::new(vec![5.0]);
        let start = JointStrategy::constant(1, 1, 1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        let solver = ProjectedGradient::new().with_initial_step(1e-3);
        let result = solver.solve(&sub, &opts(1, 1e-10));
        assert_eq!(result.status, SolveStatus::IterationLimit);

        let failure = result.into_best_response().unwrap_err();
        assert_eq!(failure.status, SolveStatus::IterationLimit);
    }

    #[test]
    fn test_non_finite_payoff_is_internal_error() {
        let mut oracle = Quadratic::new(vec![1.0]);
        oracle.nan = true;
        let start = JointStrategy::constant(1, 1, 1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        let result = ProjectedGradient::new().solve(&sub, &opts(10, 1e-6));
        assert_eq!(result.status, SolveStatus::InternalError);
        assert!(result.message.contains("not finite"));
    }

    #[test]
    fn test_start_outside_bounds_is_infeasible() {
        let oracle = Quadratic::new(vec![1.0]);
        let start = JointStrategy::constant(1, 1, -1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        let result = ProjectedGradient::new().solve(&sub, &opts(10, 1e-6));
        assert_eq!(result.status, SolveStatus::Infeasible);
    }

    #[test]
    fn test_badly_scaled_problem_converges() {
        let mut oracle = Quadratic::new(vec![0.25, 4.0]);
        oracle.scale = 50.0;
        let start = JointStrategy::constant(1, 2, 1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        let result = ProjectedGradient::new().solve(&sub, &opts(500, 1e-8));
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!((result.point[0] - 0.25).abs() < 1e-6);
        assert!((result.point[1] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_large_offset_converges_past_roundoff() {
        // payoff differences drop below the resolution of 1e6 long before the
        // gradient reaches the tolerance
        let mut oracle = Quadratic::new(vec![0.25, 4.0]);
        oracle.scale = 50.0;
        oracle.offset = 1e6;
        let start = JointStrategy::constant(1, 2, 1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        let result = ProjectedGradient::new().solve(&sub, &opts(2_000, 1e-12));
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!((result.point[0] - 0.25).abs() < 1e-7);
        assert!((result.point[1] - 4.0).abs() < 1e-7);
    }

    #[test]
    fn test_roundoff_stop_respects_stall_tolerance() {
        let mut oracle = Quadratic::new(vec![0.25, 4.0]);
        oracle.scale = 50.0;
        oracle.offset = 1e6;
        let start = JointStrategy::constant(1, 2, 1.0);
        let sub = SubproblemBuilder::new(&oracle, &start).build(0);

        // a zero stall tolerance only ever stops on the real tolerance
        let solver = ProjectedGradient::new().with_stall_tolerance(0.0);
        let result = solver.solve(&sub, &opts(2_000, 1e-9));
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.message, "converged");
    }
}
