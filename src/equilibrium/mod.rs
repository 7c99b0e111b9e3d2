//! Best-response equilibrium solver module.
//!
//! This module computes Nash equilibria of simultaneous games with
//! continuous, non-negative strategies by iterating the best-response
//! operator to a fixed point.
//!
//! # Overview
//!
//! Each round:
//! 1. Every player's payoff is turned into a [`Subproblem`] over their own
//!    strategy, with all other players frozen at the current profile
//! 2. An [`NlpSolver`] maximizes each subproblem within `[0, +∞)` bounds
//! 3. The optimal rows are assembled into the next profile
//!
//! The loop stops when the largest relative change of a round falls below the
//! tolerance, or when the round cap is hit.
//!
//! # Usage
//!
//! 1. Implement [`PayoffOracle`] for your model
//! 2. Wrap it in a [`GameSpec`]
//! 3. Call [`solve_equilibrium`] with a [`SolveConfig`] and a solver
//!
//! # Example
//!
//! ```
//! use br_equilibrium::equilibrium::{solve_equilibrium_default, GameSpec, ProjectedGradient, SolveConfig};
//! use br_equilibrium::games::linear::LinearResponseGame;
//!
//! let game = GameSpec::new(LinearResponseGame::new(3, 2, 2.0, 0.25)).unwrap();
//! let config = SolveConfig::precise();
//! let outcome = solve_equilibrium_default(&game, &config, &ProjectedGradient::new()).unwrap();
//!
//! assert!(outcome.converged());
//! let expected = 2.0 / 1.25;
//! assert!(outcome.profile.as_slice().iter().all(|v| (v - expected).abs() < 1e-5));
//! ```
//!
//! # Theory
//!
//! A profile `x*` is a Nash equilibrium when every row is a best response to
//! the others:
//! ```text
//! x*_i ∈ argmax_{x ≥ 0} u_i(x, x*_{-i})   for every player i
//! ```
//! Jacobi iteration applies all best responses simultaneously. It converges
//! whenever the joint best-response map is a contraction near the
//! equilibrium.

pub mod config;
pub mod error;
pub mod game;
pub mod nlp;
pub mod round;
pub mod solver;
pub mod strategy;
pub mod subproblem;

// Re-export main types for convenient access
pub use config::{
    ConfigError, ConvergencePolicy, DeltaPoint, IterationStats, RoundExecutor, SolveConfig,
};
pub use error::{EquilibriumError, StrategyError};
pub use game::{GameSpec, Payoff, PayoffOracle};
pub use nlp::{NlpOptions, NlpSolver, ProjectedGradient, SolveFailure, SolveResult, SolveStatus};
pub use round::{BestResponseRound, OrderError, RoundFailure};
pub use solver::{
    solve_equilibrium, solve_equilibrium_default, FixedPointIterator, IterationOutcome,
    RoundReport, Termination,
};
pub use strategy::JointStrategy;
pub use subproblem::{Bounds, Subproblem, SubproblemBuilder};
