//! # br-equilibrium
//!
//! A best-response fixed-point solver for Nash equilibria of N-player games
//! with continuous, non-negative strategies.
//!
//! ## Features
//!
//! - **Generic Engine**: Works with any model implementing the `PayoffOracle` trait
//! - **Pluggable Optimizer**: Best responses come from any `NlpSolver`; a
//!   bound-constrained projected-gradient solver is included
//! - **Parallel Rounds**: Per-player solves within a round can fork-join on a worker pool
//! - **Explicit Failures**: Solver non-convergence stops the run and names the player
//!
//! ## Quick Start
//!
//! ```ignore
//! use br_equilibrium::equilibrium::{solve_equilibrium_default, GameSpec, ProjectedGradient, SolveConfig};
//!
//! // 1. Implement the PayoffOracle trait for your model
//! // 2. Wrap it in a GameSpec
//! let game = GameSpec::new(my_model)?;
//!
//! // 3. Solve
//! let outcome = solve_equilibrium_default(&game, &SolveConfig::default(), &ProjectedGradient::new())?;
//! println!("{}", outcome.profile);
//! ```
//!
//! ## Modules
//!
//! - [`equilibrium`]: Fixed-point iteration engine and best-response subproblems
//! - [`games`]: Model implementations (linear validation game, safety race)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     FixedPointIterator                          │
//! │  - Round loop             - Convergence test                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                     BestResponseRound (sequential | fork-join)
//!                               │ one per player
//!                               ▼
//!              SubproblemBuilder ──► NlpSolver
//!                               │
//!                               │ implements PayoffOracle
//!                               ▼
//!              ┌────────────────┴────────────────┐
//!              ▼                                 ▼
//!     ┌─────────────────┐               ┌─────────────────┐
//!     │ LinearResponse  │               │   SafetyRace    │
//!     └─────────────────┘               └─────────────────┘
//! ```

#![warn(missing_docs)]

/// Best-response equilibrium engine.
///
/// This is the core module containing the fixed-point iteration.
pub mod equilibrium;

/// Game model implementations.
///
/// Contains a validation game with a closed-form equilibrium and the
/// safety/performance race model.
pub mod games;

// Re-export commonly used types at crate root for convenience
pub use equilibrium::{
    solve_equilibrium, solve_equilibrium_default, EquilibriumError, GameSpec, IterationOutcome,
    JointStrategy, NlpSolver, PayoffOracle, ProjectedGradient, SolveConfig,
};
