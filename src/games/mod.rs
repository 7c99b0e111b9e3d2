//! Game models for the equilibrium solver.
//!
//! This module contains payoff oracles that can be solved with the generic
//! best-response engine. These serve as:
//!
//! 1. **Validation**: Games with closed-form equilibria (like the linear
//!    response game) verify that the fixed-point iteration is correct.
//!
//! 2. **Examples**: Demonstrate how to implement the `PayoffOracle` trait for
//!    new models.
//!
//! 3. **Benchmarks**: Provide standardized games for performance testing.
//!
//! ## Available Games
//!
//! - [`linear`]: Quadratic game with linear best responses and a known equilibrium
//! - [`safety_race`]: Safety/performance race with a shared disaster risk
//! - [`scenario`]: Parameter sweeps over the safety race
//!
//! ## Adding New Games
//!
//! To add a new game:
//!
//! 1. Create a new module under `src/games/`
//! 2. Implement the `PayoffOracle` trait, returning the payoff and its gradient
//! 3. Add tests that check the gradient against finite differences
//!
//! See the [`linear`] module for a complete example.

pub mod linear;
pub mod safety_race;
pub mod scenario;
