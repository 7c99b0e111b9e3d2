//! Configuration options for the best-response iteration.
//!
//! This module provides the configuration struct that controls round limits,
//! tolerances for both the outer fixed-point loop and the inner NLP solves,
//! the zero-denominator policy of the convergence test, and how per-player
//! solves are scheduled inside a round.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::equilibrium::nlp::NlpOptions;

/// How the per-player solves of one round are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundExecutor {
    /// Solve players one after another on the calling thread.
    Sequential,
    /// Fork-join over a worker pool. `threads = None` uses all available cores.
    Parallel {
        /// Worker count.
        threads: Option<usize>,
    },
}

impl Default for RoundExecutor {
    fn default() -> Self {
        RoundExecutor::Sequential
    }
}

/// Zero-denominator handling for the relative-change convergence test.
///
/// Entries whose previous value satisfies `|prev| <= zero_floor` are compared
/// by absolute difference instead of relative difference. With the default
/// floor of `0.0` only exact zeros fall back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePolicy {
    /// Magnitude at or below which a previous value counts as zero.
    pub zero_floor: f64,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self { zero_floor: 0.0 }
    }
}

/// Configuration for an equilibrium run.
///
/// # Example
/// ```
/// use br_equilibrium::equilibrium::SolveConfig;
///
/// let config = SolveConfig::default().with_max_rounds(50).with_round_tol(1e-6);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveConfig {
    /// Maximum number of best-response rounds.
    pub max_rounds: usize,

    /// Stop once the largest relative change of a round is below this.
    pub round_tol: f64,

    /// Iteration cap handed to the NLP solver for every subproblem.
    pub solver_max_iter: usize,

    /// Convergence tolerance handed to the NLP solver.
    ///
    /// Should be tighter than `round_tol`; a loose inner tolerance leaves
    /// noise in every best response that the outer test then has to absorb.
    pub solver_tol: f64,

    /// Zero-denominator policy for the convergence test.
    #[serde(default)]
    pub convergence: ConvergencePolicy,

    /// Scheduling of per-player solves within a round.
    #[serde(default)]
    pub executor: RoundExecutor,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            max_rounds: 500,
            round_tol: 1e-3,
            solver_max_iter: 5_000,
            solver_tol: 1e-6,
            convergence: ConvergencePolicy::default(),
            executor: RoundExecutor::Sequential,
        }
    }
}

impl SolveConfig {
    /// Create a new SolveConfig with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight tolerances for accurate equilibria.
    pub fn precise() -> Self {
        Self {
            max_rounds: 2_000,
            round_tol: 1e-6,
            solver_max_iter: 20_000,
            solver_tol: 1e-8,
            ..Default::default()
        }
    }

    /// Loose tolerances and a parallel executor, for quick parameter sweeps.
    pub fn fast() -> Self {
        Self {
            max_rounds: 200,
            round_tol: 1e-3,
            solver_max_iter: 2_000,
            solver_tol: 1e-4,
            executor: RoundExecutor::Parallel { threads: None },
            ..Default::default()
        }
    }

    /// Builder method: set the round cap.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Builder method: set the outer tolerance.
    pub fn with_round_tol(mut self, tol: f64) -> Self {
        self.round_tol = tol;
        self
    }

    /// Builder method: set the NLP solver iteration cap and tolerance.
    pub fn with_solver(mut self, max_iter: usize, tol: f64) -> Self {
        self.solver_max_iter = max_iter;
        self.solver_tol = tol;
        self
    }

    /// Builder method: set the zero floor of the convergence test.
    pub fn with_zero_floor(mut self, zero_floor: f64) -> Self {
        self.convergence.zero_floor = zero_floor;
        self
    }

    /// Builder method: solve each round on a worker pool.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.executor = RoundExecutor::Parallel {
            threads: Some(threads),
        };
        self
    }

    /// Builder method: set the round executor.
    pub fn with_executor(mut self, executor: RoundExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Options forwarded to every NLP solve.
    pub fn nlp_options(&self) -> NlpOptions {
        NlpOptions {
            max_iterations: self.solver_max_iter,
            tolerance: self.solver_tol,
        }
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&text)
    }

    /// Parse a configuration from JSON text and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.round_tol.is_finite() && self.round_tol > 0.0) {
            return Err(ConfigError::InvalidTolerance("round", self.round_tol));
        }

        if !(self.solver_tol.is_finite() && self.solver_tol > 0.0) {
            return Err(ConfigError::InvalidTolerance("solver", self.solver_tol));
        }

        if self.solver_max_iter == 0 {
            return Err(ConfigError::ZeroSolverIterations);
        }

        let floor = self.convergence.zero_floor;
        if !(floor.is_finite() && floor >= 0.0) {
            return Err(ConfigError::InvalidZeroFloor(floor));
        }

        if let RoundExecutor::Parallel { threads: Some(0) } = self.executor {
            return Err(ConfigError::ZeroThreads);
        }

        Ok(())
    }
}

/// Errors that can occur when loading or validating a [`SolveConfig`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A tolerance is zero, negative, or not finite.
    #[error("{0} tolerance {1} must be positive and finite")]
    InvalidTolerance(&'static str, f64),
    /// The NLP solver would not be allowed a single iteration.
    #[error("solver iteration cap must be at least 1")]
    ZeroSolverIterations,
    /// The zero floor is negative or not finite.
    #[error("zero floor {0} must be non-negative and finite")]
    InvalidZeroFloor(f64),
    /// A parallel executor with zero workers.
    #[error("parallel executor needs at least one thread")]
    ZeroThreads,
    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(String),
    /// The config file is not valid JSON for this struct.
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Statistics tracked during an equilibrium run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    /// Number of rounds completed.
    pub rounds: usize,

    /// Total wall time (in seconds).
    pub elapsed_seconds: f64,

    /// Rounds per second.
    pub rounds_per_second: f64,

    /// Largest relative change of every completed round.
    pub delta_history: Vec<DeltaPoint>,
}

/// Convergence measurement of one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaPoint {
    /// Round index.
    pub round: usize,
    /// Largest relative change produced by that round.
    pub delta: f64,
}

impl IterationStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a completed round.
    pub fn record_round(&mut self, round: usize, delta: f64) {
        self.rounds = round + 1;
        self.delta_history.push(DeltaPoint { round, delta });
    }

    /// Last recorded change, if any round completed.
    pub fn last_delta(&self) -> Option<f64> {
        self.delta_history.last().map(|p| p.delta)
    }

    /// Update rounds per second based on elapsed time.
    pub fn update_rate(&mut self) {
        if self.elapsed_seconds > 0.0 {
            self.rounds_per_second = self.rounds as f64 / self.elapsed_seconds;
        }
    }
}
