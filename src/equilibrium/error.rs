//! Error types for the equilibrium solver.

use crate::equilibrium::config::ConfigError;
use crate::equilibrium::nlp::SolveStatus;

/// Errors that terminate an equilibrium run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EquilibriumError {
    /// The game or the start profile is malformed. Raised before round 0.
    #[error("invalid game spec: {0}")]
    InvalidGameSpec(String),

    /// The solve configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A player's best-response subproblem did not produce a usable optimum.
    #[error("round {round}: subproblem for player {player} failed ({status:?}): {detail}")]
    SubproblemFailed {
        /// Round index in which the failure happened.
        round: usize,
        /// Player whose subproblem failed.
        player: usize,
        /// Status reported by the NLP solver.
        status: SolveStatus,
        /// Solver diagnostic.
        detail: String,
    },

    /// The worker pool for a parallel executor could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl From<rayon::ThreadPoolBuildError> for EquilibriumError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        EquilibriumError::WorkerPool(err.to_string())
    }
}

/// Errors raised while constructing a [`JointStrategy`](crate::equilibrium::JointStrategy).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrategyError {
    /// No rows, or rows of zero length.
    #[error("strategy matrix must have at least one row and one column")]
    Empty,

    /// Rows of different lengths.
    #[error("row {row} has length {found}, expected {expected}")]
    Ragged {
        /// Offending row.
        row: usize,
        /// Length of row 0.
        expected: usize,
        /// Length of the offending row.
        found: usize,
    },
}

impl From<StrategyError> for EquilibriumError {
    fn from(err: StrategyError) -> Self {
        EquilibriumError::InvalidGameSpec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::ThreadPoolBuilder;

    #[test]
    fn test_pool_error_is_not_a_game_error() {
        // the global pool can only be set up once
        let _ = ThreadPoolBuilder::new().build_global();
        let err: EquilibriumError = ThreadPoolBuilder::new().build_global().unwrap_err().into();
        assert!(matches!(err, EquilibriumError::WorkerPool(_)));
    }

    #[test]
    fn test_strategy_error_converts() {
        let err: EquilibriumError = StrategyError::Empty.into();
        assert!(matches!(err, EquilibriumError::InvalidGameSpec(_)));
    }
}
