//! Best-response fixed-point iteration.
//!
//! Starting from a profile, apply the best-response operator round after
//! round until the largest relative change of a round drops below
//! `round_tol`, the round cap is hit, or a subproblem fails.
//!
//! ```text
//! Init ──► Running ──┬──► Converged            (Δ < tol at round k)
//!            ▲   │   ├──► MaxIterationsReached (max_rounds exhausted)
//!            └───┘   └──► Failed               (a subproblem failed)
//! ```
//!
//! Rounds are strictly sequential: round `k + 1` reads the complete profile
//! produced by round `k`.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::equilibrium::config::{IterationStats, SolveConfig};
use crate::equilibrium::error::EquilibriumError;
use crate::equilibrium::game::{GameSpec, PayoffOracle};
use crate::equilibrium::nlp::NlpSolver;
use crate::equilibrium::round::{BestResponseRound, RoundFailure};
use crate::equilibrium::strategy::JointStrategy;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Round `round` changed every entry by less than the tolerance.
    ToleranceMet {
        /// Zero-based index of the converging round.
        round: usize,
    },
    /// The round cap was hit first.
    MaxIterationsReached,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationOutcome {
    /// Final profile: the converged one, or the last computed one.
    pub profile: JointStrategy,
    /// Termination reason.
    pub termination: Termination,
    /// Run statistics.
    pub stats: IterationStats,
}

impl IterationOutcome {
    /// Whether the tolerance was met.
    pub fn converged(&self) -> bool {
        matches!(self.termination, Termination::ToleranceMet { .. })
    }
}

/// Progress report passed to [`FixedPointIterator::run_with_callback`].
#[derive(Debug, Clone)]
pub struct RoundReport {
    /// Index of the round just completed.
    pub round: usize,
    /// Largest relative change of that round.
    pub delta: f64,
    /// Time since the run started.
    pub elapsed_seconds: f64,
}

/// Drives best-response rounds to a fixed point.
///
/// # Example
/// ```
/// use br_equilibrium::equilibrium::{FixedPointIterator, GameSpec, ProjectedGradient, SolveConfig};
/// use br_equilibrium::games::linear::LinearResponseGame;
///
/// let game = GameSpec::new(LinearResponseGame::new(2, 2, 1.0, 0.5)).unwrap();
/// let config = SolveConfig::precise();
/// let solver = ProjectedGradient::new();
/// let iterator = FixedPointIterator::new(&game, &config, &solver).unwrap();
///
/// let outcome = iterator.run(game.default_start()).unwrap();
/// assert!(outcome.converged());
/// ```
pub struct FixedPointIterator<'g, O: PayoffOracle, S: NlpSolver> {
    config: &'g SolveConfig,
    round: BestResponseRound<'g, O, S>,
    game: &'g GameSpec<O>,
}

impl<'g, O: PayoffOracle, S: NlpSolver> FixedPointIterator<'g, O, S> {
    /// Validate the configuration and prepare the round executor.
    pub fn new(
        game: &'g GameSpec<O>,
        config: &'g SolveConfig,
        solver: &'g S,
    ) -> Result<Self, EquilibriumError> {
        config.validate()?;
        let round =
            BestResponseRound::new(game, solver, config.nlp_options(), config.executor)?;

        Ok(Self {
            config,
            round,
            game,
        })
    }

    /// The round runner used by this iterator.
    pub fn round(&self) -> &BestResponseRound<'g, O, S> {
        &self.round
    }

    /// Iterate from `start` until convergence, the round cap, or a failure.
    pub fn run(&self, start: JointStrategy) -> Result<IterationOutcome, EquilibriumError> {
        self.run_with_callback(start, |_| {})
    }

    /// Same as [`run`](Self::run), calling `callback` after every completed round.
    pub fn run_with_callback<F>(
        &self,
        start: JointStrategy,
        mut callback: F,
    ) -> Result<IterationOutcome, EquilibriumError>
    where
        F: FnMut(&RoundReport),
    {
        self.game.check_profile(&start)?;

        let start_time = Instant::now();
        let mut stats = IterationStats::new();
        let mut profile = start;

        for k in 0..self.config.max_rounds {
            let next = self.round.run(&profile).map_err(|RoundFailure { player, failure }| {
                log::warn!(
                    "round {}: player {} subproblem failed ({:?}): {}",
                    k,
                    player,
                    failure.status,
                    failure.detail
                );
                EquilibriumError::SubproblemFailed {
                    round: k,
                    player,
                    status: failure.status,
                    detail: failure.detail,
                }
            })?;

            let delta = profile.max_relative_change(&next, &self.config.convergence);
            stats.record_round(k, delta);
            log::debug!("round {}: delta = {:.3e}", k, delta);

            callback(&RoundReport {
                round: k,
                delta,
                elapsed_seconds: start_time.elapsed().as_secs_f64(),
            });

            if delta < self.config.round_tol {
                log::info!("exited on round {} (delta {:.3e})", k, delta);
                let termination = Termination::ToleranceMet { round: k };
                return Ok(self.finish(next, termination, stats, start_time));
            }

            profile = next;
        }

        log::info!(
            "reached max rounds ({}) without meeting tolerance {:e}",
            self.config.max_rounds,
            self.config.round_tol
        );
        Ok(self.finish(profile, Termination::MaxIterationsReached, stats, start_time))
    }

    fn finish(
        &self,
        profile: JointStrategy,
        termination: Termination,
        mut stats: IterationStats,
        start_time: Instant,
    ) -> IterationOutcome {
        stats.elapsed_seconds = start_time.elapsed().as_secs_f64();
        stats.update_rate();
        IterationOutcome {
            profile,
            termination,
            stats,
        }
    }
}

/// Solve for an equilibrium from `start`, or from the all-ones profile when `None`.
pub fn solve_equilibrium<O: PayoffOracle, S: NlpSolver>(
    game: &GameSpec<O>,
    start: Option<JointStrategy>,
    config: &SolveConfig,
    solver: &S,
) -> Result<IterationOutcome, EquilibriumError> {
    let start = start.unwrap_or_else(|| game.default_start());
    log::info!(
        "solving {} ({} players, dimension {}) with {}",
        game.oracle().name(),
        game.num_players(),
        game.dimension(),
        solver.name()
    );
    FixedPointIterator::new(game, config, solver)?.run(start)
}

/// [`solve_equilibrium`] from the default all-ones start.
pub fn solve_equilibrium_default<O: PayoffOracle, S: NlpSolver>(
    game: &GameSpec<O>,
    config: &SolveConfig,
    solver: &S,
) -> Result<IterationOutcome, EquilibriumError> {
    solve_equilibrium(game, None, config, solver)
}
