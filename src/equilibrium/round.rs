//! One best-response round.
//!
//! Every player's subproblem is built from the same immutable snapshot and
//! writes only its own output row, so per-player solves are independent
//! (Jacobi, not Gauss-Seidel). That is what lets [`RoundExecutor::Parallel`]
//! fork the solves across a worker pool and join them without locking: each
//! worker returns its row by value and the next profile is assembled only
//! after all of them finish.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use crate::equilibrium::config::RoundExecutor;
use crate::equilibrium::game::{GameSpec, PayoffOracle};
use crate::equilibrium::nlp::{NlpOptions, NlpSolver, SolveFailure, SolveStatus};
use crate::equilibrium::strategy::JointStrategy;
use crate::equilibrium::subproblem::SubproblemBuilder;

/// A round that could not produce a complete profile.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("player {player}: {failure:?}")]
pub struct RoundFailure {
    /// Lowest-indexed player whose subproblem failed.
    pub player: usize,
    /// Solver status and diagnostic.
    pub failure: SolveFailure,
}

/// Errors from [`BestResponseRound::run_in_order`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    /// The order skips or repeats a player, or names one that does not exist.
    #[error("solve order {order:?} is not a permutation of 0..{players}")]
    NotAPermutation {
        /// Order as given.
        order: Vec<usize>,
        /// Number of players in the game.
        players: usize,
    },
    /// A subproblem failed.
    #[error(transparent)]
    Round(#[from] RoundFailure),
}

/// Applies the best-response operator to a whole profile.
pub struct BestResponseRound<'g, O: PayoffOracle, S: NlpSolver> {
    game: &'g GameSpec<O>,
    solver: &'g S,
    options: NlpOptions,
    pool: Option<ThreadPool>,
}

impl<'g, O: PayoffOracle, S: NlpSolver> BestResponseRound<'g, O, S> {
    /// Create a round runner. A parallel executor builds its worker pool here,
    /// once, and reuses it for every round.
    pub fn new(
        game: &'g GameSpec<O>,
        solver: &'g S,
        options: NlpOptions,
        executor: RoundExecutor,
    ) -> Result<Self, ThreadPoolBuildError> {
        let pool = match executor {
            RoundExecutor::Sequential => None,
            RoundExecutor::Parallel { threads } => {
                let threads = threads
                    .unwrap_or_else(rayon::current_num_threads)
                    .min(game.num_players())
                    .max(1);
                Some(ThreadPoolBuilder::new().num_threads(threads).build()?)
            }
        };

        Ok(Self {
            game,
            solver,
            options,
            pool,
        })
    }

    /// Whether rounds run on a worker pool.
    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Best response of a single player to `current`.
    pub fn best_response(
        &self,
        current: &JointStrategy,
        player: usize,
    ) -> Result<Vec<f64>, SolveFailure> {
        let builder = SubproblemBuilder::new(self.game.oracle(), current);
        let subproblem = builder.build(player);
        let result = self.solver.solve(&subproblem, &self.options);
        log::trace!(
            "player {} solved by {} in {} iterations ({:?})",
            player,
            self.solver.name(),
            result.iterations,
            result.status
        );
        result.into_best_response()
    }

    /// Next profile: every player's best response to `current`.
    pub fn run(&self, current: &JointStrategy) -> Result<JointStrategy, RoundFailure> {
        let n = self.game.num_players();
        let rows: Vec<Result<Vec<f64>, SolveFailure>> = match &self.pool {
            None => (0..n).map(|i| self.best_response(current, i)).collect(),
            Some(pool) => pool.install(|| {
                (0..n)
                    .into_par_iter()
                    .map(|i| self.best_response(current, i))
                    .collect()
            }),
        };
        Self::assemble(current, rows.into_iter().enumerate())
    }

    /// Like [`run`](Self::run) but solves players sequentially in `order`.
    ///
    /// `order` must be a permutation of `0..n`. The result does not depend on
    /// the order, since every solve reads the same snapshot.
    pub fn run_in_order(
        &self,
        current: &JointStrategy,
        order: &[usize],
    ) -> Result<JointStrategy, OrderError> {
        let n = self.game.num_players();
        let mut seen = vec![false; n];
        let is_permutation = order.len() == n
            && order
                .iter()
                .all(|&i| i < n && !std::mem::replace(&mut seen[i], true));
        if !is_permutation {
            return Err(OrderError::NotAPermutation {
                order: order.to_vec(),
                players: n,
            });
        }

        let mut solved: Vec<(usize, Result<Vec<f64>, SolveFailure>)> = order
            .iter()
            .map(|&i| (i, self.best_response(current, i)))
            .collect();
        solved.sort_by_key(|(i, _)| *i);
        Ok(Self::assemble(current, solved.into_iter())?)
    }

    /// Write rows into a fresh profile, or report the first failed player.
    ///
    /// Rows must arrive in player order and cover every player. A row of the
    /// wrong length or with non-finite entries fails like a solver error.
    fn assemble(
        current: &JointStrategy,
        rows: impl Iterator<Item = (usize, Result<Vec<f64>, SolveFailure>)>,
    ) -> Result<JointStrategy, RoundFailure> {
        let d = current.dimension();
        let mut next = JointStrategy::constant(current.num_players(), d, 0.0);
        let mut filled = 0;
        for (player, row) in rows {
            let x = row
                .and_then(|x| check_row(x, d))
                .map_err(|failure| RoundFailure { player, failure })?;
            next.row_mut(player).copy_from_slice(&x);
            filled += 1;
        }
        if filled != current.num_players() {
            return Err(RoundFailure {
                player: filled,
                failure: SolveFailure {
                    status: SolveStatus::InternalError,
                    detail: "no row produced".to_string(),
                },
            });
        }
        Ok(next)
    }
}

/// Reject solver output that cannot be a strategy row.
fn check_row(x: Vec<f64>, dimension: usize) -> Result<Vec<f64>, SolveFailure> {
    if x.len() != dimension {
        return Err(SolveFailure {
            status: SolveStatus::InternalError,
            detail: format!("solver returned {} entries, expected {}", x.len(), dimension),
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(SolveFailure {
            status: SolveStatus::InternalError,
            detail: "solver returned a non-finite point".to_string(),
        });
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::game::Payoff;
    use crate::equilibrium::nlp::{ProjectedGradient, SolveResult};
    use crate::equilibrium::subproblem::Subproblem;
    use crate::games::linear::LinearResponseGame;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn options() -> NlpOptions {
        NlpOptions {
            max_iterations: 200,
            tolerance: 1e-12,
        }
    }

    /// Fails for a fixed set of players, otherwise returns the start point.
    struct Rejecting {
        fail: Vec<usize>,
    }

    impl NlpSolver for Rejecting {
        fn solve<O: PayoffOracle>(
            &self,
            problem: &Subproblem<'_, O>,
            _options: &NlpOptions,
        ) -> SolveResult {
            let x = problem.initial_point().to_vec();
            if self.fail.contains(&problem.player()) {
                SolveResult::failed(SolveStatus::Infeasible, x, 0, "rejected")
            } else {
                SolveResult::optimal(x, 0.0, 0)
            }
        }
    }

    /// Claims success with a point of the wrong length for one player.
    struct Truncating {
        player: usize,
    }

    impl NlpSolver for Truncating {
        fn solve<O: PayoffOracle>(
            &self,
            problem: &Subproblem<'_, O>,
            _options: &NlpOptions,
        ) -> SolveResult {
            let mut x = problem.initial_point().to_vec();
            if problem.player() == self.player {
                x.truncate(1);
            }
            SolveResult::optimal(x, 0.0, 0)
        }
    }

    /// Payoff depends on everyone: reveals any cross-row leakage.
    struct Coupled;

    impl PayoffOracle for Coupled {
        fn num_players(&self) -> usize {
            4
        }
        fn dimension(&self) -> usize {
            2
        }
        fn evaluate(&self, player: usize, profile: &JointStrategy) -> Payoff {
            // target = 1 + 0.1 * (sum of everyone else's entries)
            let others: f64 = (0..4)
                .filter(|&j| j != player)
                .flat_map(|j| profile.row(j).iter().copied())
                .sum();
            let target = 1.0 + 0.1 * others;
            let x = profile.row(player);
            let value = -0.5 * x.iter().map(|v| (v - target) * (v - target)).sum::<f64>();
            let gradient = x.iter().map(|v| -(v - target)).collect();
            Payoff { value, gradient }
        }
    }

    #[test]
    fn test_round_matches_closed_form() {
        let game = GameSpec::new(LinearResponseGame::new(2, 2, 1.0, 0.5)).unwrap();
        let solver = ProjectedGradient::new();
        let round =
            BestResponseRound::new(&game, &solver, options(), RoundExecutor::Sequential).unwrap();

        let start = game.default_start();
        let next = round.run(&start).unwrap();
        // r(x) = 1 - 0.5 * 1 = 0.5
        for &v in next.as_slice() {
            assert!((v - 0.5).abs() < 1e-9);
        }
        // snapshot untouched
        assert_eq!(start, game.default_start());
    }

    #[test]
    fn test_order_does_not_matter() {
        let game = GameSpec::new(Coupled).unwrap();
        let solver = ProjectedGradient::new();
        let round =
            BestResponseRound::new(&game, &solver, options(), RoundExecutor::Sequential).unwrap();

        let start = JointStrategy::from_rows(vec![
            vec![1.0, 2.0],
            vec![0.5, 0.0],
            vec![3.0, 1.0],
            vec![0.0, 0.25],
        ])
        .unwrap();

        let baseline = round.run(&start).unwrap();
        let reversed = round.run_in_order(&start, &[3, 2, 1, 0]).unwrap();
        assert_eq!(baseline, reversed);

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..5 {
            let mut order: Vec<usize> = (0..4).collect();
            order.shuffle(&mut rng);
            assert_eq!(round.run_in_order(&start, &order).unwrap(), baseline);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let game = GameSpec::new(Coupled).unwrap();
        let solver = ProjectedGradient::new();
        let sequential =
            BestResponseRound::new(&game, &solver, options(), RoundExecutor::Sequential).unwrap();
        let parallel = BestResponseRound::new(
            &game,
            &solver,
            options(),
            RoundExecutor::Parallel { threads: Some(3) },
        )
        .unwrap();
        assert!(parallel.is_parallel());

        let start = JointStrategy::constant(4, 2, 2.0);
        assert_eq!(sequential.run(&start).unwrap(), parallel.run(&start).unwrap());
    }

    #[test]
    fn test_failure_discards_round() {
        let game = GameSpec::new(LinearResponseGame::new(3, 2, 1.0, 0.5)).unwrap();
        let solver = Rejecting { fail: vec![2, 1] };
        for executor in [
            RoundExecutor::Sequential,
            RoundExecutor::Parallel { threads: Some(3) },
        ] {
            let round = BestResponseRound::new(&game, &solver, options(), executor).unwrap();
            let err = round.run(&game.default_start()).unwrap_err();
            // lowest failing index regardless of executor
            assert_eq!(err.player, 1);
            assert_eq!(err.failure.status, SolveStatus::Infeasible);
            assert_eq!(err.failure.detail, "rejected");
        }
    }

    #[test]
    fn test_malformed_optimal_point_fails_round() {
        let game = GameSpec::new(LinearResponseGame::new(3, 2, 1.0, 0.5)).unwrap();
        let solver = Truncating { player: 2 };
        for executor in [
            RoundExecutor::Sequential,
            RoundExecutor::Parallel { threads: Some(2) },
        ] {
            let round = BestResponseRound::new(&game, &solver, options(), executor).unwrap();
            let err = round.run(&game.default_start()).unwrap_err();
            assert_eq!(err.player, 2);
            assert_eq!(err.failure.status, SolveStatus::InternalError);
        }

        let nan = SolveResult::optimal(vec![f64::NAN, 1.0], 0.0, 0).into_best_response();
        let err = check_row(nan.unwrap(), 2).unwrap_err();
        assert_eq!(err.status, SolveStatus::InternalError);
    }

    #[test]
    fn test_order_must_be_permutation() {
        let game = GameSpec::new(LinearResponseGame::new(2, 2, 1.0, 0.5)).unwrap();
        let solver = ProjectedGradient::new();
        let round =
            BestResponseRound::new(&game, &solver, options(), RoundExecutor::Sequential).unwrap();
        let start = game.default_start();

        for order in [vec![0, 0], vec![0], vec![0, 1, 1], vec![0, 2]] {
            assert!(matches!(
                round.run_in_order(&start, &order),
                Err(OrderError::NotAPermutation { players: 2, .. })
            ));
        }
        assert!(round.run_in_order(&start, &[1, 0]).is_ok());
    }

    #[test]
    fn test_in_order_failure_reports_player() {
        let game = GameSpec::new(LinearResponseGame::new(3, 2, 1.0, 0.5)).unwrap();
        let solver = Rejecting { fail: vec![2] };
        let round =
            BestResponseRound::new(&game, &solver, options(), RoundExecutor::Sequential).unwrap();

        match round.run_in_order(&game.default_start(), &[2, 0, 1]) {
            Err(OrderError::Round(failure)) => assert_eq!(failure.player, 2),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
