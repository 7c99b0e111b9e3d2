//! Safety/performance race.
//!
//! Each player splits factor inputs between safety (`x_s`) and performance
//! (`x_p`). Performance decides who wins a contest; safety decides whether
//! anyone gets to collect. A disaster caused by any player hits everyone.
//!
//! ## Model
//!
//! Production, per player:
//! ```text
//! p = B · x_p^β
//! s = A · x_s^α · p^(-θ)          (more performance makes safety harder)
//! ```
//!
//! Probability of a safe outcome, shared by all players:
//! ```text
//! P = Π_j s_j / (1 + s_j)
//! ```
//!
//! Contest success function with win probability `q_i = p_i / Σ_j p_j`:
//! ```text
//! R_i = (w + a_w·p_i)·q_i + (l + a_l·p_i)·(1 - q_i)
//! ```
//!
//! Net payoff:
//! ```text
//! u_i = P·R_i - (1 - P)·d_i - r_i·(x_s + x_p)
//! ```
//!
//! Gradients are analytic. At `x_s = 0` or `x_p = 0` with exponents below one
//! they are infinite, so equilibria of this model lie in the interior.

use serde::{Deserialize, Serialize};

use crate::equilibrium::error::EquilibriumError;
use crate::equilibrium::game::{Payoff, PayoffOracle};
use crate::equilibrium::strategy::JointStrategy;

/// Column of the safety input in a strategy row.
pub const SAFETY: usize = 0;
/// Column of the performance input in a strategy row.
pub const PERFORMANCE: usize = 1;

/// Per-player production parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProdFunc {
    /// Safety productivity.
    pub a: Vec<f64>,
    /// Safety returns to scale.
    pub alpha: Vec<f64>,
    /// Performance productivity.
    pub b: Vec<f64>,
    /// Performance returns to scale.
    pub beta: Vec<f64>,
    /// How strongly performance erodes safety.
    pub theta: Vec<f64>,
}

impl ProdFunc {
    /// `(s, p)` of player `i` for inputs `(x_s, x_p)`.
    pub fn produce(&self, i: usize, x_s: f64, x_p: f64) -> (f64, f64) {
        let p = self.b[i] * x_p.powf(self.beta[i]);
        let s = self.a[i] * x_s.powf(self.alpha[i]) * p.powf(-self.theta[i]);
        (s, p)
    }
}

/// Contest success function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Csf {
    /// Reward for the winner.
    pub w: f64,
    /// Reward for the losers.
    pub l: f64,
    /// Winner reward per unit of performance.
    pub a_w: f64,
    /// Loser reward per unit of performance.
    pub a_l: f64,
}

impl Default for Csf {
    fn default() -> Self {
        Self {
            w: 1.0,
            l: 0.0,
            a_w: 0.0,
            a_l: 0.0,
        }
    }
}

impl Csf {
    /// Win probability of player `i`. An all-zero field splits evenly.
    pub fn win_probability(&self, i: usize, p: &[f64]) -> f64 {
        let total: f64 = p.iter().sum();
        if total > 0.0 {
            p[i] / total
        } else {
            1.0 / p.len() as f64
        }
    }

    /// Expected contest reward of player `i`.
    pub fn reward(&self, i: usize, p: &[f64]) -> f64 {
        let q = self.win_probability(i, p);
        (self.w + p[i] * self.a_w) * q + (self.l + p[i] * self.a_l) * (1.0 - q)
    }

    /// `∂reward_i / ∂p_i`.
    pub fn reward_deriv(&self, i: usize, p: &[f64]) -> f64 {
        let total: f64 = p.iter().sum();
        if total <= 0.0 {
            return self.a_l + (self.a_w - self.a_l) / p.len() as f64;
        }
        let q = p[i] / total;
        let q_deriv = (total - p[i]) / (total * total);
        self.a_l
            + (self.a_w - self.a_l) * q
            + (self.w - self.l + (self.a_w - self.a_l) * p[i]) * q_deriv
    }
}

/// The race model as a payoff oracle. Strategy rows are `[x_s, x_p]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRace {
    /// Production functions.
    pub prod: ProdFunc,
    /// Contest success function.
    pub csf: Csf,
    /// Cost of disaster, per player.
    pub d: Vec<f64>,
    /// Factor cost, per player.
    pub r: Vec<f64>,
}

/// `s / (1 + s)`, well defined for `s = +∞`.
fn safe_probability(s: f64) -> f64 {
    1.0 / (1.0 + 1.0 / s)
}

impl SafetyRace {
    /// Build and validate a model.
    pub fn new(
        prod: ProdFunc,
        csf: Csf,
        d: Vec<f64>,
        r: Vec<f64>,
    ) -> Result<Self, EquilibriumError> {
        let race = Self { prod, csf, d, r };
        race.validate()?;
        Ok(race)
    }

    /// `n` identical players.
    #[allow(clippy::too_many_arguments)]
    pub fn symmetric(
        n: usize,
        a: f64,
        alpha: f64,
        b: f64,
        beta: f64,
        theta: f64,
        d: f64,
        r: f64,
        csf: Csf,
    ) -> Result<Self, EquilibriumError> {
        let prod = ProdFunc {
            a: vec![a; n],
            alpha: vec![alpha; n],
            b: vec![b; n],
            beta: vec![beta; n],
            theta: vec![theta; n],
        };
        Self::new(prod, csf, vec![d; n], vec![r; n])
    }

    /// Check that every parameter vector has one entry per player and that
    /// productivities, exponents and costs are in range.
    pub fn validate(&self) -> Result<(), EquilibriumError> {
        let n = self.d.len();
        let columns: [(&str, &Vec<f64>); 7] = [
            ("A", &self.prod.a),
            ("alpha", &self.prod.alpha),
            ("B", &self.prod.b),
            ("beta", &self.prod.beta),
            ("theta", &self.prod.theta),
            ("d", &self.d),
            ("r", &self.r),
        ];

        for (name, values) in columns {
            if values.len() != n {
                return Err(EquilibriumError::InvalidGameSpec(format!(
                    "parameter {} has {} entries, expected {}",
                    name,
                    values.len(),
                    n
                )));
            }
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(EquilibriumError::InvalidGameSpec(format!(
                    "parameter {} must be finite and non-negative",
                    name
                )));
            }
        }

        if self.prod.a.iter().chain(&self.prod.b).any(|&v| v == 0.0) {
            return Err(EquilibriumError::InvalidGameSpec(
                "productivities A and B must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// `(s, p)` for every player.
    pub fn production(&self, profile: &JointStrategy) -> (Vec<f64>, Vec<f64>) {
        (0..self.d.len())
            .map(|i| self.prod.produce(i, profile.get(i, SAFETY), profile.get(i, PERFORMANCE)))
            .unzip()
    }

    /// Probability that no player causes a disaster.
    pub fn total_safety(&self, profile: &JointStrategy) -> f64 {
        let (s, _) = self.production(profile);
        s.iter().map(|&sj| safe_probability(sj)).product()
    }

    /// Net payoff of every player.
    pub fn net_payoffs(&self, profile: &JointStrategy) -> Vec<f64> {
        (0..self.d.len())
            .map(|i| self.evaluate(i, profile).value)
            .collect()
    }
}

impl PayoffOracle for SafetyRace {
    fn num_players(&self) -> usize {
        self.d.len()
    }

    fn dimension(&self) -> usize {
        2
    }

    fn evaluate(&self, player: usize, profile: &JointStrategy) -> Payoff {
        let i = player;
        let x_s = profile.get(i, SAFETY);
        let x_p = profile.get(i, PERFORMANCE);
        let (s, p) = self.production(profile);

        let others_safe: f64 = (0..s.len())
            .filter(|&j| j != i)
            .map(|j| safe_probability(s[j]))
            .product();
        let own_safe = safe_probability(s[i]);
        let total_safe = others_safe * own_safe;

        let reward = self.csf.reward(i, &p);
        let value = total_safe * reward - (1.0 - total_safe) * self.d[i] - self.r[i] * (x_s + x_p);

        // ∂P/∂s_i = P_{-i} / (1 + s_i)^2
        let g = 1.0 / (1.0 + s[i]);
        let dp_ds = others_safe * g * g;
        let stake = reward + self.d[i];

        let alpha = self.prod.alpha[i];
        let beta = self.prod.beta[i];
        let theta = self.prod.theta[i];

        let ds_dxs = alpha * s[i] / x_s;
        let ds_dxp = -theta * beta * s[i] / x_p;
        let dperf_dxp = beta * p[i] / x_p;

        let grad_s = stake * dp_ds * ds_dxs - self.r[i];
        let grad_p = stake * dp_ds * ds_dxp
            + total_safe * self.csf.reward_deriv(i, &p) * dperf_dxp
            - self.r[i];

        Payoff {
            value,
            gradient: vec![grad_s, grad_p],
        }
    }

    fn name(&self) -> String {
        format!("safety-race({} players)", self.d.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::{
        solve_equilibrium_default, BestResponseRound, GameSpec, NlpOptions, ProjectedGradient,
        RoundExecutor, SolveConfig,
    };

    fn model() -> SafetyRace {
        SafetyRace::symmetric(2, 1.0, 0.5, 1.0, 0.5, 0.5, 1.0, 0.1, Csf::default()).unwrap()
    }

    #[test]
    fn test_csf_matches_hand_computation() {
        let csf = Csf {
            w: 1.0,
            l: 0.2,
            a_w: 0.1,
            a_l: 0.05,
        };
        let p = [1.0, 3.0];
        // q = 0.25: (1 + 0.1) * 0.25 + (0.2 + 0.05) * 0.75
        assert!((csf.reward(0, &p) - (1.1 * 0.25 + 0.25 * 0.75)).abs() < 1e-12);
        assert_eq!(csf.win_probability(1, &[0.0, 0.0]), 0.5);
    }

    #[test]
    fn test_production_at_unit_inputs() {
        let race = model();
        let profile = JointStrategy::constant(2, 2, 1.0);
        let (s, p) = race.production(&profile);
        assert_eq!(s, vec![1.0, 1.0]);
        assert_eq!(p, vec![1.0, 1.0]);
        assert!((race.total_safety(&profile) - 0.25).abs() < 1e-12);

        // P = 0.25, R = 0.5: 0.25 * 0.5 - 0.75 * 1 - 0.1 * 2
        let payoffs = race.net_payoffs(&profile);
        assert!((payoffs[0] - (0.125 - 0.75 - 0.2)).abs() < 1e-12);
        assert_eq!(payoffs[0], payoffs[1]);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let race = SafetyRace::new(
            ProdFunc {
                a: vec![2.0, 1.0, 0.5],
                alpha: vec![0.5, 0.7, 0.3],
                b: vec![1.0, 2.0, 1.5],
                beta: vec![0.5, 0.4, 0.6],
                theta: vec![0.25, 0.5, 0.1],
            },
            Csf {
                w: 1.0,
                l: 0.1,
                a_w: 0.2,
                a_l: 0.05,
            },
            vec![1.0, 0.5, 2.0],
            vec![0.04, 0.1, 0.07],
        )
        .unwrap();
        let profile =
            JointStrategy::from_rows(vec![vec![0.8, 1.3], vec![2.0, 0.6], vec![1.1, 1.7]])
                .unwrap();

        let h = 1e-6;
        for player in 0..3 {
            let payoff = race.evaluate(player, &profile);
            for k in 0..2 {
                let mut up = profile.row(player).to_vec();
                let mut down = up.clone();
                up[k] += h;
                down[k] -= h;
                let fd = (race.evaluate(player, &profile.with_row(player, &up)).value
                    - race.evaluate(player, &profile.with_row(player, &down)).value)
                    / (2.0 * h);
                assert!(
                    (fd - payoff.gradient[k]).abs() < 1e-6,
                    "player {} component {}: fd {} vs analytic {}",
                    player,
                    k,
                    fd,
                    payoff.gradient[k]
                );
            }
        }
    }

    #[test]
    fn test_validate_catches_bad_parameters() {
        let mut race = model();
        race.r.push(0.1);
        assert!(race.validate().is_err());

        let mut race = model();
        race.prod.a[0] = 0.0;
        assert!(race.validate().is_err());

        let mut race = model();
        race.d[1] = f64::NAN;
        assert!(race.validate().is_err());
    }

    #[test]
    fn test_best_response_improves_payoff() {
        let game = GameSpec::new(model()).unwrap();
        let solver = ProjectedGradient::new();
        let options = NlpOptions {
            max_iterations: 20_000,
            tolerance: 1e-6,
        };
        let round =
            BestResponseRound::new(&game, &solver, options, RoundExecutor::Sequential).unwrap();

        let start = game.default_start();
        let next = round.run(&start).unwrap();
        assert!(next.is_non_negative());

        for i in 0..2 {
            let before = game.oracle().evaluate(i, &start).value;
            let after = game.oracle().evaluate(i, &start.with_row(i, next.row(i))).value;
            assert!(after >= before, "player {}: {} < {}", i, after, before);
        }
    }

    #[test]
    fn test_precise_preset_solves_race() {
        let race =
            SafetyRace::symmetric(2, 10.0, 0.5, 10.0, 0.5, 0.25, 1.0, 0.1, Csf::default()).unwrap();
        let game = GameSpec::new(race).unwrap();
        let outcome =
            solve_equilibrium_default(&game, &SolveConfig::precise(), &ProjectedGradient::new())
                .unwrap();
        assert!(outcome.converged());

        let profile = &outcome.profile;
        assert!(profile.row(0).iter().all(|&x| x > 0.0));
        for k in 0..2 {
            let scale = profile.get(0, k).max(1.0);
            assert!((profile.get(0, k) - profile.get(1, k)).abs() < 1e-6 * scale);
        }

        // no player can improve by moving its own inputs
        for i in 0..2 {
            let gradient = game.oracle().evaluate(i, profile).gradient;
            for g in gradient {
                assert!(g.abs() < 1e-4, "player {}: gradient {}", i, g);
            }
        }
    }
}
