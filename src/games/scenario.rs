//! Parameter sweeps over the safety race.
//!
//! A [`Scenario`] takes a base [`SafetyRace`], varies one parameter over a
//! list of values (the same value for every player) and solves for the
//! equilibrium at every point. An optional secondary parameter repeats the
//! whole sweep once per per-player vector, so a sweep over `r` can be run for
//! several settings of `d`.
//!
//! Sweep points are independent and are solved in parallel on the rayon pool.
//! Each point runs its rounds sequentially.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::equilibrium::config::{RoundExecutor, SolveConfig};
use crate::equilibrium::error::EquilibriumError;
use crate::equilibrium::game::GameSpec;
use crate::equilibrium::nlp::NlpSolver;
use crate::equilibrium::solver::solve_equilibrium_default;
use crate::games::safety_race::SafetyRace;

/// Per-player model parameter that a sweep can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Param {
    /// Safety productivity `A`.
    A,
    /// Safety returns to scale `alpha`.
    Alpha,
    /// Performance productivity `B`.
    B,
    /// Performance returns to scale `beta`.
    Beta,
    /// Erosion of safety by performance `theta`.
    Theta,
    /// Disaster cost `d`.
    D,
    /// Factor cost `r`.
    R,
}

impl Param {
    /// Every sweepable parameter.
    pub const ALL: [Param; 7] = [
        Param::A,
        Param::Alpha,
        Param::B,
        Param::Beta,
        Param::Theta,
        Param::D,
        Param::R,
    ];

    /// Name as written in the model formulas.
    pub fn name(&self) -> &'static str {
        match self {
            Param::A => "A",
            Param::Alpha => "alpha",
            Param::B => "B",
            Param::Beta => "beta",
            Param::Theta => "theta",
            Param::D => "d",
            Param::R => "r",
        }
    }

    /// The model's per-player vector for this parameter.
    pub fn values_mut<'a>(&self, race: &'a mut SafetyRace) -> &'a mut Vec<f64> {
        match self {
            Param::A => &mut race.prod.a,
            Param::Alpha => &mut race.prod.alpha,
            Param::B => &mut race.prod.b,
            Param::Beta => &mut race.prod.beta,
            Param::Theta => &mut race.prod.theta,
            Param::D => &mut race.d,
            Param::R => &mut race.r,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown parameter name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown parameter '{0}', expected one of A, alpha, B, beta, theta, d, r")]
pub struct UnknownParam(pub String);

impl FromStr for Param {
    type Err = UnknownParam;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Param::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| UnknownParam(s.to_string()))
    }
}

/// `steps` evenly spaced values from `from` to `to`, both included.
pub fn linspace(from: f64, to: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![from],
        _ => {
            let width = (to - from) / (steps - 1) as f64;
            (0..steps).map(|k| from + width * k as f64).collect()
        }
    }
}

/// Second sweep dimension: one per-player vector per variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryVariation {
    /// Parameter being varied.
    pub param: Param,
    /// One vector per variation, one entry per player.
    pub values: Vec<Vec<f64>>,
}

/// A sweep over one (or two) model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Model whose other parameters stay fixed.
    pub base: SafetyRace,
    /// Primary varying parameter.
    pub varying: Param,
    /// Values of the primary parameter, applied to every player.
    pub values: Vec<f64>,
    /// Optional secondary variation.
    pub secondary: Option<SecondaryVariation>,
}

/// Equilibrium at one sweep point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// Index into the secondary variations, if any.
    pub secondary_index: Option<usize>,
    /// Value of the primary parameter.
    pub value: f64,
    /// Model solved at this point.
    pub model: SafetyRace,
    /// Equilibrium strategies `[x_s, x_p]`, one row per player.
    pub strategies: Vec<Vec<f64>>,
    /// Safety output per player.
    pub s: Vec<f64>,
    /// Performance output per player.
    pub p: Vec<f64>,
    /// Probability that no player causes a disaster.
    pub total_safety: f64,
    /// Net payoff per player.
    pub net_payoffs: Vec<f64>,
    /// Whether the round tolerance was met.
    pub converged: bool,
    /// Rounds run.
    pub rounds: usize,
}

impl Scenario {
    /// Sweep `varying` over `values` starting from `base`.
    pub fn new(base: SafetyRace, varying: Param, values: Vec<f64>) -> Result<Self, EquilibriumError> {
        base.validate()?;
        if values.is_empty() {
            return Err(EquilibriumError::InvalidGameSpec(format!(
                "sweep over {} has no values",
                varying
            )));
        }
        let scenario = Self {
            base,
            varying,
            values,
            secondary: None,
        };
        scenario.models()?;
        Ok(scenario)
    }

    /// Repeat the sweep for each per-player vector of `param`.
    pub fn with_secondary(
        mut self,
        param: Param,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, EquilibriumError> {
        if param == self.varying {
            return Err(EquilibriumError::InvalidGameSpec(format!(
                "{} cannot be both the primary and the secondary parameter",
                param
            )));
        }
        let n = self.base.d.len();
        if values.is_empty() || values.iter().any(|v| v.len() != n) {
            return Err(EquilibriumError::InvalidGameSpec(format!(
                "secondary variation of {} needs at least one vector of {} entries",
                param, n
            )));
        }
        self.secondary = Some(SecondaryVariation { param, values });
        self.models()?;
        Ok(self)
    }

    /// Number of sweep points.
    pub fn len(&self) -> usize {
        let repeats = self.secondary.as_ref().map_or(1, |s| s.values.len());
        repeats * self.values.len()
    }

    /// Whether the sweep has no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validated model for every point, secondary-major.
    pub fn models(&self) -> Result<Vec<(Option<usize>, f64, SafetyRace)>, EquilibriumError> {
        let n = self.base.d.len();
        let variations: Vec<(Option<usize>, SafetyRace)> = match &self.secondary {
            None => vec![(None, self.base.clone())],
            Some(secondary) => secondary
                .values
                .iter()
                .enumerate()
                .map(|(k, v)| {
                    let mut race = self.base.clone();
                    *secondary.param.values_mut(&mut race) = v.clone();
                    (Some(k), race)
                })
                .collect(),
        };

        let mut models = Vec::with_capacity(self.len());
        for (k, base) in variations {
            for &value in &self.values {
                let mut race = base.clone();
                *self.varying.values_mut(&mut race) = vec![value; n];
                race.validate()?;
                models.push((k, value, race));
            }
        }
        Ok(models)
    }

    /// Solve every point. See [`solve_with_callback`](Self::solve_with_callback).
    pub fn solve<S: NlpSolver>(
        &self,
        config: &SolveConfig,
        solver: &S,
    ) -> Result<Vec<SweepPoint>, EquilibriumError> {
        self.solve_with_callback(config, solver, |_| {})
    }

    /// Solve every point in parallel from the default start, calling
    /// `on_point` with the index of each finished point.
    ///
    /// The config's executor is ignored: points run their rounds
    /// sequentially. The first failing point, in sweep order, fails the sweep.
    pub fn solve_with_callback<S, F>(
        &self,
        config: &SolveConfig,
        solver: &S,
        on_point: F,
    ) -> Result<Vec<SweepPoint>, EquilibriumError>
    where
        S: NlpSolver,
        F: Fn(usize) + Sync,
    {
        let config = config.clone().with_executor(RoundExecutor::Sequential);
        let models = self.models()?;
        log::info!(
            "sweeping {} over {} points ({} players)",
            self.varying,
            models.len(),
            self.base.d.len()
        );

        let results: Vec<Result<SweepPoint, EquilibriumError>> = models
            .into_par_iter()
            .enumerate()
            .map(|(index, (secondary_index, value, race))| {
                let point = solve_point(race, secondary_index, value, &config, solver);
                if let Err(err) = &point {
                    log::warn!("{} = {}: {}", self.varying, value, err);
                }
                on_point(index);
                point
            })
            .collect();

        results.into_iter().collect()
    }
}

fn solve_point<S: NlpSolver>(
    race: SafetyRace,
    secondary_index: Option<usize>,
    value: f64,
    config: &SolveConfig,
    solver: &S,
) -> Result<SweepPoint, EquilibriumError> {
    let game = GameSpec::new(race)?;
    let outcome = solve_equilibrium_default(&game, config, solver)?;
    let race = game.oracle();
    let (s, p) = race.production(&outcome.profile);

    Ok(SweepPoint {
        secondary_index,
        value,
        model: race.clone(),
        strategies: outcome.profile.rows().map(|row| row.to_vec()).collect(),
        s,
        p,
        total_safety: race.total_safety(&outcome.profile),
        net_payoffs: race.net_payoffs(&outcome.profile),
        converged: outcome.converged(),
        rounds: outcome.stats.rounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::nlp::ProjectedGradient;
    use crate::games::safety_race::Csf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Two identical players, no erosion of safety by performance.
    fn identical_pair() -> SafetyRace {
        SafetyRace::symmetric(2, 10.0, 0.5, 10.0, 0.5, 0.0, 1.0, 0.03, Csf::default()).unwrap()
    }

    #[test]
    fn test_param_names_round_trip() {
        for param in Param::ALL {
            assert_eq!(param.name().parse::<Param>(), Ok(param));
        }
        assert_eq!("gamma".parse::<Param>(), Err(UnknownParam("gamma".to_string())));
    }

    #[test]
    fn test_linspace_endpoints() {
        let values = linspace(0.02, 0.04, 20);
        assert_eq!(values.len(), 20);
        assert_eq!(values[0], 0.02);
        assert!((values[19] - 0.04).abs() < 1e-15);
        assert_eq!(linspace(1.0, 2.0, 1), vec![1.0]);
        assert!(linspace(1.0, 2.0, 0).is_empty());
    }

    #[test]
    fn test_secondary_sweep_layout() {
        let scenario = Scenario::new(identical_pair(), Param::R, vec![0.02, 0.03, 0.04])
            .unwrap()
            .with_secondary(Param::D, vec![vec![1.0, 1.0], vec![2.0, 0.5]])
            .unwrap();
        assert_eq!(scenario.len(), 6);

        let models = scenario.models().unwrap();
        assert_eq!(models[0].0, Some(0));
        assert_eq!(models[4].0, Some(1));
        assert_eq!(models[4].1, 0.03);
        assert_eq!(models[4].2.r, vec![0.03, 0.03]);
        assert_eq!(models[4].2.d, vec![2.0, 0.5]);
        // untouched parameters come from the base model
        assert_eq!(models[4].2.prod.a, vec![10.0, 10.0]);
    }

    #[test]
    fn test_invalid_sweeps_are_rejected() {
        assert!(Scenario::new(identical_pair(), Param::R, vec![]).is_err());
        assert!(Scenario::new(identical_pair(), Param::R, vec![0.1, -0.1]).is_err());
        assert!(Scenario::new(identical_pair(), Param::B, vec![0.0]).is_err());

        let scenario = Scenario::new(identical_pair(), Param::R, vec![0.1]).unwrap();
        assert!(scenario.clone().with_secondary(Param::R, vec![vec![0.1, 0.1]]).is_err());
        assert!(scenario.with_secondary(Param::D, vec![vec![1.0]]).is_err());
    }

    #[test]
    fn test_factor_cost_sweep() {
        // identical players, r from 0.02 to 0.04
        let scenario =
            Scenario::new(identical_pair(), Param::R, linspace(0.02, 0.04, 20)).unwrap();
        let finished = AtomicUsize::new(0);
        let points = scenario
            .solve_with_callback(&SolveConfig::default(), &ProjectedGradient::new(), |_| {
                finished.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        assert_eq!(points.len(), 20);
        assert_eq!(finished.load(Ordering::Relaxed), 20);

        for (point, r) in points.iter().zip(linspace(0.02, 0.04, 20)) {
            assert_eq!(point.value, r);
            assert!(point.converged);
            assert_eq!(point.strategies.len(), 2);
            assert!(point.total_safety > 0.0 && point.total_safety < 1.0);
            assert!((point.p[0] - point.p[1]).abs() < 1e-2 * point.p[0]);

            // with theta = 0 the performance condition reads P·β / (4·x_p) = r
            let x_p = point.strategies[0][1];
            let predicted = point.total_safety * 0.5 / (4.0 * r);
            assert!(
                (x_p - predicted).abs() < 1e-2 * predicted,
                "r = {}: x_p = {}, predicted {}",
                r,
                x_p,
                predicted
            );
        }

        // dearer inputs, less performance
        for w in points.windows(2) {
            assert!(w[1].p[0] < w[0].p[0]);
        }
    }
}
