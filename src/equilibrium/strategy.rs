//! Joint strategy profiles.
//!
//! A [`JointStrategy`] is an `n × d` matrix stored row-major: row `i` is the
//! strategy of player `i`. Profiles have value semantics. A round reads one
//! profile and produces a brand new one, so nothing ever observes a partially
//! updated profile.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::equilibrium::config::ConvergencePolicy;
use crate::equilibrium::error::StrategyError;

/// Full matrix of every player's strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointStrategy {
    num_players: usize,
    dimension: usize,
    values: Vec<f64>,
}

impl JointStrategy {
    /// Profile with every entry set to `value`.
    pub fn constant(num_players: usize, dimension: usize, value: f64) -> Self {
        Self {
            num_players,
            dimension,
            values: vec![value; num_players * dimension],
        }
    }

    /// The starting profile used when the caller supplies none: every entry 1.0.
    pub fn default_start(num_players: usize, dimension: usize) -> Self {
        Self::constant(num_players, dimension, 1.0)
    }

    /// Build a profile from explicit rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, StrategyError> {
        let expected = match rows.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => return Err(StrategyError::Empty),
        };

        let mut values = Vec::with_capacity(rows.len() * expected);
        for (row, r) in rows.iter().enumerate() {
            if r.len() != expected {
                return Err(StrategyError::Ragged {
                    row,
                    expected,
                    found: r.len(),
                });
            }
            values.extend_from_slice(r);
        }

        Ok(Self {
            num_players: rows.len(),
            dimension: expected,
            values,
        })
    }

    /// Number of players (rows).
    pub fn num_players(&self) -> usize {
        self.num_players
    }

    /// Strategy dimension (columns).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Strategy of player `i`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.dimension..(i + 1) * self.dimension]
    }

    /// Mutable strategy of player `i`.
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        let d = self.dimension;
        &mut self.values[i * d..(i + 1) * d]
    }

    /// Entry `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dimension + j]
    }

    /// Iterate over rows in player order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.dimension)
    }

    /// All entries, row-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Copy of this profile with row `i` replaced by `x`.
    ///
    /// # Panics
    /// Panics if `x.len()` differs from the profile dimension.
    pub fn with_row(&self, i: usize, x: &[f64]) -> Self {
        let mut out = self.clone();
        out.row_mut(i).copy_from_slice(x);
        out
    }

    /// Whether every entry is `>= 0`.
    pub fn is_non_negative(&self) -> bool {
        self.values.iter().all(|&v| v >= 0.0)
    }

    /// Whether both profiles have the same shape.
    pub fn same_shape(&self, other: &JointStrategy) -> bool {
        self.num_players == other.num_players && self.dimension == other.dimension
    }

    /// Largest per-entry change from `self` (previous round) to `next`.
    ///
    /// Entries whose previous value is at most `policy.zero_floor` in
    /// magnitude contribute their absolute change; all others contribute
    /// `|next - prev| / |prev|`. A NaN entry makes the result infinite so it
    /// can never pass a `< tol` test.
    pub fn max_relative_change(&self, next: &JointStrategy, policy: &ConvergencePolicy) -> f64 {
        debug_assert!(self.same_shape(next), "profiles must share a shape");

        self.values
            .iter()
            .zip(next.values.iter())
            .map(|(&prev, &new)| {
                let diff = (new - prev).abs();
                let change = if prev.abs() <= policy.zero_floor {
                    diff
                } else {
                    diff / prev.abs()
                };
                if change.is_nan() {
                    f64::INFINITY
                } else {
                    change
                }
            })
            .fold(0.0, f64::max)
    }

    /// Strictly positive jittered copy, for re-solving from a nearby start.
    ///
    /// Each entry is multiplied by a factor drawn uniformly from
    /// `[1 - scale, 1 + scale]`; entries at zero are lifted to `scale`.
    pub fn perturbed<R: Rng>(&self, scale: f64, rng: &mut R) -> Self {
        let scale = scale.clamp(0.0, 0.99);
        let values = self
            .values
            .iter()
            .map(|&v| {
                if v <= 0.0 {
                    scale.max(f64::MIN_POSITIVE)
                } else {
                    v * rng.gen_range(1.0 - scale..=1.0 + scale)
                }
            })
            .collect();

        Self {
            num_players: self.num_players,
            dimension: self.dimension,
            values,
        }
    }
}

impl fmt::Display for JointStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows().enumerate() {
            let cells: Vec<String> = row.iter().map(|v| format!("{:.6}", v)).collect();
            writeln!(f, "P{}: [{}]", i, cells.join(", "))?;
        }
        Ok(())
    }
}
