//! Payoff oracle trait and game description.
//!
//! Any model that implements [`PayoffOracle`] can be solved by the
//! best-response iterator. The oracle owns the economics; the engine only
//! asks it for a player's payoff and the gradient of that payoff with respect
//! to the player's own strategy.

use crate::equilibrium::error::EquilibriumError;
use crate::equilibrium::strategy::JointStrategy;

/// A player's payoff at a profile, and its gradient w.r.t. the player's own row.
#[derive(Debug, Clone, PartialEq)]
pub struct Payoff {
    /// Payoff value (a benefit, to be maximized).
    pub value: f64,
    /// `∂value / ∂x_i`, one entry per strategy component.
    pub gradient: Vec<f64>,
}

/// The interface a game model implements.
///
/// Implementations must be pure and deterministic: identical inputs must
/// give identical outputs, since rounds are evaluated in any order and
/// possibly on several threads at once.
///
/// # Example
/// ```ignore
/// struct MyModel { /* parameters */ }
///
/// impl PayoffOracle for MyModel {
///     fn num_players(&self) -> usize { 2 }
///     fn dimension(&self) -> usize { 2 }
///     fn evaluate(&self, player: usize, profile: &JointStrategy) -> Payoff {
///         // ...
///     }
/// }
/// ```
pub trait PayoffOracle: Send + Sync {
    /// Number of players in the game.
    fn num_players(&self) -> usize;

    /// Number of strategy components per player.
    fn dimension(&self) -> usize;

    /// Payoff of `player` at `profile`, with its gradient w.r.t. `profile.row(player)`.
    fn evaluate(&self, player: usize, profile: &JointStrategy) -> Payoff;

    /// Human-readable model name, used in logs.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("game")
            .to_string()
    }
}

/// Immutable description of a game: player count, dimension and oracle.
#[derive(Debug, Clone)]
pub struct GameSpec<O: PayoffOracle> {
    num_players: usize,
    dimension: usize,
    oracle: O,
}

impl<O: PayoffOracle> GameSpec<O> {
    /// Wrap an oracle, checking that it describes a non-empty game.
    pub fn new(oracle: O) -> Result<Self, EquilibriumError> {
        let num_players = oracle.num_players();
        let dimension = oracle.dimension();

        if num_players == 0 {
            return Err(EquilibriumError::InvalidGameSpec(
                "game must have at least one player".to_string(),
            ));
        }
        if dimension == 0 {
            return Err(EquilibriumError::InvalidGameSpec(
                "strategy dimension must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            num_players,
            dimension,
            oracle,
        })
    }

    /// Number of players.
    pub fn num_players(&self) -> usize {
        self.num_players
    }

    /// Strategy dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The payoff oracle.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// The all-ones starting profile for this game.
    pub fn default_start(&self) -> JointStrategy {
        JointStrategy::default_start(self.num_players, self.dimension)
    }

    /// Check that `profile` is a legal starting point for this game.
    pub fn check_profile(&self, profile: &JointStrategy) -> Result<(), EquilibriumError> {
        if profile.num_players() != self.num_players || profile.dimension() != self.dimension {
            return Err(EquilibriumError::InvalidGameSpec(format!(
                "start profile is {}x{}, game is {}x{}",
                profile.num_players(),
                profile.dimension(),
                self.num_players,
                self.dimension
            )));
        }
        if !profile.as_slice().iter().all(|v| v.is_finite() && *v >= 0.0) {
            return Err(EquilibriumError::InvalidGameSpec(
                "start profile entries must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
