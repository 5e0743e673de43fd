//! Canonical game state kept in `Dragonfly`.

use cadence_core::interfaces::{GameStateSource, StateError};
use cadence_types::GameState;

use crate::dragonfly::DragonflyPool;
use crate::error::DbError;

/// Key holding the serialized [`GameState`].
pub const WORLD_STATE_KEY: &str = "world:state";

/// [`GameStateSource`] backed by a [`DragonflyPool`].
///
/// Until the first publish, reads return the initial state given at
/// construction.
#[derive(Debug, Clone)]
pub struct DragonflyGameState {
    pool: DragonflyPool,
    initial: GameState,
}

impl DragonflyGameState {
    /// Wrap a connected pool.
    pub const fn new(pool: DragonflyPool, initial: GameState) -> Self {
        Self { pool, initial }
    }

    /// Read `world:state`, falling back to the initial state if unset.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or the value is not a valid
    /// state.
    pub async fn load(&self) -> Result<GameState, DbError> {
        match self.pool.get_json(WORLD_STATE_KEY).await {
            Ok(state) => Ok(state),
            Err(DbError::KeyNotFound(_)) => Ok(self.initial.clone()),
            Err(err) => Err(err),
        }
    }

    /// Write `world:state` and `world:tick`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or either write fails.
    pub async fn publish(&self, state: &GameState) -> Result<(), DbError> {
        self.pool.set_json(WORLD_STATE_KEY, state).await?;
        self.pool.set_world_tick(state.tick).await
    }
}

impl GameStateSource for DragonflyGameState {
    async fn game_state(&self) -> Result<GameState, StateError> {
        Ok(self.load().await?)
    }

    async fn update_game_state(&self, state: GameState) -> Result<(), StateError> {
        Ok(self.publish(&state).await?)
    }
}
