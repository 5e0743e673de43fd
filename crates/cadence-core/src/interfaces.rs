//! Collaborators the game loop depends on, plus in-process implementations.
//!
//! The loop is generic over three seams:
//!
//! - [`GameStateSource`] -- where the canonical state is read and published
//! - [`IntentProcessor`] -- the game rules that turn intents into a new state
//! - [`MemoryStore`] -- durable storage for player memory
//!
//! All three are async and return `Send` futures so a loop can be driven
//! from a spawned tokio task.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use cadence_types::{GameState, Intent, MemoryEntry, PlayerId, PlayerMemory};
use tokio::sync::{Mutex, RwLock};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from an [`IntentProcessor`].
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The processor refused to apply this tick's intents.
    #[error("intent processing rejected: {reason}")]
    Rejected {
        /// Why the intents were rejected.
        reason: String,
    },
}

/// Errors from a [`MemoryStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage backend failed.
    #[error("memory store backend error: {message}")]
    Backend {
        /// Backend error description.
        message: String,
    },

    /// A stored record could not be encoded or decoded.
    #[error("memory store serialization error: {source}")]
    Serialization {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

/// Errors from a [`GameStateSource`].
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The state could not be read or published.
    #[error("game state unavailable: {reason}")]
    Unavailable {
        /// Why the state is unavailable.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Applies a tick's intents to the game state.
pub trait IntentProcessor: Send + Sync {
    /// Produce the next state from `state` and the aggregated `intents`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] if the intents cannot be applied. The loop
    /// then treats the whole tick as failed.
    fn process(
        &self,
        state: GameState,
        intents: Vec<Intent>,
    ) -> impl Future<Output = Result<GameState, ProcessError>> + Send;
}

/// Durable storage for player memory.
pub trait MemoryStore: Send + Sync {
    /// Persist a batch of memories in one call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the batch could not be written.
    fn save_player_memory_batch(
        &self,
        entries: &[MemoryEntry],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Load every stored memory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn load_player_memories(&self) -> impl Future<Output = Result<Vec<MemoryEntry>, StoreError>> + Send;
}

/// Owner of the canonical game state.
pub trait GameStateSource: Send + Sync {
    /// Read the current state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the state cannot be read.
    fn game_state(&self) -> impl Future<Output = Result<GameState, StateError>> + Send;

    /// Publish the state produced by this tick.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the state cannot be published.
    fn update_game_state(&self, state: GameState) -> impl Future<Output = Result<(), StateError>> + Send;
}

// ---------------------------------------------------------------------------
// In-process implementations
// ---------------------------------------------------------------------------

/// Processor that returns the state unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProcessor;

impl IntentProcessor for PassthroughProcessor {
    async fn process(&self, state: GameState, _intents: Vec<Intent>) -> Result<GameState, ProcessError> {
        Ok(state)
    }
}

/// Game state behind an `Arc<RwLock<_>>`, shared with the embedding code.
#[derive(Debug, Clone, Default)]
pub struct SharedGameState {
    inner: Arc<RwLock<GameState>>,
}

impl SharedGameState {
    /// Wrap an initial state.
    pub fn new(state: GameState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> GameState {
        self.inner.read().await.clone()
    }
}

impl GameStateSource for SharedGameState {
    async fn game_state(&self) -> Result<GameState, StateError> {
        Ok(self.snapshot().await)
    }

    async fn update_game_state(&self, state: GameState) -> Result<(), StateError> {
        *self.inner.write().await = state;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    memories: BTreeMap<PlayerId, PlayerMemory>,
    batches: Vec<Vec<MemoryEntry>>,
}

/// Memory store kept in process. Records every batch it receives.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`.
    pub fn with_memories(entries: Vec<MemoryEntry>) -> Self {
        let memories = entries
            .into_iter()
            .map(|e| (e.player_id, e.memory))
            .collect();
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                memories,
                batches: Vec::new(),
            })),
        }
    }

    /// Every batch saved so far, in call order.
    pub async fn batches(&self) -> Vec<Vec<MemoryEntry>> {
        self.inner.lock().await.batches.clone()
    }

    /// The stored memory of one player.
    pub async fn memory(&self, player_id: PlayerId) -> Option<PlayerMemory> {
        self.inner.lock().await.memories.get(&player_id).cloned()
    }
}

impl MemoryStore for InMemoryStore {
    async fn save_player_memory_batch(&self, entries: &[MemoryEntry]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        for entry in entries {
            inner.memories.insert(entry.player_id, entry.memory.clone());
        }
        inner.batches.push(entries.to_vec());
        Ok(())
    }

    async fn load_player_memories(&self) -> Result<Vec<MemoryEntry>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .memories
            .iter()
            .map(|(player_id, memory)| MemoryEntry {
                player_id: *player_id,
                memory: memory.clone(),
            })
            .collect())
    }
}
