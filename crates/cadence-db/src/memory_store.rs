//! Player memory persisted in `Dragonfly`.
//!
//! Each memory is a JSON object at `player:{id}:memory`. A batch is written
//! with a single `MSET`, then the ids are added to the `players:memory`
//! index set so the whole population can be reloaded without `KEYS`.

use cadence_core::interfaces::{MemoryStore, StoreError};
use cadence_types::{MemoryEntry, PlayerId, PlayerMemory};
use tracing::{debug, warn};

use crate::dragonfly::DragonflyPool;
use crate::error::DbError;

/// Index set of players with stored memory.
pub const MEMORY_INDEX_KEY: &str = "players:memory";

/// Key holding one player's memory.
pub fn memory_key(player_id: PlayerId) -> String {
    format!("player:{player_id}:memory")
}

/// [`MemoryStore`] backed by a [`DragonflyPool`].
#[derive(Debug, Clone)]
pub struct DragonflyMemoryStore {
    pool: DragonflyPool,
}

impl DragonflyMemoryStore {
    /// Wrap a connected pool.
    pub const fn new(pool: DragonflyPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub const fn pool(&self) -> &DragonflyPool {
        &self.pool
    }

    /// Write a batch: one `MSET` for the values, one `SADD` for the index.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or either write fails.
    pub async fn save_batch(&self, entries: &[MemoryEntry]) -> Result<(), DbError> {
        let mut pairs = Vec::with_capacity(entries.len());
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            pairs.push((memory_key(entry.player_id), serde_json::to_string(&entry.memory)?));
            ids.push(entry.player_id.to_string());
        }

        self.pool.set_many(pairs).await?;
        self.pool.add_to_set(MEMORY_INDEX_KEY, ids).await?;
        debug!(players = entries.len(), "Saved player memory batch to Dragonfly");
        Ok(())
    }

    /// Read every indexed memory.
    ///
    /// Ids in the index without a stored value are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a read fails, an id in the index is not a
    /// valid player id, or a value is not valid JSON.
    pub async fn load_all(&self) -> Result<Vec<MemoryEntry>, DbError> {
        let members = self.pool.set_members(MEMORY_INDEX_KEY).await?;
        let mut ids = Vec::with_capacity(members.len());
        for member in &members {
            let id = member.parse::<PlayerId>().map_err(|e| DbError::Corrupt {
                key: MEMORY_INDEX_KEY.to_owned(),
                reason: format!("invalid player id '{member}': {e}"),
            })?;
            ids.push(id);
        }
        ids.sort();

        let keys = ids.iter().map(|id| memory_key(*id)).collect();
        let values = self.pool.get_many(keys).await?;

        let mut entries = Vec::with_capacity(ids.len());
        for (player_id, value) in ids.into_iter().zip(values) {
            let Some(json) = value else {
                warn!(player = %player_id, "Indexed player has no stored memory");
                continue;
            };
            let memory: PlayerMemory = serde_json::from_str(&json)?;
            entries.push(MemoryEntry { player_id, memory });
        }
        Ok(entries)
    }
}

impl MemoryStore for DragonflyMemoryStore {
    async fn save_player_memory_batch(&self, entries: &[MemoryEntry]) -> Result<(), StoreError> {
        Ok(self.save_batch(entries).await?)
    }

    async fn load_player_memories(&self) -> Result<Vec<MemoryEntry>, StoreError> {
        Ok(self.load_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_embeds_the_player_id() {
        let id = PlayerId::new();
        let key = memory_key(id);
        assert!(key.starts_with("player:"));
        assert!(key.ends_with(":memory"));
        assert!(key.contains(&id.to_string()));
    }
}
