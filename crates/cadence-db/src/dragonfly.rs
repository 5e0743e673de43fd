//! `Dragonfly` (Redis-compatible) connection and generic operations.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `world:tick` | Integer | Tick of the last published state |
//! | `world:state` | JSON | Canonical game state |
//! | `player:{id}:memory` | JSON | One player's memory |
//! | `players:memory` | Set | Player ids that have stored memory |

use fred::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DbError;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`] and provides typed JSON operations
/// for the key patterns above. Clones share the connection.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl std::fmt::Debug for DragonflyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragonflyPool").finish_non_exhaustive()
    }
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    // =========================================================================
    // Single keys
    // =========================================================================

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if the key does not exist.
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound(key.to_owned())),
            |s| Ok(serde_json::from_str(&s)?),
        )
    }

    /// Delete a key from `Dragonfly`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    // =========================================================================
    // Batches -- MSET / MGET
    // =========================================================================

    /// Store several pre-serialized JSON values in one `MSET`.
    ///
    /// Does nothing for an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_many(&self, pairs: Vec<(String, String)>) -> Result<(), DbError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let _: () = self.client.mset(pairs).await?;
        Ok(())
    }

    /// Read several keys in one `MGET`. Missing keys yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_many(&self, keys: Vec<String>) -> Result<Vec<Option<String>>, DbError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<String>> = self.client.mget(keys).await?;
        Ok(values)
    }

    // =========================================================================
    // Sets
    // =========================================================================

    /// Add `members` to the set at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn add_to_set(&self, key: &str, members: Vec<String>) -> Result<(), DbError> {
        if members.is_empty() {
            return Ok(());
        }
        let _: u32 = self.client.sadd(key, members).await?;
        Ok(())
    }

    /// All members of the set at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn set_members(&self, key: &str) -> Result<Vec<String>, DbError> {
        let members: Vec<String> = self.client.smembers(key).await?;
        Ok(members)
    }

    // =========================================================================
    // World tick -- world:tick
    // =========================================================================

    /// Set the current tick number (`world:tick`).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_world_tick(&self, tick: u64) -> Result<(), DbError> {
        let _: () = self
            .client
            .set("world:tick", tick.to_string().as_str(), None, None, false)
            .await?;
        Ok(())
    }

    /// Get the current tick number (`world:tick`).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if not set.
    /// Returns [`DbError::Corrupt`] if the value is not an integer.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_world_tick(&self) -> Result<u64, DbError> {
        let value: Option<String> = self.client.get("world:tick").await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound("world:tick".to_owned())),
            |s| {
                s.parse::<u64>().map_err(|e| DbError::Corrupt {
                    key: "world:tick".to_owned(),
                    reason: e.to_string(),
                })
            },
        )
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }
}
