//! Integration tests for the `cadence-db` data layer.
//!
//! These tests require a live Dragonfly instance. Run with:
//!
//! ```bash
//! docker run -d -p 6379:6379 docker.dragonflydb.io/dragonflydb/dragonfly
//! cargo test -p cadence-db -- --ignored
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use cadence_core::interfaces::{GameStateSource, MemoryStore};
use cadence_db::memory_store::{MEMORY_INDEX_KEY, memory_key};
use cadence_db::{DbError, DragonflyGameState, DragonflyMemoryStore, DragonflyPool};
use cadence_types::{GameState, MemoryEntry, PlayerId, PlayerMemory};

/// Dragonfly connection URL for the local Docker instance.
const DRAGONFLY_URL: &str = "redis://localhost:6379";

async fn fresh_pool() -> DragonflyPool {
    let pool = DragonflyPool::connect(DRAGONFLY_URL)
        .await
        .expect("Failed to connect to Dragonfly -- is it running?");
    pool.flush_all().await.expect("Failed to flush");
    pool
}

fn entry(counter: u64) -> MemoryEntry {
    MemoryEntry {
        player_id: PlayerId::new(),
        memory: PlayerMemory::from([
            ("ticks".to_owned(), serde_json::json!(counter)),
            ("plan".to_owned(), serde_json::json!({ "target": "source-1" })),
        ]),
    }
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn world_tick_roundtrip() {
    let pool = fresh_pool().await;

    pool.set_world_tick(42).await.expect("Failed to set world tick");
    assert_eq!(pool.get_world_tick().await.expect("Failed to get tick"), 42);

    pool.flush_all().await.expect("Failed to flush");
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn missing_key_is_reported() {
    let pool = fresh_pool().await;

    let result: Result<serde_json::Value, DbError> = pool.get_json("nope").await;
    assert!(matches!(result, Err(DbError::KeyNotFound(ref k)) if k == "nope"));
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn memory_batch_roundtrip() {
    let pool = fresh_pool().await;
    let store = DragonflyMemoryStore::new(pool.clone());

    let mut batch = vec![entry(1), entry(2), entry(3)];
    store
        .save_player_memory_batch(&batch)
        .await
        .expect("Failed to save batch");

    let index = pool
        .set_members(MEMORY_INDEX_KEY)
        .await
        .expect("Failed to read index");
    assert_eq!(index.len(), 3);

    let mut loaded = store
        .load_player_memories()
        .await
        .expect("Failed to load memories");
    batch.sort_by_key(|e| e.player_id);
    loaded.sort_by_key(|e| e.player_id);
    assert_eq!(loaded, batch);

    pool.flush_all().await.expect("Failed to flush");
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn later_batches_overwrite_earlier_ones() {
    let pool = fresh_pool().await;
    let store = DragonflyMemoryStore::new(pool.clone());

    let first = entry(1);
    let player = first.player_id;
    store.save_player_memory_batch(&[first]).await.unwrap();

    let second = MemoryEntry {
        player_id: player,
        memory: PlayerMemory::from([("ticks".to_owned(), serde_json::json!(99))]),
    };
    store
        .save_player_memory_batch(&[second.clone()])
        .await
        .unwrap();

    let loaded = store.load_player_memories().await.unwrap();
    assert_eq!(loaded, vec![second]);

    pool.flush_all().await.expect("Failed to flush");
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn indexed_player_without_value_is_skipped() {
    let pool = fresh_pool().await;
    let store = DragonflyMemoryStore::new(pool.clone());

    let kept = entry(5);
    let dropped = entry(6);
    store
        .save_player_memory_batch(&[kept.clone(), dropped.clone()])
        .await
        .unwrap();
    pool.delete(&memory_key(dropped.player_id)).await.unwrap();

    let loaded = store.load_player_memories().await.unwrap();
    assert_eq!(loaded, vec![kept]);

    pool.flush_all().await.expect("Failed to flush");
}

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn game_state_falls_back_then_publishes() {
    let pool = fresh_pool().await;
    let initial = GameState::new(serde_json::json!({ "rooms": 1 }));
    let source = DragonflyGameState::new(pool.clone(), initial.clone());

    assert_eq!(source.game_state().await.unwrap(), initial);

    let next = GameState::new(serde_json::json!({ "rooms": 2 })).stamped(7, 1000);
    source.update_game_state(next.clone()).await.unwrap();

    assert_eq!(source.game_state().await.unwrap(), next);
    assert_eq!(pool.get_world_tick().await.unwrap(), 7);

    pool.flush_all().await.expect("Failed to flush");
}
