//! Game state, per-player views, and persisted player memory.
//!
//! The canonical [`GameState`] belongs to the owning system. The scheduler
//! only ever sees it by shared reference and hands programs a [`GameView`],
//! either the whole world or a filtered projection built per player.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::PlayerId;

/// Opaque player memory: key to JSON value.
///
/// A `BTreeMap` keeps serialization order stable, so two equal memories
/// always persist to identical bytes.
pub type PlayerMemory = BTreeMap<String, serde_json::Value>;

/// Canonical game state as owned by the embedding system.
///
/// The game loop never builds one of these from scratch: it reads the
/// current state, stamps [`tick`](Self::tick) and
/// [`delta_time_ms`](Self::delta_time_ms), and passes it on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Tick the state was last stamped with.
    pub tick: u64,
    /// Simulated milliseconds per tick, stamped from the loop configuration.
    pub delta_time_ms: u64,
    /// The world document, interpreted only by programs and the intent
    /// processor.
    #[serde(default)]
    pub world: serde_json::Value,
}

impl GameState {
    /// Create a state at tick 0 around the given world document.
    pub const fn new(world: serde_json::Value) -> Self {
        Self {
            tick: 0,
            delta_time_ms: 0,
            world,
        }
    }

    /// Return a copy stamped with the given tick and delta time.
    #[must_use]
    pub fn stamped(&self, tick: u64, delta_time_ms: u64) -> Self {
        Self {
            tick,
            delta_time_ms,
            world: self.world.clone(),
        }
    }
}

/// Read-only snapshot handed to a program for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameView {
    /// Tick being executed.
    pub tick: u64,
    /// Data visible to the program.
    pub data: serde_json::Value,
}

impl GameView {
    /// A view exposing the entire world.
    pub fn full(state: &GameState) -> Self {
        Self {
            tick: state.tick,
            data: state.world.clone(),
        }
    }

    /// A view exposing only `data`.
    pub const fn filtered(tick: u64, data: serde_json::Value) -> Self {
        Self { tick, data }
    }
}

/// One element of a memory persistence batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Owner of the memory.
    pub player_id: PlayerId,
    /// The memory snapshot.
    pub memory: PlayerMemory,
}
