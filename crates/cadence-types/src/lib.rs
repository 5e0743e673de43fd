//! Shared type definitions for the Cadence tick scheduler.
//!
//! This crate holds the data that crosses component boundaries: player
//! identifiers, intents, game state and views, persisted memory, and the
//! results the scheduler hands back each tick.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for player identifiers
//! - [`intent`] -- Intents and the intent key extractor
//! - [`state`] -- Game state, per-player views, and memory batches
//! - [`result`] -- Per-player and per-tick execution results

pub mod ids;
pub mod intent;
pub mod result;
pub mod state;

// Re-export all public types at crate root for convenience.
pub use ids::PlayerId;
pub use intent::{Intent, IntentKeyFn};
pub use result::{PlayerTickResult, TickExecutionResult};
pub use state::{GameState, GameView, MemoryEntry, PlayerMemory};
