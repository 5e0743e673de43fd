//! Data layer for Cadence, backed by `Dragonfly`.
//!
//! `Dragonfly` (a Redis-compatible server) keeps player memory durable
//! across restarts and can hold the canonical game state for deployments
//! that share it with other processes.
//!
//! ```text
//! GameLoop
//!     |
//!     +-- every N ticks / on stop --> DragonflyMemoryStore  (player:{id}:memory)
//!     |
//!     +-- read / publish state ----> DragonflyGameState    (world:state, world:tick)
//! ```
//!
//! # Modules
//!
//! - [`dragonfly`] -- Connection handle and generic JSON operations
//! - [`memory_store`] -- [`MemoryStore`] implementation for player memory
//! - [`state_store`] -- [`GameStateSource`] implementation for world state
//! - [`error`] -- Shared error types
//!
//! [`MemoryStore`]: cadence_core::interfaces::MemoryStore
//! [`GameStateSource`]: cadence_core::interfaces::GameStateSource

pub mod dragonfly;
pub mod error;
pub mod memory_store;
pub mod state_store;

// Re-export primary types for convenience.
pub use dragonfly::DragonflyPool;
pub use error::DbError;
pub use memory_store::DragonflyMemoryStore;
pub use state_store::DragonflyGameState;
