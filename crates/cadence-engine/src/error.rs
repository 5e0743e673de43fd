//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and the run.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: cadence_core::config::ConfigError,
    },

    /// A configured player could not be registered.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: cadence_core::scheduler::SchedulerError,
    },

    /// The game loop failed outside of a tick.
    #[error("game loop error: {source}")]
    Loop {
        /// The underlying loop error.
        #[from]
        source: cadence_core::game_loop::LoopError,
    },

    /// Connecting to Dragonfly failed.
    #[error("data layer error: {source}")]
    Db {
        /// The underlying data layer error.
        #[from]
        source: cadence_db::DbError,
    },
}
