//! The tick scheduler: a registry of player sessions and one pass per tick.
//!
//! [`TickScheduler`] owns every [`PlayerSession`], keeps them in registration
//! order, and runs the active ones against the current game state. It does
//! not know about time or persistence; the game loop drives it.
//!
//! # One pass
//!
//! 1. Every `Active` session runs once against its view, on a rayon pool
//!    when `parallel` is set.
//! 2. Results are keyed by player id, so intents are aggregated in id order
//!    no matter how the sessions were scheduled.
//! 3. Every session's CPU bucket is recovered once, whether it ran or not.

use std::collections::BTreeMap;
use std::sync::Arc;

use cadence_types::{
    GameState, GameView, IntentKeyFn, MemoryEntry, PlayerId, PlayerTickResult, TickExecutionResult,
};
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ResolvedSessionConfig, SchedulerConfig, SessionOverrides};
use crate::cpu::duration_ms;
use crate::program::Program;
use crate::session::{PlayerSession, SessionState};

/// Errors returned by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A session for this player already exists.
    #[error("player {player_id} is already registered")]
    DuplicatePlayer {
        /// The player that was registered twice.
        player_id: PlayerId,
    },

    /// No session exists for this player.
    #[error("player {player_id} is not registered")]
    UnknownPlayer {
        /// The missing player.
        player_id: PlayerId,
    },

    /// The session configuration could not be resolved.
    #[error("invalid session configuration: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },
}

/// Aggregate counters over all registered sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Registered sessions.
    pub total_players: usize,
    /// Sessions in `Active`.
    pub active_players: usize,
    /// Sessions in `Suspended`.
    pub suspended_players: usize,
    /// Sessions in `Error`.
    pub error_players: usize,
    /// CPU committed across all sessions, in milliseconds.
    pub total_cpu_used_ms: u64,
    /// `total_cpu_used_ms` divided by the number of sessions.
    pub average_cpu_per_player_ms: u64,
    /// Sum of every session's executed tick count.
    pub total_ticks_executed: u64,
}

/// Registry of player sessions plus the per-tick execution pass.
#[derive(Debug)]
pub struct TickScheduler {
    config: SchedulerConfig,
    intent_key: IntentKeyFn,
    sessions: Vec<PlayerSession>,
    pool: Option<rayon::ThreadPool>,
}

impl TickScheduler {
    /// Create an empty scheduler with the given defaults.
    ///
    /// A dedicated pool is built when `parallel` is set with a non-zero
    /// `worker_threads`; otherwise the parallel pass uses rayon's global pool.
    pub fn new(config: SchedulerConfig) -> Self {
        let pool = if config.parallel && config.worker_threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(config.worker_threads)
                .thread_name(|i| format!("cadence-scheduler-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(error = %e, "Scheduler pool unavailable, using the global pool");
                    None
                }
            }
        } else {
            None
        };
        Self {
            config,
            intent_key: IntentKeyFn::default(),
            sessions: Vec::new(),
            pool,
        }
    }

    /// Replace the default intent key extractor for future registrations.
    #[must_use]
    pub fn with_intent_key(mut self, intent_key: IntentKeyFn) -> Self {
        self.intent_key = intent_key;
        self
    }

    /// Scheduler-wide defaults.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Register a player.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::DuplicatePlayer`] if the player is already
    /// registered (the existing session is left untouched), or
    /// [`SchedulerError::Config`] if the overrides resolve to an invalid
    /// budget.
    pub fn add_player(
        &mut self,
        player_id: PlayerId,
        program: Arc<dyn Program>,
        overrides: SessionOverrides,
    ) -> Result<(), SchedulerError> {
        if self.has_player(player_id) {
            return Err(SchedulerError::DuplicatePlayer { player_id });
        }
        let resolved = self.resolve(overrides)?;
        self.sessions
            .push(PlayerSession::new(player_id, program, resolved));
        info!(player = %player_id, players = self.sessions.len(), "Player registered");
        Ok(())
    }

    /// Unregister a player, returning its session if it existed.
    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<PlayerSession> {
        let position = self.position(player_id)?;
        let session = self.sessions.remove(position);
        info!(player = %player_id, players = self.sessions.len(), "Player removed");
        Some(session)
    }

    /// Replace a player's program, keeping its memory and its position.
    ///
    /// The new session starts `Active` with a fresh limiter.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownPlayer`] if the player is not
    /// registered, or [`SchedulerError::Config`] for invalid overrides.
    pub fn update_player_program(
        &mut self,
        player_id: PlayerId,
        program: Arc<dyn Program>,
        overrides: SessionOverrides,
    ) -> Result<(), SchedulerError> {
        let resolved = self.resolve(overrides)?;
        let slot = self
            .sessions
            .iter_mut()
            .find(|s| s.id() == player_id)
            .ok_or(SchedulerError::UnknownPlayer { player_id })?;

        let mut replacement = PlayerSession::new(player_id, program, resolved);
        replacement.set_memory(slot.memory().clone());
        *slot = replacement;
        info!(player = %player_id, "Player program updated");
        Ok(())
    }

    /// Whether a session exists for `player_id`.
    pub fn has_player(&self, player_id: PlayerId) -> bool {
        self.sessions.iter().any(|s| s.id() == player_id)
    }

    /// The session for `player_id`.
    pub fn session(&self, player_id: PlayerId) -> Option<&PlayerSession> {
        self.sessions.iter().find(|s| s.id() == player_id)
    }

    /// Mutable access to the session for `player_id`.
    pub fn session_mut(&mut self, player_id: PlayerId) -> Option<&mut PlayerSession> {
        self.sessions.iter_mut().find(|s| s.id() == player_id)
    }

    /// All sessions in registration order.
    pub fn sessions(&self) -> impl Iterator<Item = &PlayerSession> {
        self.sessions.iter()
    }

    /// Registered player ids in registration order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.sessions.iter().map(PlayerSession::id).collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn position(&self, player_id: PlayerId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == player_id)
    }

    fn resolve(&self, overrides: SessionOverrides) -> Result<ResolvedSessionConfig, ConfigError> {
        ResolvedSessionConfig::resolve(&self.config, &self.intent_key, overrides)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run every active session against the full game state.
    pub fn execute_tick(&mut self, state: &GameState) -> TickExecutionResult {
        self.execute_tick_with_views(state, |_, state| GameView::full(state))
    }

    /// Run every active session against a view built for it by `build_view`.
    pub fn execute_tick_with_views<F>(&mut self, state: &GameState, build_view: F) -> TickExecutionResult
    where
        F: Fn(PlayerId, &GameState) -> GameView + Sync,
    {
        let executed_at = Utc::now();
        let started = Instant::now();

        let player_results = if self.config.parallel {
            self.run_parallel(state, &build_view)
        } else {
            self.run_sequential(state, &build_view)
        };

        for session in &mut self.sessions {
            session.recover_bucket();
        }

        let result = TickExecutionResult::from_player_results(
            state.tick,
            executed_at,
            started.elapsed(),
            player_results,
        );

        debug!(
            tick = result.tick,
            players = result.players_executed(),
            successes = result.success_count,
            failures = result.failure_count,
            intents = result.intents.len(),
            duration_ms = duration_ms(result.duration),
            "Scheduler pass complete"
        );

        result
    }

    fn run_sequential<F>(&mut self, state: &GameState, build_view: &F) -> BTreeMap<PlayerId, PlayerTickResult>
    where
        F: Fn(PlayerId, &GameState) -> GameView,
    {
        let mut results = BTreeMap::new();
        for session in self.sessions.iter_mut().filter(|s| s.is_active()) {
            let view = build_view(session.id(), state);
            results.insert(session.id(), session.execute_tick(&view));
        }
        results
    }

    fn run_parallel<F>(&mut self, state: &GameState, build_view: &F) -> BTreeMap<PlayerId, PlayerTickResult>
    where
        F: Fn(PlayerId, &GameState) -> GameView + Sync,
    {
        let sessions = &mut self.sessions;
        let mut pass = move || {
            sessions
                .par_iter_mut()
                .filter(|s| s.is_active())
                .map(|session| {
                    let view = build_view(session.id(), state);
                    (session.id(), session.execute_tick(&view))
                })
                .collect::<BTreeMap<_, _>>()
        };
        match &self.pool {
            Some(pool) => pool.install(pass),
            None => pass(),
        }
    }

    // -----------------------------------------------------------------------
    // Bulk state changes
    // -----------------------------------------------------------------------

    /// Suspend every active session.
    pub fn suspend_all(&mut self) {
        for session in &mut self.sessions {
            session.suspend();
        }
    }

    /// Resume every suspended session. Returns how many were resumed.
    pub fn resume_all(&mut self) -> usize {
        self.sessions
            .iter_mut()
            .map(PlayerSession::resume)
            .filter(|resumed| *resumed)
            .count()
    }

    /// Reset every session. Memory is cleared only when `clear_memory` is set.
    pub fn reset_all(&mut self, clear_memory: bool) {
        for session in &mut self.sessions {
            session.reset(clear_memory);
        }
    }

    /// Remove every session.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Counters over all sessions.
    pub fn stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats {
            total_players: self.sessions.len(),
            ..SchedulerStats::default()
        };

        for session in &self.sessions {
            match session.state() {
                SessionState::Active => {
                    stats.active_players = stats.active_players.saturating_add(1);
                }
                SessionState::Suspended => {
                    stats.suspended_players = stats.suspended_players.saturating_add(1);
                }
                SessionState::Error => {
                    stats.error_players = stats.error_players.saturating_add(1);
                }
            }
            stats.total_cpu_used_ms = stats
                .total_cpu_used_ms
                .saturating_add(duration_ms(session.total_cpu_used()));
            stats.total_ticks_executed = stats
                .total_ticks_executed
                .saturating_add(session.ticks_executed());
        }

        let players = u64::try_from(stats.total_players).unwrap_or(u64::MAX);
        stats.average_cpu_per_player_ms = stats.total_cpu_used_ms.checked_div(players).unwrap_or(0);
        stats
    }

    // -----------------------------------------------------------------------
    // Memory persistence
    // -----------------------------------------------------------------------

    /// Snapshot every non-empty memory, in player-id order.
    pub fn collect_memories(&self) -> Vec<MemoryEntry> {
        let mut entries: Vec<MemoryEntry> = self
            .sessions
            .iter()
            .filter(|s| !s.memory().is_empty())
            .map(|s| MemoryEntry {
                player_id: s.id(),
                memory: s.memory().clone(),
            })
            .collect();
        entries.sort_by_key(|e| e.player_id);
        entries
    }

    /// Apply a loaded batch to registered players. Entries for unknown
    /// players are ignored. Returns how many entries were applied.
    pub fn restore_memories(&mut self, entries: Vec<MemoryEntry>) -> usize {
        let mut applied: usize = 0;
        for entry in entries {
            if let Some(session) = self.session_mut(entry.player_id) {
                session.set_memory(entry.memory);
                applied = applied.saturating_add(1);
            } else {
                debug!(player = %entry.player_id, "Skipping memory for unregistered player");
            }
        }
        applied
    }
}
