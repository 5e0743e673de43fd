//! Real-time tick driver.
//!
//! [`GameLoop`] owns a [`TickScheduler`] and drives it on a fixed interval:
//!
//! 1. Read the game state from the [`GameStateSource`] and stamp it with the
//!    tick number and delta time.
//! 2. Run the scheduler.
//! 3. Hand the intents to the [`IntentProcessor`] and publish its result.
//! 4. Advance the tick counter and, every `memory_save_interval` ticks,
//!    persist player memory in one batch.
//!
//! A tick that overruns the interval is not re-executed; the ticks it
//! covered are skipped (up to `max_catch_up_ticks`) so the counter keeps
//! pace with real time. Failed ticks are reported through [`LoopHooks`] and
//! the loop carries on.
//!
//! Pausing, resuming and stopping go through [`LoopControl`]; a
//! [`LoopHandle`] exposes them to other tasks while [`GameLoop::run`] owns
//! the loop.

use std::sync::Arc;
use std::time::Duration;

use cadence_types::{GameState, GameView, PlayerId, TickExecutionResult};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, LoopConfig};
use crate::control::{LoopControl, LoopHandle, LoopState};
use crate::cpu::duration_ms;
use crate::hooks::{LoopHooks, NoOpHooks};
use crate::interfaces::{
    GameStateSource, IntentProcessor, MemoryStore, ProcessError, StateError, StoreError,
};
use crate::scheduler::TickScheduler;
use crate::stats::LoopStats;

/// Errors raised by the game loop.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// The requested lifecycle change is not allowed from the current state.
    #[error("cannot move game loop from {from} to {to}")]
    InvalidTransition {
        /// State the loop was in.
        from: LoopState,
        /// State that was requested.
        to: LoopState,
    },

    /// The game state could not be read or published.
    #[error("game state error: {source}")]
    State {
        /// The underlying state error.
        #[from]
        source: StateError,
    },

    /// The intent processor failed.
    #[error("intent processing error: {source}")]
    Process {
        /// The underlying processor error.
        #[from]
        source: ProcessError,
    },

    /// The memory store failed.
    #[error("memory store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

/// Builds the view a player sees for one tick.
pub type ViewBuilder = Arc<dyn Fn(PlayerId, &GameState) -> GameView + Send + Sync>;

/// Fixed-interval driver around a [`TickScheduler`].
pub struct GameLoop<P, S, G, H = NoOpHooks> {
    config: LoopConfig,
    scheduler: TickScheduler,
    processor: P,
    store: S,
    state_source: G,
    hooks: H,
    view_builder: Option<ViewBuilder>,
    control: Arc<LoopControl>,
    current_tick: u64,
    ticks_since_save: u64,
    stats: LoopStats,
}

impl<P, S, G> GameLoop<P, S, G, NoOpHooks>
where
    P: IntentProcessor,
    S: MemoryStore,
    G: GameStateSource,
{
    /// Create an idle loop at tick 0 with no hooks.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` fails validation, e.g.
    /// a zero tick interval.
    pub fn new(
        config: LoopConfig,
        scheduler: TickScheduler,
        processor: P,
        store: S,
        state_source: G,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            scheduler,
            processor,
            store,
            state_source,
            hooks: NoOpHooks,
            view_builder: None,
            control: Arc::new(LoopControl::new()),
            current_tick: 0,
            ticks_since_save: 0,
            stats: LoopStats::default(),
        })
    }
}

impl<P, S, G, H> GameLoop<P, S, G, H>
where
    P: IntentProcessor,
    S: MemoryStore,
    G: GameStateSource,
    H: LoopHooks,
{
    /// Replace the hooks.
    pub fn with_hooks<H2: LoopHooks>(self, hooks: H2) -> GameLoop<P, S, G, H2> {
        GameLoop {
            config: self.config,
            scheduler: self.scheduler,
            processor: self.processor,
            store: self.store,
            state_source: self.state_source,
            hooks,
            view_builder: self.view_builder,
            control: self.control,
            current_tick: self.current_tick,
            ticks_since_save: self.ticks_since_save,
            stats: self.stats,
        }
    }

    /// Give each player a view built by `builder` instead of the full state.
    #[must_use]
    pub fn with_view_builder(mut self, builder: ViewBuilder) -> Self {
        self.view_builder = Some(builder);
        self
    }

    /// Start counting from `tick` instead of 0.
    #[must_use]
    pub const fn starting_at(mut self, tick: u64) -> Self {
        self.current_tick = tick;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Number of the next tick to execute.
    pub const fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Loop counters.
    pub const fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.control.state()
    }

    /// A handle that can pause, resume or stop this loop from another task.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle::new(Arc::clone(&self.control))
    }

    /// The loop configuration.
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// The scheduler.
    pub const fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    /// Mutable access to the scheduler, to register or update players.
    pub const fn scheduler_mut(&mut self) -> &mut TickScheduler {
        &mut self.scheduler
    }

    /// The memory store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The hooks.
    pub const fn hooks(&self) -> &H {
        &self.hooks
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// `Idle -> Running`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] unless idle.
    pub fn start(&mut self) -> Result<(), LoopError> {
        self.control.start()?;
        info!(
            tick = self.current_tick,
            tick_interval_ms = self.config.tick_interval_ms,
            players = self.scheduler.len(),
            "Game loop started"
        );
        Ok(())
    }

    /// `Running -> Paused`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] unless running.
    pub fn pause(&mut self) -> Result<(), LoopError> {
        self.control.pause()?;
        info!(tick = self.current_tick, "Game loop paused");
        Ok(())
    }

    /// `Paused -> Running`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] unless paused.
    pub fn resume(&mut self) -> Result<(), LoopError> {
        self.control.resume()?;
        info!(tick = self.current_tick, "Game loop resumed");
        Ok(())
    }

    /// Stop the loop: flush memory if auto-save is on, then go idle.
    ///
    /// Also completes a stop already requested through a [`LoopHandle`].
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] when idle.
    pub async fn stop(&mut self) -> Result<(), LoopError> {
        if self.control.state() != LoopState::Stopping {
            self.control.request_stop()?;
        }
        self.finish_stop().await;
        Ok(())
    }

    async fn finish_stop(&mut self) {
        if self.config.auto_save_memory {
            self.flush_memories().await;
        }
        self.control.finish_stop();
        info!(
            tick = self.current_tick,
            ticks_executed = self.stats.ticks_executed,
            ticks_skipped = self.stats.ticks_skipped,
            failed_ticks = self.stats.failed_ticks,
            "Game loop stopped"
        );
    }

    /// Drive ticks on the real-time clock until stopped.
    ///
    /// Starts the loop first if it is idle. Returns after the stop has been
    /// completed (memory flushed, state back to `Idle`).
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidTransition`] if the loop is already
    /// stopping when called. Tick failures do not end the loop.
    pub async fn run(&mut self) -> Result<(), LoopError> {
        if self.control.state() == LoopState::Idle {
            self.start()?;
        }
        let control = Arc::clone(&self.control);

        loop {
            match control.state() {
                LoopState::Running => {}
                LoopState::Paused => {
                    control.wait_while_paused().await;
                    continue;
                }
                LoopState::Stopping | LoopState::Idle => break,
            }

            let deadline = self.tick_cycle().await;

            while control.state() == LoopState::Running && Instant::now() < deadline {
                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => {}
                    () = control.changed() => {}
                }
            }
        }

        if control.state() == LoopState::Stopping {
            self.finish_stop().await;
        }
        Ok(())
    }

    /// One timer-driven iteration: execute, catch up, and return the next
    /// deadline.
    async fn tick_cycle(&mut self) -> Instant {
        let tick_start = Instant::now();
        let tick = self.current_tick;

        match self.execute_single_tick().await {
            Ok(_) => {
                self.handle_catch_up(tick_start.elapsed());
            }
            Err(err) => {
                self.stats.record_failed_tick();
                error!(tick, error = %err, "Tick failed");
                self.hooks.on_error(&err);
            }
        }

        tick_start
            .checked_add(self.config.tick_interval())
            .unwrap_or(tick_start)
    }

    // -----------------------------------------------------------------------
    // Tick execution
    // -----------------------------------------------------------------------

    /// Execute exactly one tick, regardless of lifecycle state.
    ///
    /// The tick counter only advances when every step succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::State`] or [`LoopError::Process`] if the game
    /// state or the intent processor fails.
    pub async fn execute_single_tick(&mut self) -> Result<TickExecutionResult, LoopError> {
        let started = Instant::now();
        let tick = self.current_tick;
        self.hooks.on_tick_start(tick);

        let state = self
            .state_source
            .game_state()
            .await?
            .stamped(tick, self.config.delta_time_ms());

        let result = match &self.view_builder {
            Some(builder) => self
                .scheduler
                .execute_tick_with_views(&state, |id, s| builder(id, s)),
            None => self.scheduler.execute_tick(&state),
        };
        self.hooks.on_players_executed(&result);

        let next_state = self
            .processor
            .process(state, result.intents.clone())
            .await?;
        self.hooks.on_intents_processed(tick, &next_state);
        self.state_source.update_game_state(next_state).await?;

        self.current_tick = tick.saturating_add(1);
        let duration = started.elapsed();
        self.stats.record_tick(duration);

        debug!(
            tick,
            players = result.players_executed(),
            failures = result.failure_count,
            intents = result.intents.len(),
            duration_ms = duration_ms(duration),
            "Tick complete"
        );

        if self.config.auto_save_memory {
            self.ticks_since_save = self.ticks_since_save.saturating_add(1);
            if self.ticks_since_save >= self.config.memory_save_interval {
                self.flush_memories().await;
            }
        }

        self.hooks.on_tick_end(tick, &self.stats);
        Ok(result)
    }

    /// Skip the ticks an overrunning tick covered.
    ///
    /// `missed = floor(duration / interval)`, clamped to
    /// `max_catch_up_ticks`. The counter advances by `missed` without
    /// executing anything. Returns `missed`.
    pub fn handle_catch_up(&mut self, duration: Duration) -> u64 {
        let interval = self.config.tick_interval();
        if duration <= interval {
            return 0;
        }

        let missed = duration
            .as_nanos()
            .checked_div(interval.as_nanos())
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(u64::MAX)
            .min(self.config.max_catch_up_ticks);

        if missed > 0 {
            self.current_tick = self.current_tick.saturating_add(missed);
            self.stats.record_skipped(missed);
            warn!(
                duration_ms = duration_ms(duration),
                tick_interval_ms = self.config.tick_interval_ms,
                skipped = missed,
                next_tick = self.current_tick,
                "Tick overran its interval, skipping ahead"
            );
        }
        missed
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write every non-empty player memory in one batch.
    ///
    /// Returns the number of memories written. An empty batch is not sent.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Store`] if the store rejects the batch.
    pub async fn save_memories(&mut self) -> Result<usize, LoopError> {
        self.ticks_since_save = 0;
        let batch = self.scheduler.collect_memories();
        if batch.is_empty() {
            debug!(tick = self.current_tick, "No player memory to save");
            return Ok(0);
        }

        if let Err(source) = self.store.save_player_memory_batch(&batch).await {
            self.stats.record_failed_save();
            return Err(LoopError::Store { source });
        }

        self.stats.record_save(self.current_tick);
        debug!(tick = self.current_tick, players = batch.len(), "Player memory saved");
        Ok(batch.len())
    }

    async fn flush_memories(&mut self) {
        if let Err(err) = self.save_memories().await {
            warn!(tick = self.current_tick, error = %err, "Player memory save failed");
            self.hooks.on_error(&err);
        }
    }

    /// Load stored memories and apply them to registered players.
    ///
    /// Returns how many players received memory.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Store`] if the store cannot be read.
    pub async fn restore_memories(&mut self) -> Result<usize, LoopError> {
        let entries = self.store.load_player_memories().await?;
        let loaded = entries.len();
        let applied = self.scheduler.restore_memories(entries);
        info!(loaded, applied, "Player memory restored");
        Ok(applied)
    }
}

impl<P, S, G, H> std::fmt::Debug for GameLoop<P, S, G, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameLoop")
            .field("config", &self.config)
            .field("state", &self.control.state())
            .field("current_tick", &self.current_tick)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
