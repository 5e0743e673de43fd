//! Player sessions: one program, one CPU limiter, one memory record.
//!
//! A [`PlayerSession`] is the unit the scheduler executes. It binds a
//! compiled [`Program`] to a [`CpuLimiter`], tracks a small state machine,
//! and owns the player's memory.
//!
//! # State machine
//!
//! ```text
//!            suspend()             fault
//! Active ---------------> Suspended     Active ------> Error
//!    ^                        |            ^             |
//!    +-------- resume() ------+            +-- reset() --+
//! ```
//!
//! Only `Active` sessions are executed. `Error` behaves like `Suspended` for
//! the scheduler but is left only through [`PlayerSession::reset`].
//!
//! # Faults and budget
//!
//! Everything that goes wrong inside a program stays inside the session.
//! Program errors and panics become a failed [`PlayerTickResult`] and move
//! the session to `Error`. Running out of budget is not a fault: the result
//! is failed with `cpu_exceeded` set, the run's intents and memory writes are
//! dropped, and the session stays `Active`.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use cadence_types::{GameView, Intent, IntentKeyFn, PlayerId, PlayerMemory, PlayerTickResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ResolvedSessionConfig;
use crate::cpu::{duration_ms, CpuLimiter, CpuStats};
use crate::program::{ExecutionContext, ExecutionOutput, Program, ProgramError};

/// Failure reason recorded when the limiter truncated a run.
pub const CPU_EXCEEDED_REASON: &str = "cpu budget exceeded";

/// Execution state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Executed every tick.
    Active,
    /// Skipped until resumed by its owner.
    Suspended,
    /// Skipped after a program fault until reset.
    Error,
}

/// One player's executable unit.
pub struct PlayerSession {
    id: PlayerId,
    program: Arc<dyn Program>,
    config: ResolvedSessionConfig,
    limiter: CpuLimiter,
    state: SessionState,
    memory: PlayerMemory,
    ticks_executed: u64,
    total_cpu_used: Duration,
    last_error: Option<String>,
}

impl PlayerSession {
    /// Create an active session with empty memory and a full bucket.
    pub fn new(id: PlayerId, program: Arc<dyn Program>, config: ResolvedSessionConfig) -> Self {
        let limiter = CpuLimiter::new(config.cpu());
        Self {
            id,
            program,
            config,
            limiter,
            state: SessionState::Active,
            memory: PlayerMemory::new(),
            ticks_executed: 0,
            total_cpu_used: Duration::ZERO,
            last_error: None,
        }
    }

    /// Run the program once against `view`.
    ///
    /// Opens and closes a limiter window around the run. Never fails: every
    /// problem is reported in the returned result.
    pub fn execute_tick(&mut self, view: &GameView) -> PlayerTickResult {
        self.limiter.start();

        let (run, output) = {
            let program = &self.program;
            let mut ctx = ExecutionContext::new(self.id, view, &self.memory, &mut self.limiter);
            let run = panic::catch_unwind(AssertUnwindSafe(|| program.run(&mut ctx)));
            (run, ctx.finish())
        };

        let cpu_used = self.limiter.end();
        let steps = self.limiter.steps();
        self.ticks_executed = self.ticks_executed.saturating_add(1);
        self.total_cpu_used = self.total_cpu_used.saturating_add(cpu_used);

        let exceeded = self.limiter.is_exceeded()
            || matches!(run, Ok(Err(ProgramError::BudgetExceeded)));

        let result = if exceeded {
            let mut result = PlayerTickResult::failed(CPU_EXCEEDED_REASON, cpu_used, steps);
            result.cpu_exceeded = true;
            result
        } else {
            match run {
                Ok(Ok(())) => {
                    let intents = self.commit(output);
                    PlayerTickResult::succeeded(intents, cpu_used, steps)
                }
                Ok(Err(err)) => self.fault(err.to_string(), cpu_used, steps),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    self.fault(format!("program panicked: {message}"), cpu_used, steps)
                }
            }
        };

        if self.config.debug() {
            debug!(
                player = %self.id,
                tick = view.tick,
                steps,
                cpu_used_ms = duration_ms(cpu_used),
                bucket_ms = duration_ms(self.limiter.bucket()),
                success = result.success,
                intents = result.intents.len(),
                "Player executed"
            );
        }

        result
    }

    /// Apply a successful run's output and return its intents.
    fn commit(&mut self, output: ExecutionOutput) -> Vec<Intent> {
        for key in &output.removed_keys {
            self.memory.remove(key);
        }
        self.merge_memory(output.staged_memory);

        let owned = output.intents.into_iter().map(|mut intent| {
            intent.player_id = self.id;
            intent
        });
        dedupe_intents(owned, self.config.intent_key())
    }

    fn fault(&mut self, reason: String, cpu_used: Duration, steps: u64) -> PlayerTickResult {
        warn!(player = %self.id, reason = reason.as_str(), "Player program faulted");
        self.state = SessionState::Error;
        self.last_error = Some(reason.clone());
        PlayerTickResult::failed(reason, cpu_used, steps)
    }

    /// Refill the CPU bucket. Called once per tick by the scheduler.
    pub fn recover_bucket(&mut self) {
        self.limiter.recover_bucket();
    }

    /// Stop executing this session until [`resume`](Self::resume).
    ///
    /// Sessions in `Error` stay in `Error`.
    pub fn suspend(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Suspended;
        }
    }

    /// Resume a suspended session. Returns whether the state changed.
    pub fn resume(&mut self) -> bool {
        if self.state == SessionState::Suspended {
            self.state = SessionState::Active;
            return true;
        }
        false
    }

    /// Clear counters and the last error, refill the bucket, and become
    /// `Active`. Memory is cleared only when `clear_memory` is set.
    pub fn reset(&mut self, clear_memory: bool) {
        self.limiter.reset();
        self.state = SessionState::Active;
        self.ticks_executed = 0;
        self.total_cpu_used = Duration::ZERO;
        self.last_error = None;
        if clear_memory {
            self.memory.clear();
        }
    }

    /// The player this session belongs to.
    pub const fn id(&self) -> PlayerId {
        self.id
    }

    /// Current execution state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the scheduler will execute this session.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// The resolved session configuration.
    pub const fn config(&self) -> &ResolvedSessionConfig {
        &self.config
    }

    /// The player's memory.
    pub const fn memory(&self) -> &PlayerMemory {
        &self.memory
    }

    /// Replace the player's memory.
    pub fn set_memory(&mut self, memory: PlayerMemory) {
        self.memory = memory;
    }

    /// Merge `entries` into the player's memory, overwriting existing keys.
    pub fn merge_memory(&mut self, entries: PlayerMemory) {
        self.memory.extend(entries);
    }

    /// Number of ticks this session has executed since creation or reset.
    pub const fn ticks_executed(&self) -> u64 {
        self.ticks_executed
    }

    /// CPU committed across all executions since creation or reset.
    pub const fn total_cpu_used(&self) -> Duration {
        self.total_cpu_used
    }

    /// Reason of the last fault, if the session is or was in `Error`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Limiter snapshot.
    pub fn cpu_stats(&self) -> CpuStats {
        self.limiter.stats()
    }
}

impl std::fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("ticks_executed", &self.ticks_executed)
            .field("total_cpu_used", &self.total_cpu_used)
            .field("memory_keys", &self.memory.len())
            .finish_non_exhaustive()
    }
}

/// Keep one intent per key: the last one emitted, at the position of the
/// first.
fn dedupe_intents(intents: impl IntoIterator<Item = Intent>, key_fn: &IntentKeyFn) -> Vec<Intent> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Intent> = Vec::new();

    for intent in intents {
        let key = key_fn.key(&intent);
        if let Some(slot) = positions.get(&key).and_then(|&idx| out.get_mut(idx)) {
            *slot = intent;
        } else {
            positions.insert(key, out.len());
            out.push(intent);
        }
    }
    out
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_owned();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_owned()
}
