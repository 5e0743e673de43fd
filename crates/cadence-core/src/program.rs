//! The interpreter seam: what a player session runs each tick.
//!
//! A [`Program`] is a compiled player program. The scheduler does not know
//! how it is evaluated; it only hands it an [`ExecutionContext`] through
//! which the program reads its view and memory, stages memory writes, emits
//! intents, and asks the CPU limiter for permission to continue.
//!
//! Implementations must call [`ExecutionContext::check_step`] once per
//! accountable unit of work (one evaluated node, one loop iteration, one
//! host call) and stop as soon as it returns `false`. Nothing else bounds a
//! program's execution.

use std::fmt;

use cadence_types::{GameView, Intent, PlayerId, PlayerMemory};

use crate::cpu::CpuLimiter;

/// Errors a program can report back to its session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    /// The program stopped because the CPU limiter refused another step.
    #[error("cpu budget exceeded")]
    BudgetExceeded,

    /// The program faulted (runtime error, bad input, interpreter bug).
    #[error("program fault: {message}")]
    Fault {
        /// Description of the fault.
        message: String,
    },
}

impl ProgramError {
    /// Build a [`ProgramError::Fault`].
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
        }
    }
}

/// A compiled player program.
///
/// Programs are shared immutable code (`Arc<dyn Program>`); all per-player
/// state lives in the session and reaches the program through the context.
pub trait Program: Send + Sync + fmt::Debug {
    /// Run the program once for the current tick.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::BudgetExceeded`] when the program stopped on
    /// a refused step, or [`ProgramError::Fault`] for any other failure.
    fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), ProgramError>;
}

/// Everything a program can see and do during one execution.
pub struct ExecutionContext<'a> {
    player_id: PlayerId,
    view: &'a GameView,
    memory: &'a PlayerMemory,
    limiter: &'a mut CpuLimiter,
    staged_memory: PlayerMemory,
    removed_keys: Vec<String>,
    intents: Vec<Intent>,
}

impl<'a> ExecutionContext<'a> {
    /// Build a context for one execution.
    pub(crate) const fn new(
        player_id: PlayerId,
        view: &'a GameView,
        memory: &'a PlayerMemory,
        limiter: &'a mut CpuLimiter,
    ) -> Self {
        Self {
            player_id,
            view,
            memory,
            limiter,
            staged_memory: PlayerMemory::new(),
            removed_keys: Vec::new(),
            intents: Vec::new(),
        }
    }

    /// The player being executed.
    pub const fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// The tick being executed.
    pub const fn tick(&self) -> u64 {
        self.view.tick
    }

    /// The game view for this player.
    pub const fn view(&self) -> &GameView {
        self.view
    }

    /// Count one unit of work; `false` means stop now.
    pub fn check_step(&mut self) -> bool {
        self.limiter.check_step()
    }

    /// Read a memory value, seeing writes staged earlier in this run.
    pub fn memory_get(&self, key: &str) -> Option<&serde_json::Value> {
        if self.removed_keys.iter().any(|k| k == key) {
            return None;
        }
        self.staged_memory
            .get(key)
            .or_else(|| self.memory.get(key))
    }

    /// Stage a memory write. Applied only if the run succeeds.
    pub fn memory_set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        self.removed_keys.retain(|k| *k != key);
        self.staged_memory.insert(key, value);
    }

    /// Stage a memory removal. Applied only if the run succeeds.
    pub fn memory_remove(&mut self, key: &str) {
        self.staged_memory.remove(key);
        if !self.removed_keys.iter().any(|k| k == key) {
            self.removed_keys.push(key.to_owned());
        }
    }

    /// Propose an intent for this tick.
    pub fn emit(&mut self, intent: Intent) {
        self.intents.push(intent);
    }

    /// Consume the context, returning what the run produced.
    pub(crate) fn finish(self) -> ExecutionOutput {
        ExecutionOutput {
            intents: self.intents,
            staged_memory: self.staged_memory,
            removed_keys: self.removed_keys,
        }
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("player_id", &self.player_id)
            .field("tick", &self.view.tick)
            .field("intents", &self.intents.len())
            .finish_non_exhaustive()
    }
}

/// What a single execution produced, before the session commits it.
#[derive(Debug, Default)]
pub(crate) struct ExecutionOutput {
    pub(crate) intents: Vec<Intent>,
    pub(crate) staged_memory: PlayerMemory,
    pub(crate) removed_keys: Vec<String>,
}
