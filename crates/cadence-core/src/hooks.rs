//! Observation points in the tick lifecycle.

use cadence_types::{GameState, TickExecutionResult};

use crate::game_loop::LoopError;
use crate::stats::LoopStats;

/// Callbacks invoked by the game loop at fixed points of every tick.
///
/// Every method defaults to a no-op, so implementors override only what
/// they observe. Hooks run on the loop's task and delay the tick while they
/// run.
pub trait LoopHooks: Send {
    /// A tick is about to read the game state.
    fn on_tick_start(&mut self, _tick: u64) {}

    /// The scheduler pass finished.
    fn on_players_executed(&mut self, _result: &TickExecutionResult) {}

    /// The intent processor produced the next state.
    fn on_intents_processed(&mut self, _tick: u64, _state: &GameState) {}

    /// The tick finished and statistics were updated.
    fn on_tick_end(&mut self, _tick: u64, _stats: &LoopStats) {}

    /// A tick or a memory save failed.
    fn on_error(&mut self, _error: &LoopError) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHooks;

impl LoopHooks for NoOpHooks {}
