//! Intent processor used by the standalone engine.
//!
//! The engine has no game rules of its own. [`CountingProcessor`] applies
//! intents by tallying them per action in the world document, which is
//! enough to watch a configured population act:
//!
//! ```json
//! { "intent_counts": { "harvest": 120, "move": 37 }, "last_tick": 59 }
//! ```

use cadence_core::interfaces::{IntentProcessor, ProcessError};
use cadence_types::{GameState, Intent};

/// Tallies intents per action into `world.intent_counts`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountingProcessor;

impl IntentProcessor for CountingProcessor {
    async fn process(&self, mut state: GameState, intents: Vec<Intent>) -> Result<GameState, ProcessError> {
        tally(&mut state, &intents)?;
        Ok(state)
    }
}

/// Add `intents` to the per-action counters and record the tick.
///
/// A `null` world is treated as an empty object.
///
/// # Errors
///
/// Returns [`ProcessError::Rejected`] if the world document or its
/// `intent_counts` entry is not a JSON object.
pub fn tally(state: &mut GameState, intents: &[Intent]) -> Result<(), ProcessError> {
    let tick = state.tick;
    if state.world.is_null() {
        state.world = serde_json::json!({});
    }
    let world = state.world.as_object_mut().ok_or_else(|| ProcessError::Rejected {
        reason: "world document is not an object".to_owned(),
    })?;

    let counts = world
        .entry("intent_counts")
        .or_insert_with(|| serde_json::json!({}))
        .as_object_mut()
        .ok_or_else(|| ProcessError::Rejected {
            reason: "world.intent_counts is not an object".to_owned(),
        })?;

    for intent in intents {
        let count = counts
            .entry(intent.action.clone())
            .or_insert_with(|| serde_json::json!(0));
        let next = count.as_u64().unwrap_or(0).saturating_add(1);
        *count = serde_json::json!(next);
    }

    world.insert("last_tick".to_owned(), serde_json::json!(tick));
    Ok(())
}
