//! Intents: declarative actions proposed by player programs.
//!
//! An [`Intent`] is never applied by the scheduler. Programs emit them during
//! a tick, the scheduler aggregates them, and the owning system's intent
//! processor decides what they mean. The only thing the scheduler needs from
//! an intent is a key, supplied by an [`IntentKeyFn`], so that a player
//! proposing the same action twice in one tick collapses to one intent.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ids::PlayerId;

/// A tenant-authored, unapplied action for the current tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// The player whose program emitted this intent.
    pub player_id: PlayerId,
    /// Action name, interpreted by the intent processor (e.g. `"move"`).
    pub action: String,
    /// Optional object of the action (an entity id, a room name, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Free-form action arguments.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Intent {
    /// Build an intent with no target and a null payload.
    pub fn new(player_id: PlayerId, action: impl Into<String>) -> Self {
        Self {
            player_id,
            action: action.into(),
            target: None,
            payload: serde_json::Value::Null,
        }
    }

    /// Set the intent target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the intent payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Extracts the deduplication key of an intent.
///
/// Cloneable and shareable across sessions; the owning system supplies one
/// in the scheduler defaults and may override it per player.
#[derive(Clone)]
pub struct IntentKeyFn(Arc<dyn Fn(&Intent) -> String + Send + Sync>);

impl IntentKeyFn {
    /// Wrap a key extraction function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Intent) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Compute the key of `intent`.
    pub fn key(&self, intent: &Intent) -> String {
        (self.0)(intent)
    }
}

impl Default for IntentKeyFn {
    /// Keys intents by `action` and `target`: one `move` per target per tick.
    fn default() -> Self {
        Self::new(|intent| match &intent.target {
            Some(target) => format!("{}:{target}", intent.action),
            None => intent.action.clone(),
        })
    }
}

impl fmt::Debug for IntentKeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IntentKeyFn(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_combines_action_and_target() {
        let player = PlayerId::new();
        let keys = IntentKeyFn::default();

        let bare = Intent::new(player, "harvest");
        let targeted = Intent::new(player, "move").with_target("north");

        assert_eq!(keys.key(&bare), "harvest");
        assert_eq!(keys.key(&targeted), "move:north");
    }

    #[test]
    fn custom_key_fn_is_used() {
        let keys = IntentKeyFn::new(|intent| intent.player_id.to_string());
        let player = PlayerId::new();
        let intent = Intent::new(player, "attack").with_target("x");
        assert_eq!(keys.key(&intent), player.to_string());
    }

    #[test]
    fn payload_defaults_to_null_when_missing() {
        let player = PlayerId::new();
        let json = format!(r#"{{"player_id":"{player}","action":"say"}}"#);
        let intent: Intent = serde_json::from_str(&json).unwrap_or_else(|_| {
            Intent::new(player, "unparsed")
        });
        assert_eq!(intent.action, "say");
        assert_eq!(intent.payload, serde_json::Value::Null);
        assert!(intent.target.is_none());
    }
}
