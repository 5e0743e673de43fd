//! Per-player and per-tick execution results.
//!
//! A [`TickExecutionResult`] is produced fresh by every scheduler pass and is
//! never mutated afterwards. Per-player results are keyed by [`PlayerId`] in
//! a `BTreeMap`, which fixes the aggregation order independently of the
//! order sessions actually ran in.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::PlayerId;
use crate::intent::Intent;

/// Outcome of running one player's program for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerTickResult {
    /// Whether the program completed within budget and without a fault.
    pub success: bool,
    /// Intents produced. Always empty when `success` is `false`.
    pub intents: Vec<Intent>,
    /// Why the run failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Whether the run was truncated by the CPU limiter.
    #[serde(default)]
    pub cpu_exceeded: bool,
    /// CPU time committed for this run.
    pub cpu_used: Duration,
    /// Accountable steps the program performed.
    pub steps: u64,
}

impl PlayerTickResult {
    /// A successful result carrying `intents`.
    pub const fn succeeded(intents: Vec<Intent>, cpu_used: Duration, steps: u64) -> Self {
        Self {
            success: true,
            intents,
            failure_reason: None,
            cpu_exceeded: false,
            cpu_used,
            steps,
        }
    }

    /// A failed result with the given reason.
    pub fn failed(reason: impl Into<String>, cpu_used: Duration, steps: u64) -> Self {
        Self {
            success: false,
            intents: Vec::new(),
            failure_reason: Some(reason.into()),
            cpu_exceeded: false,
            cpu_used,
            steps,
        }
    }
}

/// Aggregate outcome of one scheduler pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickExecutionResult {
    /// Tick number that was executed.
    pub tick: u64,
    /// Wall-clock time the pass started.
    pub executed_at: DateTime<Utc>,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
    /// Result for every session that ran this tick.
    pub player_results: BTreeMap<PlayerId, PlayerTickResult>,
    /// Intents of all successful players, in player-id order.
    pub intents: Vec<Intent>,
    /// Number of players whose run succeeded.
    pub success_count: u32,
    /// Number of players whose run failed.
    pub failure_count: u32,
}

impl TickExecutionResult {
    /// Build a result from per-player outcomes.
    ///
    /// Intents are flattened from successful players only, walking the map in
    /// key order.
    pub fn from_player_results(
        tick: u64,
        executed_at: DateTime<Utc>,
        duration: Duration,
        player_results: BTreeMap<PlayerId, PlayerTickResult>,
    ) -> Self {
        let mut intents = Vec::new();
        let mut success_count: u32 = 0;
        let mut failure_count: u32 = 0;

        for result in player_results.values() {
            if result.success {
                intents.extend(result.intents.iter().cloned());
                success_count = success_count.saturating_add(1);
            } else {
                failure_count = failure_count.saturating_add(1);
            }
        }

        Self {
            tick,
            executed_at,
            duration,
            player_results,
            intents,
            success_count,
            failure_count,
        }
    }

    /// Number of players that ran this tick.
    pub fn players_executed(&self) -> usize {
        self.player_results.len()
    }
}
