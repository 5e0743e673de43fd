//! Game loop counters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Counters owned by a game loop, updated at tick end and at save points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    /// Ticks that ran to completion.
    pub ticks_executed: u64,
    /// Ticks skipped by catch-up.
    pub ticks_skipped: u64,
    /// Ticks that failed on state access or intent processing.
    pub failed_ticks: u64,
    /// Sum of completed tick durations.
    pub total_tick_duration: Duration,
    /// Duration of the most recent completed tick.
    pub last_tick_duration: Duration,
    /// Longest completed tick.
    pub max_tick_duration: Duration,
    /// Memory batches written successfully.
    pub saves_performed: u64,
    /// Memory batches the store rejected.
    pub failed_saves: u64,
    /// Tick counter value at the last successful save.
    pub last_save_tick: Option<u64>,
}

impl LoopStats {
    /// Mean duration of completed ticks.
    pub fn average_tick_duration(&self) -> Duration {
        let total = self.total_tick_duration.as_nanos();
        let average = total
            .checked_div(u128::from(self.ticks_executed))
            .unwrap_or(0);
        Duration::from_nanos(u64::try_from(average).unwrap_or(u64::MAX))
    }

    pub(crate) fn record_tick(&mut self, duration: Duration) {
        self.ticks_executed = self.ticks_executed.saturating_add(1);
        self.total_tick_duration = self.total_tick_duration.saturating_add(duration);
        self.last_tick_duration = duration;
        self.max_tick_duration = self.max_tick_duration.max(duration);
    }

    pub(crate) const fn record_failed_tick(&mut self) {
        self.failed_ticks = self.failed_ticks.saturating_add(1);
    }

    pub(crate) const fn record_skipped(&mut self, ticks: u64) {
        self.ticks_skipped = self.ticks_skipped.saturating_add(ticks);
    }

    pub(crate) const fn record_save(&mut self, tick: u64) {
        self.saves_performed = self.saves_performed.saturating_add(1);
        self.last_save_tick = Some(tick);
    }

    pub(crate) const fn record_failed_save(&mut self) {
        self.failed_saves = self.failed_saves.saturating_add(1);
    }
}
