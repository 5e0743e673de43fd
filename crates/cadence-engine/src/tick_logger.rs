//! Loop hooks that log a periodic tick summary.

use cadence_core::game_loop::LoopError;
use cadence_core::hooks::LoopHooks;
use cadence_core::stats::LoopStats;
use cadence_types::TickExecutionResult;
use tracing::{debug, info};

/// Logs every player pass at `debug` and every `every`-th tick at `info`.
#[derive(Debug, Clone, Default)]
pub struct TickLogger {
    every: u64,
    intents_since_summary: u64,
    failures_since_summary: u64,
    errors: u64,
}

impl TickLogger {
    /// Summarize every `every` ticks. Zero disables summaries.
    pub const fn new(every: u64) -> Self {
        Self {
            every,
            intents_since_summary: 0,
            failures_since_summary: 0,
            errors: 0,
        }
    }

    /// Loop errors observed so far.
    pub const fn errors(&self) -> u64 {
        self.errors
    }

    const fn summary_due(&self, tick: u64) -> bool {
        matches!(tick.checked_rem(self.every), Some(0))
    }
}

impl LoopHooks for TickLogger {
    fn on_players_executed(&mut self, result: &TickExecutionResult) {
        let intents = u64::try_from(result.intents.len()).unwrap_or(u64::MAX);
        self.intents_since_summary = self.intents_since_summary.saturating_add(intents);
        self.failures_since_summary = self
            .failures_since_summary
            .saturating_add(u64::from(result.failure_count));

        debug!(
            tick = result.tick,
            players = result.players_executed(),
            successes = result.success_count,
            failures = result.failure_count,
            intents = result.intents.len(),
            "Players executed"
        );
    }

    fn on_tick_end(&mut self, tick: u64, stats: &LoopStats) {
        if !self.summary_due(tick) {
            return;
        }
        info!(
            tick,
            intents = self.intents_since_summary,
            player_failures = self.failures_since_summary,
            ticks_executed = stats.ticks_executed,
            ticks_skipped = stats.ticks_skipped,
            failed_ticks = stats.failed_ticks,
            avg_tick_ms = stats.average_tick_duration().as_millis(),
            "Tick summary"
        );
        self.intents_since_summary = 0;
        self.failures_since_summary = 0;
    }

    fn on_error(&mut self, _error: &LoopError) {
        self.errors = self.errors.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use cadence_core::interfaces::StoreError;
    use cadence_types::{PlayerId, PlayerTickResult};

    use super::*;

    fn two_failures(tick: u64) -> TickExecutionResult {
        let failed = || PlayerTickResult::failed("cpu budget exceeded", Duration::from_millis(5), 0);
        let results = BTreeMap::from([(PlayerId::new(), failed()), (PlayerId::new(), failed())]);
        TickExecutionResult::from_player_results(tick, Default::default(), Duration::ZERO, results)
    }

    #[test]
    fn summaries_reset_their_counters() {
        let mut logger = TickLogger::new(5);
        let stats = LoopStats::default();

        for tick in 1..=5 {
            logger.on_players_executed(&two_failures(tick));
            logger.on_tick_end(tick, &stats);
        }
        assert_eq!(logger.failures_since_summary, 0);

        logger.on_players_executed(&two_failures(6));
        logger.on_tick_end(6, &stats);
        assert_eq!(logger.failures_since_summary, 2);
    }

    #[test]
    fn zero_disables_summaries() {
        let logger = TickLogger::new(0);
        assert!(!logger.summary_due(0));
        assert!(!logger.summary_due(10));
    }

    #[test]
    fn errors_are_counted() {
        let mut logger = TickLogger::new(1);
        let err = LoopError::Store {
            source: StoreError::Backend {
                message: "down".to_owned(),
            },
        };
        logger.on_error(&err);
        logger.on_error(&err);
        assert_eq!(logger.errors(), 2);
    }
}
