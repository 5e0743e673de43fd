//! Per-player CPU governor.
//!
//! A [`CpuLimiter`] bounds the cost of running one player's program for one
//! tick with two independent ceilings, wall-clock time and abstract steps,
//! plus a recoverable bucket carried across ticks. A player that idles lets
//! the bucket refill and may later burst up to the static per-tick limit; a
//! player that keeps spending drains it and gets throttled.
//!
//! # Window lifecycle
//!
//! ```text
//! start() -> check_step() x N -> end() -> recover_bucket()
//! ```
//!
//! The effective time ceiling of a window is `min(cpu_limit, bucket)`. The
//! bucket is only ever drained by [`end`](CpuLimiter::end), with the usage
//! actually measured; nothing is reserved up front.
//!
//! The limiter never interrupts anyone. [`check_step`](CpuLimiter::check_step)
//! answers whether the caller may continue; stopping is the interpreter's
//! job.
//!
//! Time is read from [`tokio::time::Instant`], so a paused tokio test clock
//! makes every measurement deterministic.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CpuConfig;

/// Read-only snapshot of a limiter for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuStats {
    /// CPU committed by the last closed window, in milliseconds.
    pub used_ms: u64,
    /// Static per-tick time ceiling, in milliseconds.
    pub limit_ms: u64,
    /// Steps counted in the current (or last) window.
    pub steps: u64,
    /// Step ceiling.
    pub max_steps: u64,
    /// Current bucket level, in milliseconds.
    pub bucket_ms: u64,
    /// Whether the current (or last) window crossed a ceiling.
    pub exceeded: bool,
}

/// Time and step budget for one player.
#[derive(Debug, Clone)]
pub struct CpuLimiter {
    limit: Duration,
    max_steps: u64,
    bucket_max: Duration,
    bucket_recovery: Duration,

    bucket: Duration,
    steps: u64,
    used: Duration,
    exceeded: bool,
    window_start: Option<Instant>,
}

impl CpuLimiter {
    /// Create a limiter with a full bucket.
    pub const fn new(config: &CpuConfig) -> Self {
        let bucket_max = Duration::from_millis(config.bucket_max_ms);
        Self {
            limit: Duration::from_millis(config.cpu_limit_ms),
            max_steps: config.max_steps,
            bucket_max,
            bucket_recovery: Duration::from_millis(config.bucket_recovery_ms),
            bucket: bucket_max,
            steps: 0,
            used: Duration::ZERO,
            exceeded: false,
            window_start: None,
        }
    }

    /// Open a new accounting window.
    pub fn start(&mut self) {
        self.steps = 0;
        self.used = Duration::ZERO;
        self.exceeded = false;
        self.window_start = Some(Instant::now());
    }

    /// Count one unit of work and report whether the caller may continue.
    ///
    /// Returns `false`, and marks the window exceeded, once the step count
    /// passes `max_steps` or the elapsed time passes the effective limit.
    /// The flag stays set until the next [`start`](Self::start).
    pub fn check_step(&mut self) -> bool {
        self.steps = self.steps.saturating_add(1);

        if self.steps > self.max_steps {
            self.exceeded = true;
            return false;
        }
        if self.elapsed() > self.effective_limit() {
            self.exceeded = true;
            return false;
        }
        true
    }

    /// Close the window, commit the measured time, and drain the bucket.
    ///
    /// Returns the committed usage. Calling `end` without an open window
    /// commits nothing.
    pub fn end(&mut self) -> Duration {
        let Some(started) = self.window_start.take() else {
            return Duration::ZERO;
        };
        self.used = started.elapsed();
        self.bucket = self.bucket.saturating_sub(self.used);
        self.used
    }

    /// Refill the bucket by the recovery amount, capped at the maximum.
    pub fn recover_bucket(&mut self) {
        self.bucket = self
            .bucket
            .saturating_add(self.bucket_recovery)
            .min(self.bucket_max);
    }

    /// Restore the limiter to its freshly-constructed state.
    pub fn reset(&mut self) {
        self.bucket = self.bucket_max;
        self.steps = 0;
        self.used = Duration::ZERO;
        self.exceeded = false;
        self.window_start = None;
    }

    /// The time ceiling that applies to the current window.
    pub fn effective_limit(&self) -> Duration {
        self.limit.min(self.bucket)
    }

    /// Current bucket level.
    pub const fn bucket(&self) -> Duration {
        self.bucket
    }

    /// Usage committed by the last closed window.
    pub const fn used(&self) -> Duration {
        self.used
    }

    /// Steps counted in the current (or last) window.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Whether the current (or last) window crossed a ceiling.
    pub const fn is_exceeded(&self) -> bool {
        self.exceeded
    }

    /// Snapshot for observability. Does not mutate state.
    pub fn stats(&self) -> CpuStats {
        CpuStats {
            used_ms: duration_ms(self.used),
            limit_ms: duration_ms(self.limit),
            steps: self.steps,
            max_steps: self.max_steps,
            bucket_ms: duration_ms(self.bucket),
            exceeded: self.exceeded,
        }
    }

    fn elapsed(&self) -> Duration {
        self.window_start
            .map_or(Duration::ZERO, |started| started.elapsed())
    }
}

/// Whole milliseconds of `d`, saturating at `u64::MAX`.
pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cpu_limit_ms: u64, max_steps: u64, bucket_max_ms: u64, recovery: u64) -> CpuConfig {
        CpuConfig {
            cpu_limit_ms,
            max_steps,
            bucket_max_ms,
            bucket_recovery_ms: recovery,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn window_drains_and_recovery_refills() {
        let mut limiter = CpuLimiter::new(&config(50, 1_000, 100, 20));
        assert_eq!(limiter.bucket(), Duration::from_millis(100));

        limiter.start();
        tokio::time::advance(Duration::from_millis(30)).await;
        let used = limiter.end();

        assert_eq!(used, Duration::from_millis(30));
        assert_eq!(limiter.bucket(), Duration::from_millis(70));

        limiter.recover_bucket();
        assert_eq!(limiter.bucket(), Duration::from_millis(90));

        limiter.recover_bucket();
        assert_eq!(limiter.bucket(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_never_goes_negative() {
        let mut limiter = CpuLimiter::new(&config(50, 1_000, 100, 20));

        limiter.start();
        tokio::time::advance(Duration::from_millis(250)).await;
        limiter.end();

        assert_eq!(limiter.bucket(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_stays_in_range_over_mixed_sequences() {
        let mut limiter = CpuLimiter::new(&config(50, 1_000, 100, 35));
        let max = Duration::from_millis(100);

        for (i, window_ms) in [0_u64, 10, 80, 200, 5, 60, 0, 0, 0, 95].iter().enumerate() {
            limiter.start();
            tokio::time::advance(Duration::from_millis(*window_ms)).await;
            limiter.end();
            assert!(limiter.bucket() <= max, "window {i}: {:?}", limiter.bucket());

            limiter.recover_bucket();
            if i % 3 == 0 {
                limiter.recover_bucket();
            }
            assert!(limiter.bucket() <= max, "recover {i}: {:?}", limiter.bucket());
        }
    }

    #[test]
    fn step_ceiling_flags_exceeded_until_next_start() {
        let mut limiter = CpuLimiter::new(&config(10_000, 3, 10_000, 0));
        limiter.start();

        assert!(limiter.check_step());
        assert!(limiter.check_step());
        assert!(limiter.check_step());
        assert!(!limiter.is_exceeded());

        assert!(!limiter.check_step());
        assert!(limiter.is_exceeded());

        // Sticky for the rest of the window, including after end().
        assert!(!limiter.check_step());
        limiter.end();
        assert!(limiter.is_exceeded());

        limiter.start();
        assert!(!limiter.is_exceeded());
        assert!(limiter.check_step());
    }

    #[tokio::test(start_paused = true)]
    async fn time_ceiling_uses_static_limit_when_bucket_is_full() {
        let mut limiter = CpuLimiter::new(&config(50, 1_000, 100, 0));
        limiter.start();

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(limiter.check_step());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!limiter.check_step());
        assert!(limiter.is_exceeded());
    }

    #[tokio::test(start_paused = true)]
    async fn depleted_bucket_throttles_below_static_limit() {
        let mut limiter = CpuLimiter::new(&config(50, 1_000, 100, 0));

        // Spend 90ms of the bucket, leaving 10ms.
        limiter.start();
        tokio::time::advance(Duration::from_millis(90)).await;
        limiter.end();
        assert_eq!(limiter.effective_limit(), Duration::from_millis(10));

        limiter.start();
        tokio::time::advance(Duration::from_millis(11)).await;
        assert!(!limiter.check_step());
        assert!(limiter.is_exceeded());
    }

    #[test]
    fn end_without_start_commits_nothing() {
        let mut limiter = CpuLimiter::new(&config(50, 10, 100, 20));
        assert_eq!(limiter.end(), Duration::ZERO);
        assert_eq!(limiter.bucket(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn stats_reports_snapshot_without_mutation() {
        let mut limiter = CpuLimiter::new(&config(50, 10, 100, 20));
        limiter.start();
        limiter.check_step();
        limiter.check_step();
        tokio::time::advance(Duration::from_millis(12)).await;
        limiter.end();

        let stats = limiter.stats();
        assert_eq!(
            stats,
            CpuStats {
                used_ms: 12,
                limit_ms: 50,
                steps: 2,
                max_steps: 10,
                bucket_ms: 88,
                exceeded: false,
            }
        );
        assert_eq!(limiter.stats(), stats);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_refills_bucket() {
        let mut limiter = CpuLimiter::new(&config(50, 10, 100, 0));
        limiter.start();
        tokio::time::advance(Duration::from_millis(40)).await;
        limiter.end();
        assert_eq!(limiter.bucket(), Duration::from_millis(60));

        limiter.reset();
        assert_eq!(limiter.bucket(), Duration::from_millis(100));
        assert_eq!(limiter.steps(), 0);
        assert_eq!(limiter.used(), Duration::ZERO);
    }
}
