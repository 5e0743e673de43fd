//! Configuration loading and typed config structures for Cadence.
//!
//! The canonical configuration lives in `cadence-config.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure, a loader
//! that reads the file, and the validation rules every consumer relies on
//! (non-zero tick interval, non-zero CPU ceilings, and so on).
//!
//! Per-player session settings are resolved exactly once, when the player
//! is registered: [`ResolvedSessionConfig::resolve`] folds the
//! [`SessionOverrides`] supplied at registration over the scheduler-wide
//! defaults and the result never changes afterwards.

use std::path::Path;
use std::time::Duration;

use cadence_types::{IntentKeyFn, PlayerId};
use serde::Deserialize;

use crate::script::ScriptOp;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of its allowed range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `cadence-config.yaml`. All fields have defaults,
/// so an empty file yields a runnable configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CadenceConfig {
    /// Tick clock settings.
    #[serde(default)]
    pub game_loop: LoopConfig,

    /// Scheduler-wide defaults applied to every player session.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Infrastructure connection strings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Players registered at startup by the engine binary.
    #[serde(default)]
    pub players: Vec<PlayerConfig>,
}

impl CadenceConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `DRAGONFLY_URL` overrides `infrastructure.dragonfly_url` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.infrastructure.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check every section for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.game_loop.validate()?;
        self.scheduler.cpu.validate()?;
        for player in &self.players {
            if let Some(cpu) = &player.cpu {
                cpu.validate().map_err(|e| ConfigError::Invalid {
                    reason: format!("player '{}': {e}", player.name),
                })?;
            }
        }
        Ok(())
    }
}

/// Tick clock configuration, fixed for the lifetime of a game loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoopConfig {
    /// Real-time milliseconds between tick boundaries.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Upper bound on ticks skipped after a single overrunning tick.
    #[serde(default = "default_max_catch_up_ticks")]
    pub max_catch_up_ticks: u64,

    /// Whether player memory is persisted periodically and on stop.
    #[serde(default = "default_true")]
    pub auto_save_memory: bool,

    /// Ticks between memory persistence batches.
    #[serde(default = "default_memory_save_interval")]
    pub memory_save_interval: u64,

    /// Simulated milliseconds stamped onto each tick's state.
    ///
    /// Falls back to `tick_interval_ms` when absent.
    #[serde(default)]
    pub delta_time_ms: Option<u64>,
}

impl LoopConfig {
    /// The tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The delta time stamped onto game state each tick.
    pub fn delta_time_ms(&self) -> u64 {
        self.delta_time_ms.unwrap_or(self.tick_interval_ms)
    }

    /// Validate the tick clock settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the tick interval is zero or
    /// auto-save is enabled with a zero save interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "game_loop.tick_interval_ms must be at least 1".to_owned(),
            });
        }
        if self.auto_save_memory && self.memory_save_interval == 0 {
            return Err(ConfigError::Invalid {
                reason: "game_loop.memory_save_interval must be at least 1 when auto_save_memory is enabled"
                    .to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_catch_up_ticks: default_max_catch_up_ticks(),
            auto_save_memory: true,
            memory_save_interval: default_memory_save_interval(),
            delta_time_ms: None,
        }
    }
}

/// Per-player CPU budget.
///
/// All times are milliseconds. The bucket starts full at `bucket_max_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CpuConfig {
    /// Wall-clock ceiling for one tick's execution.
    #[serde(default = "default_cpu_limit_ms")]
    pub cpu_limit_ms: u64,

    /// Abstract step ceiling for one tick's execution.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Capacity of the recoverable bucket.
    #[serde(default = "default_bucket_max_ms")]
    pub bucket_max_ms: u64,

    /// Amount added back to the bucket once per tick.
    #[serde(default = "default_bucket_recovery_ms")]
    pub bucket_recovery_ms: u64,
}

impl CpuConfig {
    /// Validate the CPU ceilings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any ceiling is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu_limit_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "cpu.cpu_limit_ms must be at least 1".to_owned(),
            });
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid {
                reason: "cpu.max_steps must be at least 1".to_owned(),
            });
        }
        if self.bucket_max_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "cpu.bucket_max_ms must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            cpu_limit_ms: default_cpu_limit_ms(),
            max_steps: default_max_steps(),
            bucket_max_ms: default_bucket_max_ms(),
            bucket_recovery_ms: default_bucket_recovery_ms(),
        }
    }
}

/// Scheduler-wide defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Default CPU budget for new sessions.
    #[serde(default)]
    pub cpu: CpuConfig,

    /// Log per-player execution details at `debug` level.
    #[serde(default)]
    pub debug: bool,

    /// Run active sessions on a rayon pool within a tick.
    #[serde(default)]
    pub parallel: bool,

    /// Size of the scheduler's own pool when `parallel` is set. 0 uses
    /// rayon's global pool.
    #[serde(default)]
    pub worker_threads: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Ticks between `info` level tick summaries (0 disables them).
    #[serde(default = "default_summary_every_ticks")]
    pub summary_every_ticks: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            summary_every_ticks: default_summary_every_ticks(),
        }
    }
}

/// Infrastructure connection strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Dragonfly (Redis-compatible) URL for the memory store.
    ///
    /// Empty means memory is kept in-process only.
    #[serde(default)]
    pub dragonfly_url: String,
}

impl InfrastructureConfig {
    /// Override connection strings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = val;
        }
    }
}

/// A player declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerConfig {
    /// Fixed identifier, so persisted memory survives restarts.
    ///
    /// A fresh ID is generated when absent.
    #[serde(default)]
    pub id: Option<PlayerId>,

    /// Human-readable name, used in logs only.
    pub name: String,

    /// CPU budget override for this player.
    #[serde(default)]
    pub cpu: Option<CpuConfig>,

    /// Debug logging override for this player.
    #[serde(default)]
    pub debug: Option<bool>,

    /// The player's program.
    #[serde(default)]
    pub script: Vec<ScriptOp>,
}

impl PlayerConfig {
    /// Session overrides declared for this player.
    pub fn overrides(&self) -> SessionOverrides {
        SessionOverrides {
            cpu: self.cpu,
            intent_key: None,
            debug: self.debug,
        }
    }
}

/// Per-registration overrides of the scheduler defaults.
#[derive(Debug, Clone, Default)]
pub struct SessionOverrides {
    /// CPU budget to use instead of the scheduler default.
    pub cpu: Option<CpuConfig>,
    /// Intent key extractor to use instead of the scheduler default.
    pub intent_key: Option<IntentKeyFn>,
    /// Debug flag to use instead of the scheduler default.
    pub debug: Option<bool>,
}

impl SessionOverrides {
    /// Override the CPU budget.
    #[must_use]
    pub const fn with_cpu(mut self, cpu: CpuConfig) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Override the intent key extractor.
    #[must_use]
    pub fn with_intent_key(mut self, intent_key: IntentKeyFn) -> Self {
        self.intent_key = Some(intent_key);
        self
    }

    /// Override the debug flag.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }
}

/// Session settings after overrides have been applied. Immutable.
#[derive(Debug, Clone)]
pub struct ResolvedSessionConfig {
    cpu: CpuConfig,
    intent_key: IntentKeyFn,
    debug: bool,
}

impl ResolvedSessionConfig {
    /// Fold `overrides` over the scheduler defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the resulting CPU budget is
    /// invalid.
    pub fn resolve(
        defaults: &SchedulerConfig,
        default_intent_key: &IntentKeyFn,
        overrides: SessionOverrides,
    ) -> Result<Self, ConfigError> {
        let cpu = overrides.cpu.unwrap_or(defaults.cpu);
        cpu.validate()?;
        Ok(Self {
            cpu,
            intent_key: overrides
                .intent_key
                .unwrap_or_else(|| default_intent_key.clone()),
            debug: overrides.debug.unwrap_or(defaults.debug),
        })
    }

    /// The resolved CPU budget.
    pub const fn cpu(&self) -> &CpuConfig {
        &self.cpu
    }

    /// The resolved intent key extractor.
    pub const fn intent_key(&self) -> &IntentKeyFn {
        &self.intent_key
    }

    /// Whether per-execution debug logging is enabled.
    pub const fn debug(&self) -> bool {
        self.debug
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_tick_interval_ms() -> u64 {
    1_000
}

const fn default_max_catch_up_ticks() -> u64 {
    5
}

const fn default_memory_save_interval() -> u64 {
    10
}

const fn default_cpu_limit_ms() -> u64 {
    50
}

const fn default_max_steps() -> u64 {
    100_000
}

const fn default_bucket_max_ms() -> u64 {
    1_000
}

const fn default_bucket_recovery_ms() -> u64 {
    50
}

const fn default_summary_every_ticks() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
