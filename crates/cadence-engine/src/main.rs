//! Cadence engine binary.
//!
//! Runs the players declared in `cadence-config.yaml` on a real-time game
//! loop until interrupted with Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`CADENCE_CONFIG` or `cadence-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Register configured players with the tick scheduler
//! 4. Pick the memory store and state source (Dragonfly or in-process)
//! 5. Restore persisted memory
//! 6. Run the game loop until Ctrl-C, then flush memory
//! 7. Log the final statistics

mod error;
mod players;
mod processor;
mod tick_logger;

use std::path::PathBuf;

use cadence_core::config::{CadenceConfig, InfrastructureConfig, LoggingConfig};
use cadence_core::game_loop::GameLoop;
use cadence_core::interfaces::{GameStateSource, InMemoryStore, MemoryStore, SharedGameState};
use cadence_core::scheduler::TickScheduler;
use cadence_core::stats::LoopStats;
use cadence_db::{DragonflyGameState, DragonflyMemoryStore, DragonflyPool};
use cadence_types::GameState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::processor::CountingProcessor;
use crate::tick_logger::TickLogger;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "cadence-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, player registration, the store
/// connection, or the loop itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    init_tracing(&config.logging);

    info!(
        tick_interval_ms = config.game_loop.tick_interval_ms,
        max_catch_up_ticks = config.game_loop.max_catch_up_ticks,
        parallel = config.scheduler.parallel,
        players = config.players.len(),
        "cadence-engine starting"
    );

    let mut scheduler = TickScheduler::new(config.scheduler.clone());
    let ids = players::register_players(&mut scheduler, &config.players)?;
    info!(players = ids.len(), "Players registered");

    let initial = GameState::new(serde_json::json!({}));
    let stats = if config.infrastructure.dragonfly_url.is_empty() {
        info!("No Dragonfly URL configured, keeping memory in-process");
        run_loop(
            &config,
            scheduler,
            InMemoryStore::new(),
            SharedGameState::new(initial),
        )
        .await?
    } else {
        let pool = connect(&config.infrastructure).await?;
        run_loop(
            &config,
            scheduler,
            DragonflyMemoryStore::new(pool.clone()),
            DragonflyGameState::new(pool, initial),
        )
        .await?
    };

    info!(
        ticks_executed = stats.ticks_executed,
        ticks_skipped = stats.ticks_skipped,
        failed_ticks = stats.failed_ticks,
        avg_tick_ms = stats.average_tick_duration().as_millis(),
        max_tick_ms = stats.max_tick_duration.as_millis(),
        saves = stats.saves_performed,
        failed_saves = stats.failed_saves,
        "cadence-engine stopped"
    );
    Ok(())
}

/// Drive the game loop over the given store and state source until stopped.
async fn run_loop<S, G>(
    config: &CadenceConfig,
    scheduler: TickScheduler,
    store: S,
    state_source: G,
) -> Result<LoopStats, EngineError>
where
    S: MemoryStore,
    G: GameStateSource,
{
    let mut game_loop = GameLoop::new(
        config.game_loop.clone(),
        scheduler,
        CountingProcessor,
        store,
        state_source,
    )?
    .with_hooks(TickLogger::new(config.logging.summary_every_ticks));

    game_loop.restore_memories().await?;

    let handle = game_loop.handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Ctrl-C received, stopping after the current tick");
        if let Err(e) = handle.stop() {
            warn!(error = %e, "Stop request rejected");
        }
    });

    game_loop.run().await?;

    for session in game_loop.scheduler().sessions() {
        info!(
            player = %session.id(),
            state = ?session.state(),
            ticks_executed = session.ticks_executed(),
            cpu_used_ms = session.total_cpu_used().as_millis(),
            last_error = session.last_error(),
            "Player summary"
        );
    }

    if game_loop.hooks().errors() > 0 {
        warn!(errors = game_loop.hooks().errors(), "Loop reported errors during the run");
    }
    Ok(game_loop.stats().clone())
}

/// Connect to Dragonfly at the configured URL.
async fn connect(infrastructure: &InfrastructureConfig) -> Result<DragonflyPool, EngineError> {
    info!(url = %infrastructure.dragonfly_url, "Connecting to Dragonfly");
    Ok(DragonflyPool::connect(&infrastructure.dragonfly_url).await?)
}

/// Load configuration from `CADENCE_CONFIG` or `cadence-config.yaml`.
///
/// Falls back to defaults when the file does not exist. Logging is not yet
/// initialized here, so nothing is logged.
fn load_config() -> Result<CadenceConfig, EngineError> {
    let path = std::env::var_os("CADENCE_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        Ok(CadenceConfig::from_file(&path)?)
    } else {
        let mut config = CadenceConfig::default();
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
