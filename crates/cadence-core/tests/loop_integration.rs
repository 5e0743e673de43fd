//! End-to-end tests of the game loop driving real sessions.
//!
//! Every test runs on a paused tokio clock, so tick timing is exact and the
//! suite finishes instantly.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::items_after_statements,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cadence_core::config::{CpuConfig, LoopConfig, SchedulerConfig, SessionOverrides};
use cadence_core::control::LoopState;
use cadence_core::game_loop::{GameLoop, LoopError};
use cadence_core::hooks::LoopHooks;
use cadence_core::interfaces::{
    InMemoryStore, IntentProcessor, MemoryStore, PassthroughProcessor, ProcessError,
    SharedGameState, StoreError,
};
use cadence_core::scheduler::TickScheduler;
use cadence_core::script::{ScriptOp, ScriptedProgram};
use cadence_core::session::SessionState;
use cadence_types::{GameState, GameView, Intent, MemoryEntry, PlayerId, TickExecutionResult};

/// Adds one to `world.applied` per intent it receives.
#[derive(Debug, Default)]
struct TallyProcessor {
    delay_first_call: Duration,
    calls: AtomicU64,
}

impl IntentProcessor for TallyProcessor {
    async fn process(&self, mut state: GameState, intents: Vec<Intent>) -> Result<GameState, ProcessError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 && !self.delay_first_call.is_zero() {
            tokio::time::sleep(self.delay_first_call).await;
        }
        let applied = state.world["applied"].as_u64().unwrap_or(0);
        let added = u64::try_from(intents.len()).unwrap_or(u64::MAX);
        state.world["applied"] = serde_json::json!(applied.saturating_add(added));
        Ok(state)
    }
}

/// Store that rejects every write.
#[derive(Debug, Default)]
struct BrokenStore;

impl MemoryStore for BrokenStore {
    async fn save_player_memory_batch(&self, _entries: &[MemoryEntry]) -> Result<(), StoreError> {
        Err(StoreError::Backend {
            message: "disk full".to_owned(),
        })
    }

    async fn load_player_memories(&self) -> Result<Vec<MemoryEntry>, StoreError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Default)]
struct Recorder {
    results: Vec<TickExecutionResult>,
    errors: Vec<String>,
}

impl LoopHooks for Recorder {
    fn on_players_executed(&mut self, result: &TickExecutionResult) {
        self.results.push(result.clone());
    }

    fn on_error(&mut self, error: &LoopError) {
        self.errors.push(error.to_string());
    }
}

fn config() -> LoopConfig {
    LoopConfig {
        tick_interval_ms: 1_000,
        max_catch_up_ticks: 5,
        auto_save_memory: true,
        memory_save_interval: 100,
        delta_time_ms: None,
    }
}

fn worker(action: &str) -> Arc<ScriptedProgram> {
    Arc::new(ScriptedProgram::new(vec![
        ScriptOp::CountTicks {
            key: "ticks".to_owned(),
        },
        ScriptOp::Emit {
            action: action.to_owned(),
            target: None,
            payload: serde_json::Value::Null,
        },
    ]))
}

fn hog() -> Arc<ScriptedProgram> {
    Arc::new(ScriptedProgram::new(vec![
        ScriptOp::Emit {
            action: "greedy".to_owned(),
            target: None,
            payload: serde_json::Value::Null,
        },
        ScriptOp::Work { steps: 1_000_000 },
    ]))
}

fn shared_world() -> SharedGameState {
    SharedGameState::new(GameState::new(serde_json::json!({ "applied": 0 })))
}

#[tokio::test(start_paused = true)]
async fn mixed_population_runs_for_several_ticks() {
    let mut scheduler = TickScheduler::new(SchedulerConfig::default());
    let workers: Vec<PlayerId> = (0..3).map(|_| PlayerId::new()).collect();
    for id in &workers {
        scheduler
            .add_player(*id, worker("harvest"), SessionOverrides::default())
            .unwrap();
    }
    let sleeper = PlayerId::new();
    scheduler
        .add_player(sleeper, worker("sleep"), SessionOverrides::default())
        .unwrap();
    scheduler.session_mut(sleeper).unwrap().suspend();

    let greedy = PlayerId::new();
    let tight = CpuConfig {
        max_steps: 50,
        ..CpuConfig::default()
    };
    scheduler
        .add_player(greedy, hog(), SessionOverrides::default().with_cpu(tight))
        .unwrap();

    let world = shared_world();
    let mut game_loop = GameLoop::new(
        config(),
        scheduler,
        TallyProcessor::default(),
        InMemoryStore::new(),
        world.clone(),
    )
    .unwrap()
    .with_hooks(Recorder::default());

    let handle = game_loop.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        handle.stop().unwrap();
    });
    game_loop.run().await.unwrap();

    let results = &game_loop.hooks().results;
    assert_eq!(results.len(), 3);
    for result in results {
        assert_eq!(result.players_executed(), 4);
        assert_eq!(result.success_count, 3);
        assert_eq!(result.failure_count, 1);
        assert!(result.intents.iter().all(|i| workers.contains(&i.player_id)));
        assert!(result.player_results[&greedy].cpu_exceeded);
    }

    // 3 ticks x 3 workers.
    assert_eq!(world.snapshot().await.world["applied"], serde_json::json!(9));

    let scheduler = game_loop.scheduler();
    assert_eq!(scheduler.session(greedy).unwrap().state(), SessionState::Active);
    assert_eq!(scheduler.session(sleeper).unwrap().ticks_executed(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_tick_skips_ahead_through_the_real_loop() {
    let mut scheduler = TickScheduler::new(SchedulerConfig::default());
    scheduler
        .add_player(PlayerId::new(), worker("x"), SessionOverrides::default())
        .unwrap();

    let processor = TallyProcessor {
        delay_first_call: Duration::from_millis(3_500),
        ..TallyProcessor::default()
    };
    let world = shared_world();
    let mut game_loop = GameLoop::new(config(), scheduler, processor, InMemoryStore::new(), world)
        .unwrap()
        .with_hooks(Recorder::default());

    let handle = game_loop.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3_600)).await;
        handle.stop().unwrap();
    });
    game_loop.run().await.unwrap();

    // Tick 0 overran to 3500ms: counter moved 0 -> 4, three ticks skipped.
    // Tick 4 ran immediately at 3500ms, then the stop arrived.
    let ticks: Vec<u64> = game_loop.hooks().results.iter().map(|r| r.tick).collect();
    assert_eq!(ticks, vec![0, 4]);
    assert_eq!(game_loop.stats().ticks_skipped, 3);
    assert_eq!(game_loop.current_tick(), 5);
}

#[tokio::test(start_paused = true)]
async fn stop_writes_one_batch_with_every_non_empty_memory() {
    let mut scheduler = TickScheduler::new(SchedulerConfig::default());
    let mut remembering: Vec<PlayerId> = (0..4).map(|_| PlayerId::new()).collect();
    for id in &remembering {
        scheduler
            .add_player(*id, worker("x"), SessionOverrides::default())
            .unwrap();
    }
    scheduler
        .add_player(
            PlayerId::new(),
            Arc::new(ScriptedProgram::default()),
            SessionOverrides::default(),
        )
        .unwrap();

    let store = InMemoryStore::new();
    let mut game_loop = GameLoop::new(
        config(),
        scheduler,
        PassthroughProcessor,
        store.clone(),
        shared_world(),
    )
    .unwrap();

    game_loop.start().unwrap();
    for _ in 0..3 {
        game_loop.execute_single_tick().await.unwrap();
    }
    game_loop.pause().unwrap();
    game_loop.stop().await.unwrap();

    assert_eq!(game_loop.state(), LoopState::Idle);
    let batches = store.batches().await;
    assert_eq!(batches.len(), 1);

    let mut saved: Vec<PlayerId> = batches[0].iter().map(|e| e.player_id).collect();
    remembering.sort();
    saved.sort();
    assert_eq!(saved, remembering);
    assert!(batches[0]
        .iter()
        .all(|e| e.memory.get("ticks") == Some(&serde_json::json!(3))));
}

#[tokio::test(start_paused = true)]
async fn memory_survives_a_restart_through_the_store() {
    let player = PlayerId::new();
    let store = InMemoryStore::new();

    for _ in 0..2 {
        let mut scheduler = TickScheduler::new(SchedulerConfig::default());
        scheduler
            .add_player(player, worker("x"), SessionOverrides::default())
            .unwrap();
        let mut game_loop = GameLoop::new(
            config(),
            scheduler,
            PassthroughProcessor,
            store.clone(),
            shared_world(),
        )
        .unwrap();
        game_loop.restore_memories().await.unwrap();
        game_loop.start().unwrap();
        for _ in 0..5 {
            game_loop.execute_single_tick().await.unwrap();
        }
        game_loop.stop().await.unwrap();
    }

    let memory = store.memory(player).await.unwrap();
    assert_eq!(memory.get("ticks"), Some(&serde_json::json!(10)));
}

#[tokio::test(start_paused = true)]
async fn failed_saves_are_reported_and_the_loop_continues() {
    let mut scheduler = TickScheduler::new(SchedulerConfig::default());
    scheduler
        .add_player(PlayerId::new(), worker("x"), SessionOverrides::default())
        .unwrap();
    let loop_config = LoopConfig {
        memory_save_interval: 2,
        ..config()
    };
    let mut game_loop = GameLoop::new(
        loop_config,
        scheduler,
        PassthroughProcessor,
        BrokenStore,
        shared_world(),
    )
    .unwrap()
    .with_hooks(Recorder::default());

    for _ in 0..4 {
        game_loop.execute_single_tick().await.unwrap();
    }

    assert_eq!(game_loop.current_tick(), 4);
    assert_eq!(game_loop.stats().failed_saves, 2);
    assert_eq!(game_loop.stats().saves_performed, 0);
    assert_eq!(game_loop.hooks().errors.len(), 2);
    assert!(game_loop.hooks().errors[0].contains("disk full"));
}

#[tokio::test(start_paused = true)]
async fn filtered_views_reach_programs() {
    use cadence_core::program::{ExecutionContext, Program, ProgramError};

    #[derive(Debug)]
    struct ReportsView;
    impl Program for ReportsView {
        fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), ProgramError> {
            let visible = ctx.view().data.clone();
            ctx.emit(Intent::new(ctx.player_id(), "report").with_payload(visible));
            Ok(())
        }
    }

    let mut scheduler = TickScheduler::new(SchedulerConfig {
        parallel: true,
        ..SchedulerConfig::default()
    });
    let players: Vec<PlayerId> = (0..6).map(|_| PlayerId::new()).collect();
    for id in &players {
        scheduler
            .add_player(*id, Arc::new(ReportsView), SessionOverrides::default())
            .unwrap();
    }

    let mut game_loop = GameLoop::new(
        config(),
        scheduler,
        PassthroughProcessor,
        InMemoryStore::new(),
        shared_world(),
    )
    .unwrap()
    .with_view_builder(Arc::new(|id: PlayerId, state: &GameState| {
        GameView::filtered(state.tick, serde_json::json!({ "owner": id }))
    }))
    .with_hooks(Recorder::default());

    let result = game_loop.execute_single_tick().await.unwrap();

    assert_eq!(result.intents.len(), players.len());
    for intent in &result.intents {
        assert_eq!(intent.payload, serde_json::json!({ "owner": intent.player_id }));
    }
    let ordered: Vec<PlayerId> = result.intents.iter().map(|i| i.player_id).collect();
    let mut sorted = ordered.clone();
    sorted.sort();
    assert_eq!(ordered, sorted);
}
