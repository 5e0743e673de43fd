//! Tick-bounded execution of untrusted player programs.
//!
//! This crate owns the scheduling core of Cadence: per-player CPU
//! accounting, player sessions, the per-tick scheduler pass, and the
//! real-time game loop that drives it.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `cadence-config.yaml` into
//!   strongly-typed structs, plus per-session resolution of overrides.
//! - [`cpu`] -- [`CpuLimiter`]: time, step and bucket budget per player.
//! - [`program`] -- The [`Program`] trait and its [`ExecutionContext`].
//! - [`script`] -- [`ScriptedProgram`], a declarative program format.
//! - [`session`] -- [`PlayerSession`]: one program, one limiter, one memory.
//! - [`scheduler`] -- [`TickScheduler`]: registry and per-tick pass.
//! - [`control`] -- Lifecycle state shared between the loop and its handles.
//! - [`interfaces`] -- State, intent and memory collaborators of the loop.
//! - [`hooks`] -- [`LoopHooks`] observation points.
//! - [`stats`] -- [`LoopStats`] counters.
//! - [`game_loop`] -- [`GameLoop`]: fixed-interval tick driver.
//!
//! [`CpuLimiter`]: cpu::CpuLimiter
//! [`Program`]: program::Program
//! [`ExecutionContext`]: program::ExecutionContext
//! [`ScriptedProgram`]: script::ScriptedProgram
//! [`PlayerSession`]: session::PlayerSession
//! [`TickScheduler`]: scheduler::TickScheduler
//! [`LoopHooks`]: hooks::LoopHooks
//! [`LoopStats`]: stats::LoopStats
//! [`GameLoop`]: game_loop::GameLoop

pub mod config;
pub mod control;
pub mod cpu;
pub mod game_loop;
pub mod hooks;
pub mod interfaces;
pub mod program;
pub mod scheduler;
pub mod script;
pub mod session;
pub mod stats;
