//! A small declarative program format.
//!
//! [`ScriptedProgram`] runs a fixed list of [`ScriptOp`]s top to bottom. It
//! exists so that players can be declared in `cadence-config.yaml` without a
//! real interpreter, and it is the reference [`Program`] the tests exercise:
//! every op costs one step, and [`ScriptOp::Work`] burns as many steps as it
//! is told to, which makes budget behavior easy to provoke.
//!
//! ```yaml
//! script:
//!   - op: count_ticks
//!     key: ticks_seen
//!   - op: work
//!     steps: 200
//!   - op: emit
//!     action: harvest
//!     target: source-1
//! ```

use serde::Deserialize;

use cadence_types::Intent;

use crate::program::{ExecutionContext, Program, ProgramError};

/// One instruction of a [`ScriptedProgram`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    /// Propose an intent.
    Emit {
        /// Intent action name.
        action: String,
        /// Optional intent target.
        #[serde(default)]
        target: Option<String>,
        /// Intent payload.
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// Perform `steps` units of busy work, each checked against the limiter.
    Work {
        /// Number of accountable steps.
        steps: u64,
    },

    /// Store a constant in memory.
    Remember {
        /// Memory key.
        key: String,
        /// Value to store.
        value: serde_json::Value,
    },

    /// Increment an integer counter in memory (missing counts as zero).
    CountTicks {
        /// Memory key of the counter.
        key: String,
    },

    /// Fault unconditionally.
    Fail {
        /// Fault message.
        message: String,
    },
}

/// A program made of [`ScriptOp`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptedProgram {
    ops: Vec<ScriptOp>,
}

impl ScriptedProgram {
    /// Create a program from a list of ops.
    pub const fn new(ops: Vec<ScriptOp>) -> Self {
        Self { ops }
    }
}

impl Program for ScriptedProgram {
    fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), ProgramError> {
        for op in &self.ops {
            if !ctx.check_step() {
                return Err(ProgramError::BudgetExceeded);
            }

            match op {
                ScriptOp::Emit {
                    action,
                    target,
                    payload,
                } => {
                    let mut intent =
                        Intent::new(ctx.player_id(), action.clone()).with_payload(payload.clone());
                    intent.target.clone_from(target);
                    ctx.emit(intent);
                }
                ScriptOp::Work { steps } => {
                    for _ in 0..*steps {
                        if !ctx.check_step() {
                            return Err(ProgramError::BudgetExceeded);
                        }
                    }
                }
                ScriptOp::Remember { key, value } => {
                    ctx.memory_set(key.clone(), value.clone());
                }
                ScriptOp::CountTicks { key } => {
                    let current = ctx
                        .memory_get(key)
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(0);
                    ctx.memory_set(key.clone(), serde_json::json!(current.saturating_add(1)));
                }
                ScriptOp::Fail { message } => {
                    return Err(ProgramError::fault(message.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cadence_types::{GameView, PlayerId, PlayerMemory};

    use super::*;
    use crate::config::CpuConfig;
    use crate::cpu::CpuLimiter;

    type RunOutcome = (Result<(), ProgramError>, Vec<Intent>, PlayerMemory);

    fn run(program: &ScriptedProgram, memory: &PlayerMemory, max_steps: u64) -> RunOutcome {
        let view = GameView::default();
        let mut limiter = CpuLimiter::new(&CpuConfig {
            max_steps,
            ..CpuConfig::default()
        });
        limiter.start();
        let mut ctx = ExecutionContext::new(PlayerId::new(), &view, memory, &mut limiter);
        let result = program.run(&mut ctx);
        let output = ctx.finish();
        (result, output.intents, output.staged_memory)
    }

    #[test]
    fn parses_from_yaml() {
        let yaml = r"
- op: emit
  action: move
  target: north
- op: work
  steps: 3
- op: count_ticks
  key: seen
- op: fail
  message: nope
";
        let ops: Vec<ScriptOp> = serde_yml::from_str(yaml).unwrap_or_default();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops.get(1), Some(&ScriptOp::Work { steps: 3 }));
    }

    #[test]
    fn emits_and_counts() {
        let program = ScriptedProgram::new(vec![
            ScriptOp::CountTicks {
                key: "seen".to_owned(),
            },
            ScriptOp::Emit {
                action: "harvest".to_owned(),
                target: Some("source-1".to_owned()),
                payload: serde_json::Value::Null,
            },
        ]);
        let mut memory = PlayerMemory::new();
        memory.insert("seen".to_owned(), serde_json::json!(4));

        let (result, intents, staged) = run(&program, &memory, 100);
        assert!(result.is_ok());
        assert_eq!(intents.len(), 1);
        assert_eq!(staged.get("seen"), Some(&serde_json::json!(5)));
    }

    #[test]
    fn work_stops_on_refused_step() {
        let program = ScriptedProgram::new(vec![ScriptOp::Work { steps: 50 }]);
        let (result, _, _) = run(&program, &PlayerMemory::new(), 10);
        assert_eq!(result, Err(ProgramError::BudgetExceeded));
    }

    #[test]
    fn fail_reports_fault() {
        let program = ScriptedProgram::new(vec![ScriptOp::Fail {
            message: "bad opcode".to_owned(),
        }]);
        let (result, _, _) = run(&program, &PlayerMemory::new(), 10);
        assert_eq!(result, Err(ProgramError::fault("bad opcode")));
    }
}
