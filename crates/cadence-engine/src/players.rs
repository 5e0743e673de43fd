//! Registration of the players declared in `cadence-config.yaml`.

use std::sync::Arc;

use cadence_core::config::PlayerConfig;
use cadence_core::scheduler::TickScheduler;
use cadence_core::script::ScriptedProgram;
use cadence_types::PlayerId;
use tracing::info;

use crate::error::EngineError;

/// Register every configured player with a [`ScriptedProgram`].
///
/// Players without a fixed id get a fresh one; their memory will not be
/// found again after a restart. Returns the ids in declaration order.
///
/// # Errors
///
/// Returns [`EngineError::Scheduler`] if two players share an id or a
/// player's CPU override is invalid.
pub fn register_players(
    scheduler: &mut TickScheduler,
    players: &[PlayerConfig],
) -> Result<Vec<PlayerId>, EngineError> {
    let mut ids = Vec::with_capacity(players.len());
    for player in players {
        let id = player.id.unwrap_or_else(PlayerId::new);
        let program = Arc::new(ScriptedProgram::new(player.script.clone()));
        scheduler.add_player(id, program, player.overrides())?;

        info!(
            player = %id,
            name = %player.name,
            ops = player.script.len(),
            fixed_id = player.id.is_some(),
            "Player registered from config"
        );
        ids.push(id);
    }
    Ok(ids)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_core::config::{CadenceConfig, SchedulerConfig};

    use super::*;

    fn players(yaml: &str) -> Vec<PlayerConfig> {
        CadenceConfig::parse(yaml).unwrap().players
    }

    #[test]
    fn registers_in_declaration_order() {
        let configured = players(
            r"
players:
  - name: alpha
    id: 0192f1d2-7a3c-7cc0-8000-000000000001
  - name: beta
  - name: gamma
",
        );
        let mut scheduler = TickScheduler::new(SchedulerConfig::default());
        let ids = register_players(&mut scheduler, &configured).unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(scheduler.player_ids(), ids);
        assert_eq!(ids.first().copied(), configured.first().and_then(|p| p.id));
    }

    #[test]
    fn shared_fixed_id_is_an_error() {
        let configured = players(
            r"
players:
  - name: alpha
    id: 0192f1d2-7a3c-7cc0-8000-000000000001
  - name: impostor
    id: 0192f1d2-7a3c-7cc0-8000-000000000001
",
        );
        let mut scheduler = TickScheduler::new(SchedulerConfig::default());
        let result = register_players(&mut scheduler, &configured);

        assert!(matches!(result, Err(EngineError::Scheduler { .. })));
        assert_eq!(scheduler.len(), 1);
    }
}
