//! Inbound command, character status and monster status handlers for the
//! party-quests service.

use crate::events::{CommandKind, PartyQuestCommand};
use crate::model::CharacterEntry;
use crate::processor::{PartyQuestProcessor, REASON_DISCONNECTED, REASON_VOLUNTARY, RegisterRequest};
use realm_core::event::SerializedEvent;
use realm_core::registry::MapKey;
use realm_core::status::{CharacterChange, CharacterStatus, MonsterChange, MonsterStatus};
use realm_core::{RealmError, RealmResult};
use realm_runtime::consumer::{HandlerFuture, MessageHandler};

fn ignore_absent<T>(result: RealmResult<T>) -> RealmResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            tracing::debug!(error = %e, "Party quest gone, command ignored");
            Ok(())
        },
        Err(e) => Err(e),
    }
}

/// `COMMAND_TOPIC_PARTY_QUEST`.
#[derive(Debug, Clone)]
pub struct PartyQuestCommandHandler {
    processor: PartyQuestProcessor,
}

impl PartyQuestCommandHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: PartyQuestProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for PartyQuestCommandHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let command: PartyQuestCommand = event.decode().map_err(RealmError::from)?;
            let tenant = &event.tenant;
            let p = &self.processor;
            match command.kind {
                CommandKind::Register(body) => {
                    let request = RegisterRequest {
                        quest_id: body.quest_id,
                        world_id: command.world_id,
                        channel_id: body.channel_id,
                        map_id: body.map_id,
                        party_id: body.party_id,
                        characters: vec![CharacterEntry {
                            character_id: command.character_id,
                            world_id: command.world_id,
                            channel_id: body.channel_id,
                        }],
                    };
                    p.register(tenant, request).await?;
                    Ok(())
                },
                CommandKind::Start(body) => ignore_absent(p.start(tenant, body.instance_id).await),
                CommandKind::StageClearAttempt(body) => ignore_absent(p.attempt_clear(tenant, body.instance_id).await),
                CommandKind::StageAdvance(body) => ignore_absent(p.advance(tenant, body.instance_id).await),
                CommandKind::ForceStageComplete(body) => {
                    ignore_absent(p.force_complete_stage(tenant, body.instance_id).await)
                },
                CommandKind::Forfeit(body) => ignore_absent(p.forfeit(tenant, body.instance_id).await),
                CommandKind::Leave => ignore_absent(p.leave(tenant, command.character_id, REASON_VOLUNTARY).await),
                CommandKind::UpdateStageState(body) => ignore_absent(p.update_stage_state(
                    tenant,
                    body.instance_id,
                    &body.item_counts,
                    &body.monster_kills,
                )),
                CommandKind::UpdateCustomData(body) => ignore_absent(p.update_custom_data(
                    tenant,
                    body.instance_id,
                    &body.updates,
                    &body.increments,
                )),
                CommandKind::BroadcastMessage(body) => ignore_absent(
                    p.broadcast(tenant, body.instance_id, &body.message_type, &body.message)
                        .await,
                ),
                CommandKind::EnterBonus(body) => ignore_absent(p.enter_bonus(tenant, body.instance_id).await),
            }
        })
    }
}

/// Logouts take the character out of its instance.
#[derive(Debug, Clone)]
pub struct CharacterStatusHandler {
    processor: PartyQuestProcessor,
}

impl CharacterStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: PartyQuestProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for CharacterStatusHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status: CharacterStatus = event.decode().map_err(RealmError::from)?;
            let CharacterChange::Logout(_) = status.change else {
                return Ok(());
            };
            let tenant = &event.tenant;
            if self.processor.by_character(tenant, status.character_id).is_err() {
                return Ok(());
            }
            match self
                .processor
                .leave(tenant, status.character_id, REASON_DISCONNECTED)
                .await
            {
                Ok(_) => Ok(()),
                Err(RealmError::InvalidState { .. }) => {
                    tracing::debug!(tenant = %tenant, character_id = status.character_id, "Logout while registering");
                    Ok(())
                },
                Err(e) => ignore_absent::<()>(Err(e)),
            }
        })
    }
}

/// Escort monster damage, death and drops inside party-quest fields.
#[derive(Debug, Clone)]
pub struct MonsterStatusHandler {
    processor: PartyQuestProcessor,
}

impl MonsterStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: PartyQuestProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for MonsterStatusHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status: MonsterStatus = event.decode().map_err(RealmError::from)?;
            if status.instance.is_nil() {
                return Ok(());
            }
            let tenant = &event.tenant;
            let field = MapKey::new(status.world_id, status.channel_id, status.map_id, status.instance);
            let p = &self.processor;
            match status.change {
                MonsterChange::Damaged => ignore_absent(p.on_friendly_damaged(tenant, &field, status.monster_id).await),
                MonsterChange::Killed => ignore_absent(p.on_friendly_killed(tenant, &field, status.monster_id).await),
                MonsterChange::FriendlyDrop(drop) => ignore_absent(
                    p.on_friendly_drop(tenant, &field, status.monster_id, drop.item_count)
                        .await,
                ),
                MonsterChange::Other => Ok(()),
            }
        })
    }
}
