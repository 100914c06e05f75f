//! Message handlers for the transports service.

use crate::events::{InstanceCommandKind, InstanceTransportCommand};
use crate::instanced::InstanceTransportProcessor;
use crate::processor::TransportProcessor;
use crate::voyage::Passenger;
use realm_core::RealmError;
use realm_core::event::SerializedEvent;
use realm_core::status::{CharacterChange, CharacterStatus};
use realm_runtime::consumer::{HandlerFuture, MessageHandler};

/// Character movements seen by both kinds of route.
///
/// Logouts aboard a vessel, or waiting for one, send the character back to
/// the route's start map, and take it off any voyage. Logins on a transit
/// map are returned to the start map too. Map changes drive voyage transit
/// entries and exits.
#[derive(Debug, Clone)]
pub struct CharacterStatusHandler {
    processor: TransportProcessor,
    instanced: InstanceTransportProcessor,
}

impl CharacterStatusHandler {
    /// Handler over both processors.
    #[must_use]
    pub const fn new(processor: TransportProcessor, instanced: InstanceTransportProcessor) -> Self {
        Self { processor, instanced }
    }
}

impl MessageHandler for CharacterStatusHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status: CharacterStatus = event.decode().map_err(RealmError::from)?;
            let tenant = &event.tenant;
            let character_id = status.character_id;
            match status.change {
                CharacterChange::Logout(field) => {
                    self.instanced.on_logout(tenant, character_id).await?;
                    self.processor
                        .on_logout(tenant, character_id, status.world_id, field.channel_id, field.map_id)
                        .await?;
                },
                CharacterChange::Login(field) => {
                    self.instanced
                        .on_login(tenant, character_id, status.world_id, field.channel_id, field.map_id)
                        .await?;
                },
                CharacterChange::MapChanged(change) => {
                    self.instanced
                        .on_map_entered(tenant, character_id, change.channel_id, change.target_map_id)
                        .await?;
                },
                _ => {},
            }
            Ok(())
        })
    }
}

/// `COMMAND_TOPIC_INSTANCE_TRANSPORT`.
#[derive(Debug, Clone)]
pub struct InstanceTransportCommandHandler {
    instanced: InstanceTransportProcessor,
}

impl InstanceTransportCommandHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(instanced: InstanceTransportProcessor) -> Self {
        Self { instanced }
    }
}

impl MessageHandler for InstanceTransportCommandHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let command: InstanceTransportCommand = event.decode().map_err(RealmError::from)?;
            let InstanceCommandKind::Start(body) = command.kind;
            let passenger = Passenger {
                character_id: command.character_id,
                world_id: command.world_id,
                channel_id: command.channel_id,
            };
            match self.instanced.start(&event.tenant, passenger, &body).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_not_found() || matches!(e, RealmError::Conflict(_)) => {
                    tracing::warn!(
                        tenant = %event.tenant,
                        character_id = command.character_id,
                        error = %e,
                        "Transport start refused"
                    );
                    Ok(())
                },
                Err(e) => Err(e),
            }
        })
    }
}
