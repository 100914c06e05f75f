//! Inbound command and drop handlers for the reactors service.

use crate::events::{CommandKind, ReactorCommand};
use crate::processor::ReactorProcessor;
use realm_core::event::SerializedEvent;
use realm_core::status::DropStatus;
use realm_core::{RealmError, RealmResult};
use realm_runtime::consumer::{HandlerFuture, MessageHandler};

fn ignore_absent<T>(result: RealmResult<T>) -> RealmResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            tracing::debug!(error = %e, "Reactor gone, command ignored");
            Ok(())
        },
        Err(e) => Err(e),
    }
}

/// `COMMAND_TOPIC_REACTOR`.
#[derive(Debug, Clone)]
pub struct ReactorCommandHandler {
    processor: ReactorProcessor,
}

impl ReactorCommandHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: ReactorProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for ReactorCommandHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let command: ReactorCommand = event.decode().map_err(RealmError::from)?;
            let tenant = &event.tenant;
            let field = command.field();
            match command.kind {
                CommandKind::Create(spawn) => {
                    self.processor.create(tenant, field, spawn).await?;
                    Ok(())
                },
                CommandKind::Hit(hit) => ignore_absent(
                    self.processor
                        .hit(tenant, hit.reactor_id, hit.character_id, hit.skill_id)
                        .await,
                ),
                CommandKind::Destroy(destroy) => {
                    ignore_absent(self.processor.destroy(tenant, destroy.reactor_id).await)
                },
                CommandKind::DestroyInField => {
                    self.processor.destroy_in_field(tenant, &field).await?;
                    Ok(())
                },
                CommandKind::ClearCooldowns => {
                    self.processor.clear_cooldowns(tenant, &field);
                    Ok(())
                },
            }
        })
    }
}

/// Drops landing near item reactors.
#[derive(Debug, Clone)]
pub struct DropStatusHandler {
    processor: ReactorProcessor,
}

impl DropStatusHandler {
    /// Handler over a processor.
    #[must_use]
    pub const fn new(processor: ReactorProcessor) -> Self {
        Self { processor }
    }
}

impl MessageHandler for DropStatusHandler {
    fn handle(&self, event: SerializedEvent) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status: DropStatus = event.decode().map_err(RealmError::from)?;
            self.processor.on_drop(&event.tenant, &status);
            Ok(())
        })
    }
}
