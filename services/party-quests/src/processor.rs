//! Party-quest operations.
//!
//! Definitions come from the catalog; instances live in the registry. Every
//! change to an instance runs inside one [`Emitter::emit`], so warps, rewards
//! and status events of an operation are published together or not at all.
//! Transitions are checked against the lifecycle table under the registry
//! lock, so a tick and a command racing on the same instance cannot both win.

use crate::conditions;
use crate::definition::{
    Affinity, Bonus, BonusEntry, ClearAction, Definition, FriendlyMonster, KilledAction, RegistrationMode,
    RegistrationType, Reward, RewardType, Stage, WarpType,
};
use crate::events::{CharacterCommand, PartyQuestStatus, ReactorFieldCommand, StatusChange, SystemMessageCommand, Topics};
use crate::model::{CharacterEntry, Enrollment, Instance, InstanceState, Signal, StageState, lifecycle, remaining_secs};
use crate::timers::{self, Expiry};
use chrono::{DateTime, Utc};
use realm_core::catalog::Catalog;
use realm_core::emitter::Emitter;
use realm_core::environment::Clock;
use realm_core::event::MessageBuffer;
use realm_core::peer::{GuildPeer, MonsterPeer, MonsterSpawn, PartyPeer};
use realm_core::registry::{MapKey, Record, TenantRegistry};
use realm_core::state_machine::TransitionTable;
use realm_core::{RealmError, RealmResult, Tenant};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Forfeited by command.
pub const REASON_FORFEIT: &str = "forfeit";
/// Global timer ran out.
pub const REASON_TIME_EXPIRED: &str = "time_expired";
/// Every stage cleared and no bonus follows.
pub const REASON_COMPLETED: &str = "completed";
/// Bonus round timer ran out.
pub const REASON_BONUS_EXPIRED: &str = "bonus_expired";
/// Manual bonus entry never came.
pub const REASON_COMPLETION_EXPIRED: &str = "completion_expired";
/// Last character left.
pub const REASON_EMPTY: &str = "empty";
/// Service stopping.
pub const REASON_SHUTDOWN: &str = "shutdown";
/// Character left by command.
pub const REASON_VOLUNTARY: &str = "voluntary";
/// Character logged out.
pub const REASON_DISCONNECTED: &str = "disconnected";
/// Escort monster died on a stage that fails on its death.
pub const REASON_FRIENDLY_MONSTER_KILLED: &str = "friendly_monster_killed";

/// System message type of escort announcements.
pub const ESCORT_MESSAGE_TYPE: &str = "BLUE_TEXT";

const FRIENDLY_HIT_COUNT: &str = "friendlyHitCount";
const FRIENDLY_DROP_COUNT: &str = "friendlyDropCount";

/// Every peer the service calls: rosters for registration, monsters for
/// escorts and clear actions.
pub trait PartyQuestPeers: PartyPeer + GuildPeer + MonsterPeer {}

impl<T> PartyQuestPeers for T where T: PartyPeer + GuildPeer + MonsterPeer {}

type Lifecycle = TransitionTable<InstanceState, Instance, Signal>;

/// A registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Quest to register for
    pub quest_id: String,
    /// World id
    pub world_id: u8,
    /// Channel the run happens on
    pub channel_id: u8,
    /// Map the registrant stands on; 0 when unknown
    pub map_id: u32,
    /// Registering party; members are resolved through the party service
    pub party_id: u32,
    /// Registering characters when no party is given
    pub characters: Vec<CharacterEntry>,
}

/// Party-quests service entry point.
#[derive(Clone)]
pub struct PartyQuestProcessor {
    registry: Arc<TenantRegistry<Instance>>,
    definitions: Arc<dyn Catalog<Definition>>,
    peers: Arc<dyn PartyQuestPeers>,
    emitter: Emitter,
    topics: Topics,
    clock: Arc<dyn Clock>,
    lifecycle: Arc<Lifecycle>,
    completion_timeout_secs: u64,
}

impl PartyQuestProcessor {
    /// Processor over a fresh registry.
    ///
    /// # Errors
    ///
    /// Only if the lifecycle table is malformed.
    pub fn new(
        definitions: Arc<dyn Catalog<Definition>>,
        peers: Arc<dyn PartyQuestPeers>,
        emitter: Emitter,
        topics: Topics,
        clock: Arc<dyn Clock>,
    ) -> RealmResult<Self> {
        Ok(Self {
            registry: Arc::new(TenantRegistry::new()),
            definitions,
            peers,
            emitter,
            topics,
            clock,
            lifecycle: Arc::new(lifecycle()?),
            completion_timeout_secs: crate::config::DEFAULT_COMPLETION_TIMEOUT_SECS,
        })
    }

    /// Replace the manual bonus entry window.
    #[must_use]
    pub const fn with_completion_timeout(mut self, secs: u64) -> Self {
        self.completion_timeout_secs = secs;
        self
    }

    /// The instance registry.
    #[must_use]
    pub fn registry(&self) -> &TenantRegistry<Instance> {
        &self.registry
    }

    /// Current clock reading.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Definition by catalog id.
    ///
    /// # Errors
    ///
    /// Not-found if absent; catalog errors.
    pub async fn definition(&self, tenant: &Tenant, id: Uuid) -> RealmResult<Definition> {
        self.definitions
            .get(tenant, id)
            .await?
            .ok_or_else(|| RealmError::not_found("party quest definition", id))
    }

    /// Definition by quest id.
    ///
    /// # Errors
    ///
    /// Not-found if absent; catalog errors.
    pub async fn definition_for_quest(&self, tenant: &Tenant, quest_id: &str) -> RealmResult<Definition> {
        self.definitions
            .find_by_key(tenant, quest_id)
            .await?
            .ok_or_else(|| RealmError::not_found("party quest definition", quest_id))
    }

    /// Every definition of a tenant.
    ///
    /// # Errors
    ///
    /// Catalog errors.
    pub async fn definitions(&self, tenant: &Tenant) -> RealmResult<Vec<Definition>> {
        Ok(self.definitions.all(tenant).await?)
    }

    /// Store a definition.
    ///
    /// # Errors
    ///
    /// Validation on a malformed definition, conflict when another definition
    /// already owns the quest id; catalog errors.
    pub async fn create_definition(&self, tenant: &Tenant, definition: Definition) -> RealmResult<Definition> {
        let definition = definition.prepare()?;
        if let Some(existing) = self.definitions.find_by_key(tenant, &definition.quest_id).await? {
            if existing.id != definition.id {
                return Err(RealmError::Conflict(format!(
                    "party quest [{}] is already defined as [{}]",
                    definition.quest_id, existing.id
                )));
            }
        }
        self.definitions.upsert(tenant, definition.clone()).await?;
        tracing::info!(
            tenant = %tenant,
            definition_id = %definition.id,
            quest_id = %definition.quest_id,
            stages = definition.stages.len(),
            "Stored party quest definition"
        );
        Ok(definition)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// One instance.
    ///
    /// # Errors
    ///
    /// Not-found if no such instance is live.
    pub fn get(&self, tenant: &Tenant, id: Uuid) -> RealmResult<Instance> {
        self.registry.get(tenant, &id)
    }

    /// Instance a character is registered in.
    ///
    /// # Errors
    ///
    /// Not-found if the character is in none.
    pub fn by_character(&self, tenant: &Tenant, character_id: u32) -> RealmResult<Instance> {
        self.registry.by_participant(tenant, character_id)
    }

    /// Instance whose maps run under `field_instance`. The shared map
    /// instance belongs to no party quest.
    ///
    /// # Errors
    ///
    /// Not-found if no live instance owns it.
    pub fn by_field_instance(&self, tenant: &Tenant, field_instance: Uuid) -> RealmResult<Instance> {
        if field_instance.is_nil() {
            return Err(RealmError::not_found(Instance::KIND, field_instance));
        }
        self.registry.get(tenant, &field_instance)
    }

    /// Every live instance of a tenant, ordered by id.
    #[must_use]
    pub fn instances(&self, tenant: &Tenant) -> Vec<Instance> {
        self.registry.snapshot(tenant)
    }

    /// Seconds left on the timer a character sees.
    ///
    /// A bonus round shows its own limit; a completed run shows 0; an active
    /// stage shows its stage limit, falling back to the global limit.
    ///
    /// # Errors
    ///
    /// Not-found when the character is in no instance or no timer applies,
    /// invalid-state outside active, completed and bonus.
    pub async fn timer_for(&self, tenant: &Tenant, character_id: u32) -> RealmResult<u64> {
        let instance = self.by_character(tenant, character_id)?;
        let definition = self.definition_of(tenant, &instance).await?;
        let now = self.now();
        let since = instance.stage_started_at();
        match instance.state() {
            InstanceState::Bonus => definition
                .bonus
                .as_ref()
                .filter(|b| b.duration > 0)
                .map(|b| remaining_secs(since, b.duration, now))
                .ok_or_else(|| RealmError::not_found("party quest timer", character_id)),
            InstanceState::Completed => Ok(0),
            InstanceState::Active => {
                if let Some(stage) = definition.stage(instance.stage_index()).filter(|s| s.duration > 0) {
                    return Ok(remaining_secs(since, stage.duration, now));
                }
                if definition.duration > 0 {
                    return Ok(remaining_secs(instance.started_at(), definition.duration, now));
                }
                Err(RealmError::not_found("party quest timer", character_id))
            },
            state => Err(RealmError::invalid_state(
                Instance::KIND,
                instance.id(),
                state.as_str(),
                "timer lookup",
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Registration and start
    // -----------------------------------------------------------------------

    /// Register characters for a quest.
    ///
    /// Party registration resolves the party's members and opens a new
    /// instance. Individual registration joins a registering instance of the
    /// same quest, world, channel and affinity group, or opens one. Instant
    /// definitions start right away; timed ones open a registration window.
    ///
    /// # Errors
    ///
    /// Not-found for an unknown quest, validation with no characters or off
    /// the registration map, conflict when a character is already in an
    /// instance; peer, registry or bus errors.
    pub async fn register(&self, tenant: &Tenant, request: RegisterRequest) -> RealmResult<Instance> {
        let definition = self.definition_for_quest(tenant, &request.quest_id).await?;
        match definition.registration.kind {
            RegistrationType::Party => self.register_party(tenant, &definition, request).await,
            RegistrationType::Individual => self.register_individual(tenant, &definition, request).await,
        }
    }

    async fn register_party(
        &self,
        tenant: &Tenant,
        definition: &Definition,
        request: RegisterRequest,
    ) -> RealmResult<Instance> {
        let characters = if request.party_id > 0 {
            let party = self.peers.party(tenant, request.party_id).await?;
            party
                .members
                .iter()
                .map(|&character_id| CharacterEntry {
                    character_id,
                    world_id: request.world_id,
                    channel_id: request.channel_id,
                })
                .collect()
        } else {
            request.characters
        };
        if characters.is_empty() {
            return Err(RealmError::validation("at least one character is required to register"));
        }
        let enrollment = Enrollment {
            world_id: request.world_id,
            channel_id: request.channel_id,
            party_id: request.party_id,
            affinity_id: request.party_id,
            characters,
        };
        self.open(tenant, definition, enrollment).await
    }

    async fn register_individual(
        &self,
        tenant: &Tenant,
        definition: &Definition,
        request: RegisterRequest,
    ) -> RealmResult<Instance> {
        let Some(&entry) = request.characters.first() else {
            return Err(RealmError::validation("at least one character is required to register"));
        };
        let registration_map = definition.registration.map_id;
        if registration_map != 0 && request.map_id != 0 && registration_map != request.map_id {
            return Err(RealmError::validation(format!(
                "character [{}] is not on registration map [{registration_map}]",
                entry.character_id
            )));
        }
        let affinity_id = self.affinity(tenant, definition, entry.character_id).await?;

        let open = self
            .registry
            .snapshot(tenant)
            .into_iter()
            .find(|i| i.accepts(&definition.quest_id, request.world_id, request.channel_id, affinity_id));
        let Some(open) = open else {
            let enrollment = Enrollment {
                world_id: request.world_id,
                channel_id: request.channel_id,
                party_id: 0,
                affinity_id,
                characters: vec![entry],
            };
            return self.open(tenant, definition, enrollment).await;
        };
        if open.character(entry.character_id).is_some() {
            tracing::debug!(
                tenant = %tenant,
                instance_id = %open.id(),
                character_id = entry.character_id,
                "Character already registered"
            );
            return Ok(open);
        }

        let joined = self
            .emitter
            .emit(tenant, |buffer| {
                let joined = self.registry.update(tenant, &open.id(), |current| {
                    if current.state() != InstanceState::Registering {
                        return Err(RealmError::invalid_state(
                            Instance::KIND,
                            current.id(),
                            current.state().as_str(),
                            "register",
                        ));
                    }
                    Ok(current.with_character(entry))
                })?;
                self.put_status(
                    buffer,
                    &joined,
                    StatusChange::CharacterRegistered {
                        character_id: entry.character_id,
                    },
                )?;
                Ok(joined)
            })
            .await?;
        tracing::info!(
            tenant = %tenant,
            instance_id = %joined.id(),
            character_id = entry.character_id,
            characters = joined.characters().len(),
            "Character joined registering party quest"
        );
        Ok(joined)
    }

    async fn affinity(&self, tenant: &Tenant, definition: &Definition, character_id: u32) -> RealmResult<u32> {
        match definition.registration.affinity {
            Affinity::None => Ok(0),
            Affinity::Party => Ok(self.peers.party_of(tenant, character_id).await?.id),
            Affinity::Guild => Ok(self.peers.guild_of(tenant, character_id).await?.id),
        }
    }

    async fn open(&self, tenant: &Tenant, definition: &Definition, enrollment: Enrollment) -> RealmResult<Instance> {
        let now = self.now();
        let party_id = enrollment.party_id;
        let channel_id = enrollment.channel_id;
        let instance = Instance::register(definition, enrollment, now);
        let id = instance.id();

        let instance = self
            .emitter
            .emit(tenant, |buffer| {
                let instance = self.registry.insert(tenant, instance)?;
                self.put_status(buffer, &instance, StatusChange::InstanceCreated { party_id, channel_id })?;
                let opened = match definition.registration.mode {
                    RegistrationMode::Instant => self.start_in(buffer, tenant, &instance, definition, now),
                    RegistrationMode::Timed => self
                        .put_status(
                            buffer,
                            &instance,
                            StatusChange::RegistrationOpened {
                                duration: definition.registration.duration,
                            },
                        )
                        .map(|()| instance),
                };
                opened.inspect_err(|_| {
                    self.registry.delete(tenant, &id);
                })
            })
            .await?;
        tracing::info!(
            tenant = %tenant,
            instance_id = %id,
            quest_id = %definition.quest_id,
            party_id,
            characters = instance.characters().len(),
            state = instance.state().as_str(),
            "Opened party quest instance"
        );
        if instance.state() == InstanceState::Active {
            self.spawn_escort(tenant, &instance, definition).await;
        }
        Ok(instance)
    }

    /// Start a registering instance on stage 0.
    ///
    /// # Errors
    ///
    /// Not-found if gone, invalid-state unless registering, validation when
    /// the definition has no stages; bus errors.
    pub async fn start(&self, tenant: &Tenant, id: Uuid) -> RealmResult<Instance> {
        let instance = self.registry.get(tenant, &id)?;
        let definition = self.definition_of(tenant, &instance).await?;
        let now = self.now();
        let started = self
            .emitter
            .emit(tenant, |buffer| self.start_in(buffer, tenant, &instance, &definition, now))
            .await?;
        self.spawn_escort(tenant, &started, &definition).await;
        Ok(started)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Check the current stage's clear conditions; clear it when they hold.
    /// Returns whether the stage cleared.
    ///
    /// # Errors
    ///
    /// Not-found if gone, invalid-state unless active; bus errors.
    pub async fn attempt_clear(&self, tenant: &Tenant, id: Uuid) -> RealmResult<bool> {
        let instance = self.registry.get(tenant, &id)?;
        self.transition(&instance, Signal::Clear, "stage clear attempt")?;
        let definition = self.definition_of(tenant, &instance).await?;
        let stage = current_stage(&definition, &instance)?;
        if !conditions::satisfied(&stage.clear_conditions, instance.stage_state()) {
            tracing::debug!(
                tenant = %tenant,
                instance_id = %id,
                stage_index = instance.stage_index(),
                "Clear conditions not met"
            );
            return Ok(false);
        }
        self.emitter
            .emit(tenant, |buffer| self.clear_in(buffer, tenant, &instance, &definition))
            .await?;
        self.run_clear_actions(tenant, &instance, stage).await;
        Ok(true)
    }

    /// Clear the current stage without checking conditions, then advance.
    ///
    /// # Errors
    ///
    /// Not-found if gone, invalid-state unless active; bus errors.
    pub async fn force_complete_stage(&self, tenant: &Tenant, id: Uuid) -> RealmResult<Instance> {
        let instance = self.registry.get(tenant, &id)?;
        let definition = self.definition_of(tenant, &instance).await?;
        let now = self.now();
        let advanced = self
            .emitter
            .emit(tenant, |buffer| {
                let cleared = self.clear_in(buffer, tenant, &instance, &definition)?;
                self.advance_in(buffer, tenant, &cleared, &definition, now)
            })
            .await?;
        if let Ok(stage) = current_stage(&definition, &instance) {
            self.run_clear_actions(tenant, &instance, stage).await;
        }
        if entered_stage(&instance, &advanced) {
            self.spawn_escort(tenant, &advanced, &definition).await;
        }
        Ok(advanced)
    }

    /// Move to the next stage, or complete after the last one.
    ///
    /// # Errors
    ///
    /// Not-found if gone, invalid-state unless active or clearing; bus errors.
    pub async fn advance(&self, tenant: &Tenant, id: Uuid) -> RealmResult<Instance> {
        let instance = self.registry.get(tenant, &id)?;
        let definition = self.definition_of(tenant, &instance).await?;
        let now = self.now();
        let advanced = self
            .emitter
            .emit(tenant, |buffer| self.advance_in(buffer, tenant, &instance, &definition, now))
            .await?;
        if entered_stage(&instance, &advanced) {
            self.spawn_escort(tenant, &advanced, &definition).await;
        }
        Ok(advanced)
    }

    /// Enter the bonus round of a completed instance.
    ///
    /// # Errors
    ///
    /// Not-found if gone, validation when the definition has no bonus,
    /// invalid-state unless completed; bus errors.
    pub async fn enter_bonus(&self, tenant: &Tenant, id: Uuid) -> RealmResult<Instance> {
        let instance = self.registry.get(tenant, &id)?;
        let definition = self.definition_of(tenant, &instance).await?;
        let bonus = definition
            .bonus
            .as_ref()
            .ok_or_else(|| RealmError::validation(format!("party quest [{}] has no bonus", definition.quest_id)))?;
        let now = self.now();
        self.emitter
            .emit(tenant, |buffer| self.enter_bonus_in(buffer, tenant, &instance, bonus, now))
            .await
    }

    /// Give up: fail the instance and destroy it.
    ///
    /// # Errors
    ///
    /// Not-found if gone, invalid-state once completed; bus errors.
    pub async fn forfeit(&self, tenant: &Tenant, id: Uuid) -> RealmResult<Instance> {
        let instance = self.registry.get(tenant, &id)?;
        let definition = self.definition_of(tenant, &instance).await?;
        self.emitter
            .emit(tenant, |buffer| self.fail_in(buffer, tenant, &instance, &definition, REASON_FORFEIT))
            .await
    }

    /// Take a character out of its instance and send it to the exit map.
    /// The last one out destroys the instance.
    ///
    /// # Errors
    ///
    /// Not-found if the character is in no instance, invalid-state while
    /// registering; bus errors.
    pub async fn leave(&self, tenant: &Tenant, character_id: u32, reason: &str) -> RealmResult<Instance> {
        let instance = self.by_character(tenant, character_id)?;
        let definition = self.definition_of(tenant, &instance).await?;
        let id = instance.id();

        let remaining = self
            .emitter
            .emit(tenant, |buffer| {
                let (remaining, entry) = self.registry.update_with(tenant, &id, |current| {
                    let entry = current
                        .character(character_id)
                        .copied()
                        .ok_or_else(|| RealmError::not_found(Instance::KIND, format!("participant {character_id}")))?;
                    if !current.state().is_leavable() {
                        return Err(RealmError::invalid_state(
                            Instance::KIND,
                            current.id(),
                            current.state().as_str(),
                            "leave",
                        ));
                    }
                    Ok((current.without_character(character_id), entry))
                })?;
                buffer.put(
                    &self.topics.character,
                    character_id,
                    &CharacterCommand::change_map(&entry, definition.exit, Uuid::nil()),
                )?;
                self.put_status(
                    buffer,
                    &remaining,
                    StatusChange::CharacterLeft {
                        character_id,
                        channel_id: entry.channel_id,
                        reason: reason.to_string(),
                    },
                )?;
                if remaining.characters().is_empty() {
                    self.destroy_in(buffer, tenant, &remaining, &definition, REASON_EMPTY)?;
                }
                Ok(remaining)
            })
            .await?;
        tracing::info!(tenant = %tenant, instance_id = %id, character_id, reason, "Character left party quest");
        Ok(remaining)
    }

    /// Add item and kill deltas to the current stage's counters.
    ///
    /// # Errors
    ///
    /// Not-found if gone.
    pub fn update_stage_state(
        &self,
        tenant: &Tenant,
        id: Uuid,
        item_counts: &BTreeMap<u32, u32>,
        monster_kills: &BTreeMap<u32, u32>,
    ) -> RealmResult<Instance> {
        self.registry.update(tenant, &id, |current| {
            Ok(current.with_stage_state(current.stage_state().clone().with_counts(item_counts, monster_kills)))
        })
    }

    /// Set custom values, then bump counters by one.
    ///
    /// # Errors
    ///
    /// Not-found if gone.
    pub fn update_custom_data(
        &self,
        tenant: &Tenant,
        id: Uuid,
        updates: &BTreeMap<String, String>,
        increments: &[String],
    ) -> RealmResult<Instance> {
        self.registry.update(tenant, &id, |current| {
            Ok(current.with_stage_state(current.stage_state().clone().with_custom(updates, increments)))
        })
    }

    /// Send a system message to every participant. Returns how many were sent.
    ///
    /// # Errors
    ///
    /// Not-found if gone; bus errors.
    pub async fn broadcast(&self, tenant: &Tenant, id: Uuid, message_type: &str, message: &str) -> RealmResult<usize> {
        let instance = self.registry.get(tenant, &id)?;
        let topic = &self.topics.system_message;
        self.emitter
            .emit(tenant, |buffer| {
                for entry in instance.characters() {
                    buffer.put(topic, entry.character_id, &SystemMessageCommand::send(entry, message_type, message))?;
                }
                Ok(())
            })
            .await?;
        tracing::debug!(tenant = %tenant, instance_id = %id, recipients = instance.characters().len(), "Broadcast message");
        Ok(instance.characters().len())
    }

    /// Destroy an instance: clean up its reactors, send everyone to the exit
    /// map and forget it.
    ///
    /// # Errors
    ///
    /// Not-found if gone; bus errors.
    pub async fn destroy(&self, tenant: &Tenant, id: Uuid, reason: &str) -> RealmResult<Instance> {
        let instance = self.registry.get(tenant, &id)?;
        let definition = self.definition_of(tenant, &instance).await?;
        self.emitter
            .emit(tenant, |buffer| self.destroy_in(buffer, tenant, &instance, &definition, reason))
            .await
    }

    // -----------------------------------------------------------------------
    // Escort monsters
    // -----------------------------------------------------------------------

    /// The escort of `field` took a hit. Every `hitInterval` hits the stage's
    /// damage message goes out. Returns the hits so far.
    ///
    /// # Errors
    ///
    /// Not-found unless `monster_id` is the escort of the active stage
    /// running in `field`; bus errors.
    pub async fn on_friendly_damaged(&self, tenant: &Tenant, field: &MapKey, monster_id: u32) -> RealmResult<u32> {
        let (instance, _, escort) = self.escort_in(tenant, field, monster_id).await?;
        let (_, hits) = self.registry.update_with(tenant, &instance.id(), |current| {
            let stage_state = current.stage_state().clone().with_increment(FRIENDLY_HIT_COUNT, 1);
            let hits = stage_state.custom_number(FRIENDLY_HIT_COUNT);
            Ok((current.with_stage_state(stage_state), hits))
        })?;
        let damaged = &escort.on_damaged;
        if damaged.hit_interval > 0 && !damaged.message.is_empty() && hits % damaged.hit_interval == 0 {
            self.broadcast(tenant, instance.id(), ESCORT_MESSAGE_TYPE, &damaged.message)
                .await?;
        }
        Ok(hits)
    }

    /// The escort of `field` died. Announces it, and fails the run when the
    /// stage says so. Returns whether the run failed.
    ///
    /// # Errors
    ///
    /// Not-found unless `monster_id` is the escort of the active stage
    /// running in `field`; bus errors.
    pub async fn on_friendly_killed(&self, tenant: &Tenant, field: &MapKey, monster_id: u32) -> RealmResult<bool> {
        let (instance, definition, escort) = self.escort_in(tenant, field, monster_id).await?;
        if !escort.on_killed.message.is_empty() {
            self.announce(tenant, &instance, &escort.on_killed.message).await;
        }
        if escort.on_killed.action != KilledAction::Fail {
            return Ok(false);
        }
        tracing::info!(tenant = %tenant, instance_id = %instance.id(), monster_id, "Party quest escort killed");
        self.emitter
            .emit(tenant, |buffer| {
                self.fail_in(buffer, tenant, &instance, &definition, REASON_FRIENDLY_MONSTER_KILLED)
            })
            .await?;
        Ok(true)
    }

    /// The escort of `field` dropped `item_count` items. With a drop template
    /// configured the running total is announced. Returns the total.
    ///
    /// # Errors
    ///
    /// Not-found unless `monster_id` is the escort of the active stage
    /// running in `field`; bus errors.
    pub async fn on_friendly_drop(
        &self,
        tenant: &Tenant,
        field: &MapKey,
        monster_id: u32,
        item_count: u32,
    ) -> RealmResult<u32> {
        let (instance, _, escort) = self.escort_in(tenant, field, monster_id).await?;
        let template = &escort.on_drop.message_template;
        if template.is_empty() {
            return Ok(instance.stage_state().custom_number(FRIENDLY_DROP_COUNT));
        }
        let (_, total) = self.registry.update_with(tenant, &instance.id(), |current| {
            let stage_state = current
                .stage_state()
                .clone()
                .with_increment(FRIENDLY_DROP_COUNT, item_count);
            let total = stage_state.custom_number(FRIENDLY_DROP_COUNT);
            Ok((current.with_stage_state(stage_state), total))
        })?;
        let message = template.replace("{count}", &total.to_string());
        self.broadcast(tenant, instance.id(), ESCORT_MESSAGE_TYPE, &message)
            .await?;
        Ok(total)
    }

    async fn escort_in(
        &self,
        tenant: &Tenant,
        field: &MapKey,
        monster_id: u32,
    ) -> RealmResult<(Instance, Definition, FriendlyMonster)> {
        let missing = || RealmError::not_found("party quest escort", format!("{monster_id} in {field}"));
        let instance = self.by_field_instance(tenant, field.instance)?;
        if instance.state() != InstanceState::Active
            || instance.world_id() != field.world
            || instance.channel_id() != field.channel
        {
            return Err(missing());
        }
        let definition = self.definition_of(tenant, &instance).await?;
        let escort = definition
            .stage(instance.stage_index())
            .filter(|stage| stage.map_ids.contains(&field.map))
            .and_then(Stage::friendly_monster)
            .filter(|escort| escort.monster_id == monster_id)
            .ok_or_else(missing)?;
        Ok((instance, definition, escort))
    }

    async fn spawn_escort(&self, tenant: &Tenant, instance: &Instance, definition: &Definition) {
        let Some(stage) = definition.stage(instance.stage_index()) else {
            return;
        };
        let (Some(escort), Some(&map_id)) = (stage.friendly_monster(), stage.map_ids.first()) else {
            return;
        };
        let field = MapKey::new(instance.world_id(), instance.channel_id(), map_id, instance.id());
        let spawn = MonsterSpawn {
            monster_id: escort.monster_id,
            x: escort.x,
            y: escort.y,
            fh: escort.fh,
        };
        if let Err(e) = self.peers.spawn_monster(tenant, &field, spawn).await {
            tracing::error!(
                tenant = %tenant,
                instance_id = %instance.id(),
                monster_id = escort.monster_id,
                error = %e,
                "Failed to spawn escort monster"
            );
            return;
        }
        tracing::info!(tenant = %tenant, instance_id = %instance.id(), monster_id = escort.monster_id, field = %field, "Spawned escort monster");
        if !escort.spawn_message.is_empty() {
            self.announce(tenant, instance, &escort.spawn_message).await;
        }
    }

    async fn run_clear_actions(&self, tenant: &Tenant, instance: &Instance, stage: &Stage) {
        for action in &stage.clear_actions {
            match action {
                ClearAction::DestroyMonsters => {
                    for &map_id in &stage.map_ids {
                        let field = MapKey::new(instance.world_id(), instance.channel_id(), map_id, instance.id());
                        if let Err(e) = self.peers.destroy_monsters(tenant, &field).await {
                            tracing::warn!(tenant = %tenant, field = %field, error = %e, "Failed to destroy stage monsters");
                        }
                    }
                },
                ClearAction::Other => {
                    tracing::warn!(tenant = %tenant, instance_id = %instance.id(), stage_index = stage.index, "Unknown clear action skipped");
                },
            }
        }
    }

    async fn announce(&self, tenant: &Tenant, instance: &Instance, message: &str) {
        if let Err(e) = self.broadcast(tenant, instance.id(), ESCORT_MESSAGE_TYPE, message).await {
            tracing::warn!(tenant = %tenant, instance_id = %instance.id(), error = %e, "Escort announcement failed");
        }
    }

    // -----------------------------------------------------------------------
    // Timers and shutdown
    // -----------------------------------------------------------------------

    /// Act on every timer of a tenant that has run out. Returns how many
    /// instances were acted on.
    pub async fn expire(&self, tenant: &Tenant, now: DateTime<Utc>) -> usize {
        let mut fired = 0;
        for instance in self.registry.snapshot(tenant) {
            let definition = match self.definition_of(tenant, &instance).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(tenant = %tenant, instance_id = %instance.id(), error = %e, "No definition for timers");
                    continue;
                },
            };
            let Some(expiry) = timers::due(&instance, &definition, self.completion_timeout_secs, now) else {
                continue;
            };
            tracing::info!(
                tenant = %tenant,
                instance_id = %instance.id(),
                expiry = ?expiry,
                "Party quest timer expired"
            );
            let result = self
                .emitter
                .emit(tenant, |buffer| {
                    let outcome = match expiry {
                        Expiry::Registration => self.start_in(buffer, tenant, &instance, &definition, now),
                        Expiry::Global => self.fail_in(buffer, tenant, &instance, &definition, REASON_TIME_EXPIRED),
                        Expiry::Stage => self.advance_in(buffer, tenant, &instance, &definition, now),
                        Expiry::Bonus => self.destroy_in(buffer, tenant, &instance, &definition, REASON_BONUS_EXPIRED),
                        Expiry::Completion => {
                            self.destroy_in(buffer, tenant, &instance, &definition, REASON_COMPLETION_EXPIRED)
                        },
                    };
                    outcome
                })
                .await;
            match result {
                Ok(after) => {
                    fired += 1;
                    if entered_stage(&instance, &after) {
                        self.spawn_escort(tenant, &after, &definition).await;
                    }
                },
                Err(e) if e.is_not_found() => {},
                Err(RealmError::Conflict(reason)) => {
                    tracing::debug!(tenant = %tenant, instance_id = %instance.id(), reason = %reason, "Timer lost to a command");
                },
                Err(e) => {
                    tracing::warn!(tenant = %tenant, instance_id = %instance.id(), error = %e, "Timer action failed");
                },
            }
        }
        fired
    }

    /// Destroy every instance of every tenant. Returns how many went.
    pub async fn shutdown(&self) -> usize {
        let mut destroyed = 0;
        for tenant in self.registry.tenants() {
            for instance in self.registry.snapshot(&tenant) {
                match self.destroy(&tenant, instance.id(), REASON_SHUTDOWN).await {
                    Ok(_) => destroyed += 1,
                    Err(e) if e.is_not_found() => {},
                    Err(e) => {
                        tracing::error!(tenant = %tenant, instance_id = %instance.id(), error = %e, "Shutdown destroy failed");
                    },
                }
            }
        }
        tracing::info!(destroyed, "Party quests shut down");
        destroyed
    }

    // -----------------------------------------------------------------------
    // Buffered steps
    // -----------------------------------------------------------------------

    async fn definition_of(&self, tenant: &Tenant, instance: &Instance) -> RealmResult<Definition> {
        self.definition(tenant, instance.definition_id()).await
    }

    fn transition(&self, instance: &Instance, signal: Signal, operation: &'static str) -> RealmResult<InstanceState> {
        self.lifecycle.fire(
            Instance::KIND,
            instance.id(),
            instance.state(),
            instance,
            &signal,
            operation,
        )
    }

    fn start_in(
        &self,
        buffer: &mut MessageBuffer,
        tenant: &Tenant,
        instance: &Instance,
        definition: &Definition,
        now: DateTime<Utc>,
    ) -> RealmResult<Instance> {
        let stage = definition
            .stage(0)
            .ok_or_else(|| RealmError::validation(format!("party quest [{}] has no stages", definition.quest_id)))?;
        let started = self.registry.update(tenant, &instance.id(), |current| {
            self.transition(current, Signal::Start, "start")?;
            Ok(current.started(StageState::for_stage(stage), now))
        })?;
        if let Some(&map_id) = stage.map_ids.first() {
            self.warp_all(buffer, &started, map_id, started.id())?;
        }
        self.put_status(
            buffer,
            &started,
            StatusChange::Started {
                stage_index: 0,
                map_ids: stage.map_ids.clone(),
            },
        )?;
        tracing::info!(tenant = %tenant, instance_id = %started.id(), quest_id = %started.quest_id(), "Party quest started");
        Ok(started)
    }

    fn clear_in(
        &self,
        buffer: &mut MessageBuffer,
        tenant: &Tenant,
        instance: &Instance,
        definition: &Definition,
    ) -> RealmResult<Instance> {
        let stage = current_stage(definition, instance)?;
        let cleared = self.registry.update(tenant, &instance.id(), |current| {
            let next = self.transition(current, Signal::Clear, "stage clear")?;
            Ok(current.with_state(next))
        })?;
        self.reward_all(buffer, &cleared, &stage.rewards)?;
        self.put_status(
            buffer,
            &cleared,
            StatusChange::StageCleared {
                stage_index: cleared.stage_index(),
                channel_id: cleared.channel_id(),
                map_ids: stage.map_ids.clone(),
                field_instances: vec![cleared.id()],
            },
        )?;
        tracing::info!(
            tenant = %tenant,
            instance_id = %cleared.id(),
            stage_index = cleared.stage_index(),
            "Party quest stage cleared"
        );
        Ok(cleared)
    }

    fn advance_in(
        &self,
        buffer: &mut MessageBuffer,
        tenant: &Tenant,
        instance: &Instance,
        definition: &Definition,
        now: DateTime<Utc>,
    ) -> RealmResult<Instance> {
        let current_index = instance.stage_index();
        let next_index = current_index.saturating_add(1);
        let Some(next_stage) = definition.stage(next_index) else {
            return self.complete_in(buffer, tenant, instance, definition, now);
        };
        let advanced = self.registry.update(tenant, &instance.id(), |current| {
            if current.stage_index() != current_index {
                return Err(RealmError::Conflict(format!(
                    "party quest instance [{}] already left stage {current_index}",
                    current.id()
                )));
            }
            self.transition(current, Signal::Advance { last: false }, "stage advance")?;
            Ok(current.advanced(next_index, StageState::for_stage(next_stage), now))
        })?;
        let warps = definition
            .stage(current_index)
            .is_none_or(|s| s.warp_type != WarpType::None);
        if let Some(&map_id) = next_stage.map_ids.first().filter(|_| warps) {
            self.warp_all(buffer, &advanced, map_id, advanced.id())?;
        }
        self.put_status(
            buffer,
            &advanced,
            StatusChange::StageAdvanced {
                stage_index: next_index,
                map_ids: next_stage.map_ids.clone(),
            },
        )?;
        tracing::info!(tenant = %tenant, instance_id = %advanced.id(), stage_index = next_index, "Party quest advanced");
        Ok(advanced)
    }

    fn complete_in(
        &self,
        buffer: &mut MessageBuffer,
        tenant: &Tenant,
        instance: &Instance,
        definition: &Definition,
        now: DateTime<Utc>,
    ) -> RealmResult<Instance> {
        let completed = self.registry.update(tenant, &instance.id(), |current| {
            let next = self.transition(current, Signal::Advance { last: true }, "complete")?;
            Ok(current.with_state(next))
        })?;
        self.reward_all(buffer, &completed, &definition.rewards)?;
        self.put_status(buffer, &completed, StatusChange::Completed {})?;
        self.destroy_reactors(buffer, &completed, definition.stage_maps(completed.stage_index()))?;
        tracing::info!(tenant = %tenant, instance_id = %completed.id(), "Party quest completed");

        match &definition.bonus {
            None => {
                self.destroy_in(buffer, tenant, &completed, definition, REASON_COMPLETED)?;
                Ok(completed)
            },
            Some(bonus) if bonus.entry == BonusEntry::Auto => {
                self.enter_bonus_in(buffer, tenant, &completed, bonus, now)
            },
            Some(bonus) => {
                if bonus.completion_map_id != 0 {
                    self.warp_all(buffer, &completed, bonus.completion_map_id, completed.id())?;
                }
                self.registry
                    .update(tenant, &completed.id(), |current| Ok(current.with_stage_clock(now)))
            },
        }
    }

    fn enter_bonus_in(
        &self,
        buffer: &mut MessageBuffer,
        tenant: &Tenant,
        instance: &Instance,
        bonus: &Bonus,
        now: DateTime<Utc>,
    ) -> RealmResult<Instance> {
        let entered = self.registry.update(tenant, &instance.id(), |current| {
            self.transition(current, Signal::EnterBonus, "enter bonus")?;
            Ok(current.in_bonus(now))
        })?;
        if bonus.map_id != 0 {
            self.warp_all(buffer, &entered, bonus.map_id, entered.id())?;
        }
        self.put_status(buffer, &entered, StatusChange::BonusEntered { map_id: bonus.map_id })?;
        tracing::info!(tenant = %tenant, instance_id = %entered.id(), map_id = bonus.map_id, "Party quest bonus entered");
        Ok(entered)
    }

    fn fail_in(
        &self,
        buffer: &mut MessageBuffer,
        tenant: &Tenant,
        instance: &Instance,
        definition: &Definition,
        reason: &str,
    ) -> RealmResult<Instance> {
        let failed = self.registry.update(tenant, &instance.id(), |current| {
            let next = self.transition(current, Signal::Fail, "fail")?;
            Ok(current.with_state(next))
        })?;
        self.put_status(
            buffer,
            &failed,
            StatusChange::Failed {
                reason: reason.to_string(),
            },
        )?;
        tracing::info!(tenant = %tenant, instance_id = %failed.id(), reason, "Party quest failed");
        self.destroy_in(buffer, tenant, &failed, definition, reason)
    }

    /// Remove the instance, then buffer its cleanup. Whoever finds it already
    /// gone gets not-found and buffers nothing.
    fn destroy_in(
        &self,
        buffer: &mut MessageBuffer,
        tenant: &Tenant,
        instance: &Instance,
        definition: &Definition,
        reason: &str,
    ) -> RealmResult<Instance> {
        let instance = self
            .registry
            .delete(tenant, &instance.id())
            .ok_or_else(|| RealmError::not_found(Instance::KIND, instance.id()))?;
        match instance.state() {
            InstanceState::Completed => {},
            InstanceState::Bonus => {
                if let Some(bonus) = definition.bonus.as_ref().filter(|b| b.map_id != 0) {
                    self.destroy_reactors(buffer, &instance, &[bonus.map_id])?;
                }
            },
            _ => self.destroy_reactors(buffer, &instance, definition.stage_maps(instance.stage_index()))?,
        }
        self.warp_all(buffer, &instance, definition.exit, Uuid::nil())?;
        self.put_status(
            buffer,
            &instance,
            StatusChange::InstanceDestroyed {
                reason: reason.to_string(),
            },
        )?;
        tracing::info!(tenant = %tenant, instance_id = %instance.id(), reason, "Party quest instance destroyed");
        Ok(instance)
    }

    fn put_status(&self, buffer: &mut MessageBuffer, instance: &Instance, change: StatusChange) -> RealmResult<()> {
        buffer.put(&self.topics.status, instance.id(), &PartyQuestStatus::of(instance, change))?;
        Ok(())
    }

    fn warp_all(&self, buffer: &mut MessageBuffer, instance: &Instance, map_id: u32, field: Uuid) -> RealmResult<()> {
        for entry in instance.characters() {
            buffer.put(
                &self.topics.character,
                entry.character_id,
                &CharacterCommand::change_map(entry, map_id, field),
            )?;
        }
        Ok(())
    }

    fn reward_all(&self, buffer: &mut MessageBuffer, instance: &Instance, rewards: &[Reward]) -> RealmResult<()> {
        for reward in rewards.iter().filter(|r| r.kind == RewardType::Experience && r.amount > 0) {
            for entry in instance.characters() {
                buffer.put(
                    &self.topics.character,
                    entry.character_id,
                    &CharacterCommand::award_experience(entry, reward.amount),
                )?;
            }
        }
        Ok(())
    }

    fn destroy_reactors(&self, buffer: &mut MessageBuffer, instance: &Instance, maps: &[u32]) -> RealmResult<()> {
        for &map_id in maps {
            buffer.put(
                &self.topics.reactor,
                map_id,
                &ReactorFieldCommand::destroy_in_field(instance, map_id),
            )?;
        }
        Ok(())
    }
}

fn current_stage<'a>(definition: &'a Definition, instance: &Instance) -> RealmResult<&'a Stage> {
    definition.stage(instance.stage_index()).ok_or_else(|| {
        RealmError::validation(format!(
            "party quest [{}] has no stage {}",
            definition.quest_id,
            instance.stage_index()
        ))
    })
}

/// Whether `after` is playing a stage `before` was not.
fn entered_stage(before: &Instance, after: &Instance) -> bool {
    after.state() == InstanceState::Active
        && (before.state() != InstanceState::Active || before.stage_index() != after.stage_index())
}

impl std::fmt::Debug for PartyQuestProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartyQuestProcessor")
            .field("topics", &self.topics)
            .field("lifecycle", &self.lifecycle)
            .field("completion_timeout_secs", &self.completion_timeout_secs)
            .finish_non_exhaustive()
    }
}
