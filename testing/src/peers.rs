//! In-process peer services.
//!
//! [`StubPeers`] implements every peer capability from maps the test fills
//! in. Any peer can be switched to "unavailable" to exercise degraded paths,
//! and every call is counted so tests can assert that lazy initialization
//! does not re-fetch.

use realm_core::Tenant;
use realm_core::peer::{
    Asset, Buff, BuffPeer, CashItemData, CharacterData, CharacterPeer, CharacterSkill,
    EquipmentData, GameDataPeer, Guild, GuildPeer, InventoryPeer, MapPeer, MonsterPeer, MonsterSpawn, Party,
    PartyPeer, PeerError, PeerFuture, QuestPeer, QuestState, QuestStatus, ReactorData, SkillData, SkillPeer,
};
use realm_core::registry::MapKey;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use realm_core::peer::names;

#[derive(Debug, Default)]
struct State {
    characters: HashMap<u32, CharacterData>,
    equipment: HashMap<u32, Vec<Asset>>,
    cash: HashMap<u32, Vec<Asset>>,
    buffs: HashMap<u32, Vec<Buff>>,
    skills: HashMap<u32, Vec<CharacterSkill>>,
    skill_data: HashMap<u32, SkillData>,
    cash_items: HashMap<u32, CashItemData>,
    equipment_data: HashMap<u32, EquipmentData>,
    reactors: HashMap<u32, ReactorData>,
    quests: HashMap<(u32, u32), QuestState>,
    players: HashMap<(u8, u8, u32), u32>,
    parties: Vec<Party>,
    guilds: Vec<Guild>,
    spawned: Vec<(MapKey, MonsterSpawn)>,
    cleared: Vec<MapKey>,
    unavailable: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
}

/// Configurable stand-in for every peer service.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct StubPeers {
    state: Arc<Mutex<State>>,
}

impl StubPeers {
    /// Stubs with no data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a character.
    pub fn add_character(&self, character: CharacterData) -> &Self {
        self.state().characters.insert(character.id, character);
        self
    }

    /// Set the equipment compartment of a character.
    pub fn set_equipment(&self, character_id: u32, assets: Vec<Asset>) -> &Self {
        self.state().equipment.insert(character_id, assets);
        self
    }

    /// Set the cash compartment of a character.
    pub fn set_cash(&self, character_id: u32, assets: Vec<Asset>) -> &Self {
        self.state().cash.insert(character_id, assets);
        self
    }

    /// Set the active buffs of a character.
    pub fn set_buffs(&self, character_id: u32, buffs: Vec<Buff>) -> &Self {
        self.state().buffs.insert(character_id, buffs);
        self
    }

    /// Set the learned skills of a character.
    pub fn set_skills(&self, character_id: u32, skills: Vec<CharacterSkill>) -> &Self {
        self.state().skills.insert(character_id, skills);
        self
    }

    /// Register a skill definition.
    pub fn add_skill_data(&self, data: SkillData) -> &Self {
        self.state().skill_data.insert(data.id, data);
        self
    }

    /// Register a cash item definition.
    pub fn add_cash_item(&self, data: CashItemData) -> &Self {
        self.state().cash_items.insert(data.id, data);
        self
    }

    /// Register an equipment definition.
    pub fn add_equipment_data(&self, data: EquipmentData) -> &Self {
        self.state().equipment_data.insert(data.id, data);
        self
    }

    /// Register a reactor definition.
    pub fn add_reactor_data(&self, classification: u32, data: ReactorData) -> &Self {
        self.state().reactors.insert(classification, data);
        self
    }

    /// Set the progress of one quest for one character.
    pub fn set_quest(&self, character_id: u32, quest_id: u32, state: QuestState) -> &Self {
        self.state().quests.insert((character_id, quest_id), state);
        self
    }

    /// Set the number of players in a field.
    pub fn set_player_count(&self, world: u8, channel: u8, map: u32, count: u32) -> &Self {
        self.state().players.insert((world, channel, map), count);
        self
    }

    /// Register a party.
    pub fn add_party(&self, party: Party) -> &Self {
        let mut state = self.state();
        state.parties.retain(|p| p.id != party.id);
        state.parties.push(party);
        drop(state);
        self
    }

    /// Register a guild.
    pub fn add_guild(&self, guild: Guild) -> &Self {
        let mut state = self.state();
        state.guilds.retain(|g| g.id != guild.id);
        state.guilds.push(guild);
        drop(state);
        self
    }

    /// Make a peer (see [`names`]) fail every request.
    pub fn make_unavailable(&self, peer: &'static str) -> &Self {
        self.state().unavailable.insert(peer);
        self
    }

    /// Bring a peer back.
    pub fn make_available(&self, peer: &'static str) -> &Self {
        self.state().unavailable.remove(peer);
        self
    }

    /// Monsters spawned so far, in order.
    #[must_use]
    pub fn spawned_monsters(&self) -> Vec<(MapKey, MonsterSpawn)> {
        self.state().spawned.clone()
    }

    /// Fields whose monsters were destroyed, in order.
    #[must_use]
    pub fn cleared_fields(&self) -> Vec<MapKey> {
        self.state().cleared.clone()
    }

    /// Requests served (or refused) by a peer so far.
    #[must_use]
    pub fn calls(&self, peer: &'static str) -> usize {
        self.state().calls.get(peer).copied().unwrap_or(0)
    }

    fn answer<T: Send + 'static>(
        &self,
        peer: &'static str,
        lookup: impl FnOnce(&mut State) -> Result<T, PeerError>,
    ) -> PeerFuture<'_, T> {
        let result = {
            let mut state = self.state();
            *state.calls.entry(peer).or_default() += 1;
            if state.unavailable.contains(peer) {
                Err(PeerError::Unavailable {
                    peer,
                    reason: "stubbed outage".to_string(),
                })
            } else {
                lookup(&mut state)
            }
        };
        Box::pin(async move { result })
    }
}

fn not_found(peer: &'static str, id: impl ToString) -> PeerError {
    PeerError::NotFound {
        peer,
        id: id.to_string(),
    }
}

impl CharacterPeer for StubPeers {
    fn character_by_id(&self, _tenant: &Tenant, character_id: u32) -> PeerFuture<'_, CharacterData> {
        self.answer(names::CHARACTER, |s| {
            s.characters
                .get(&character_id)
                .cloned()
                .ok_or_else(|| not_found(names::CHARACTER, character_id))
        })
    }
}

impl InventoryPeer for StubPeers {
    fn equip_compartment(&self, _tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<Asset>> {
        self.answer(names::INVENTORY, |s| {
            Ok(s.equipment.get(&character_id).cloned().unwrap_or_default())
        })
    }

    fn cash_compartment(&self, _tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<Asset>> {
        self.answer(names::INVENTORY, |s| {
            Ok(s.cash.get(&character_id).cloned().unwrap_or_default())
        })
    }
}

impl BuffPeer for StubPeers {
    fn character_buffs(&self, _tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<Buff>> {
        self.answer(names::BUFFS, |s| {
            Ok(s.buffs.get(&character_id).cloned().unwrap_or_default())
        })
    }
}

impl SkillPeer for StubPeers {
    fn character_skills(&self, _tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<CharacterSkill>> {
        self.answer(names::SKILLS, |s| {
            Ok(s.skills.get(&character_id).cloned().unwrap_or_default())
        })
    }
}

impl GameDataPeer for StubPeers {
    fn skill_data(&self, _tenant: &Tenant, skill_id: u32) -> PeerFuture<'_, SkillData> {
        self.answer(names::DATA, |s| {
            s.skill_data
                .get(&skill_id)
                .cloned()
                .ok_or_else(|| not_found(names::DATA, skill_id))
        })
    }

    fn cash_item_data(&self, _tenant: &Tenant, template_id: u32) -> PeerFuture<'_, CashItemData> {
        self.answer(names::DATA, |s| {
            s.cash_items
                .get(&template_id)
                .cloned()
                .ok_or_else(|| not_found(names::DATA, template_id))
        })
    }

    fn equipment_data(&self, _tenant: &Tenant, template_id: u32) -> PeerFuture<'_, EquipmentData> {
        self.answer(names::DATA, |s| {
            s.equipment_data
                .get(&template_id)
                .cloned()
                .ok_or_else(|| not_found(names::DATA, template_id))
        })
    }

    fn reactor_data(&self, _tenant: &Tenant, classification: u32) -> PeerFuture<'_, ReactorData> {
        self.answer(names::DATA, |s| {
            s.reactors
                .get(&classification)
                .cloned()
                .ok_or_else(|| not_found(names::DATA, classification))
        })
    }
}

impl QuestPeer for StubPeers {
    fn quest_status(&self, _tenant: &Tenant, character_id: u32, quest_id: u32) -> PeerFuture<'_, QuestStatus> {
        self.answer(names::QUESTS, |s| {
            Ok(QuestStatus {
                quest_id,
                state: s
                    .quests
                    .get(&(character_id, quest_id))
                    .copied()
                    .unwrap_or(QuestState::NotStarted),
            })
        })
    }
}

impl MapPeer for StubPeers {
    fn player_count(&self, _tenant: &Tenant, world: u8, channel: u8, map: u32) -> PeerFuture<'_, u32> {
        self.answer(names::MAPS, |s| {
            Ok(s.players.get(&(world, channel, map)).copied().unwrap_or(0))
        })
    }
}

impl GuildPeer for StubPeers {
    fn guild_of(&self, _tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Guild> {
        self.answer(names::GUILDS, |s| {
            s.guilds
                .iter()
                .find(|g| g.members.contains(&character_id))
                .cloned()
                .ok_or_else(|| not_found(names::GUILDS, character_id))
        })
    }
}

impl PartyPeer for StubPeers {
    fn party(&self, _tenant: &Tenant, party_id: u32) -> PeerFuture<'_, Party> {
        self.answer(names::PARTIES, |s| {
            s.parties
                .iter()
                .find(|p| p.id == party_id)
                .cloned()
                .ok_or_else(|| not_found(names::PARTIES, party_id))
        })
    }

    fn party_of(&self, _tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Party> {
        self.answer(names::PARTIES, |s| {
            s.parties
                .iter()
                .find(|p| p.members.contains(&character_id))
                .cloned()
                .ok_or_else(|| not_found(names::PARTIES, character_id))
        })
    }
}

impl MonsterPeer for StubPeers {
    fn spawn_monster(&self, _tenant: &Tenant, field: &MapKey, spawn: MonsterSpawn) -> PeerFuture<'_, ()> {
        let field = *field;
        self.answer(names::MONSTERS, move |s| {
            s.spawned.push((field, spawn));
            Ok(())
        })
    }

    fn destroy_monsters(&self, _tenant: &Tenant, field: &MapKey) -> PeerFuture<'_, ()> {
        let field = *field;
        self.answer(names::MONSTERS, move |s| {
            s.cleared.push(field);
            Ok(())
        })
    }
}
