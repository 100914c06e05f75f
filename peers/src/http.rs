//! HTTP implementations of the peer capabilities.

use crate::client::PeerClient;
use realm_core::Tenant;
use realm_core::peer::{
    Asset, Buff, BuffPeer, CashItemData, CharacterData, CharacterPeer, CharacterSkill,
    EquipmentData, GameDataPeer, Guild, GuildPeer, InventoryPeer, MapPeer, MonsterPeer, MonsterSpawn, Party,
    PartyPeer, PeerError, PeerFuture, QuestPeer, QuestState, QuestStatus, ReactorData, SkillData, SkillPeer, names,
};
use realm_core::registry::MapKey;
use serde::Deserialize;
use serde::de::IgnoredAny;

/// Inventory compartment holding equipment.
const EQUIP_COMPARTMENT: u8 = 1;
/// Inventory compartment holding cash items.
const CASH_COMPARTMENT: u8 = 5;

/// Every peer capability over one [`PeerClient`].
///
/// ```ignore
/// let peers = Arc::new(HttpPeers::new(PeerClient::new(&config.base_service_url)?));
/// let character = peers.character_by_id(&tenant, 12345).await?;
/// ```
#[derive(Clone, Debug)]
pub struct HttpPeers {
    client: PeerClient,
}

impl HttpPeers {
    /// Wrap a client.
    #[must_use]
    pub const fn new(client: PeerClient) -> Self {
        Self { client }
    }

    /// Underlying client.
    #[must_use]
    pub const fn client(&self) -> &PeerClient {
        &self.client
    }
}

impl CharacterPeer for HttpPeers {
    fn character_by_id(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, CharacterData> {
        let tenant = tenant.clone();
        Box::pin(async move {
            self.client
                .get_one(
                    names::CHARACTER,
                    &tenant,
                    &format!("characters/{character_id}"),
                    character_id,
                )
                .await
        })
    }
}

impl HttpPeers {
    async fn compartment(&self, tenant: &Tenant, character_id: u32, kind: u8) -> Result<Vec<Asset>, PeerError> {
        self.client
            .get_many(
                names::INVENTORY,
                tenant,
                &format!("characters/{character_id}/inventory/compartments/{kind}/assets"),
            )
            .await
    }
}

impl InventoryPeer for HttpPeers {
    fn equip_compartment(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<Asset>> {
        let tenant = tenant.clone();
        Box::pin(async move { self.compartment(&tenant, character_id, EQUIP_COMPARTMENT).await })
    }

    fn cash_compartment(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<Asset>> {
        let tenant = tenant.clone();
        Box::pin(async move { self.compartment(&tenant, character_id, CASH_COMPARTMENT).await })
    }
}

impl BuffPeer for HttpPeers {
    fn character_buffs(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<Buff>> {
        let tenant = tenant.clone();
        Box::pin(async move {
            self.client
                .get_many(names::BUFFS, &tenant, &format!("characters/{character_id}/buffs"))
                .await
        })
    }
}

impl SkillPeer for HttpPeers {
    fn character_skills(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Vec<CharacterSkill>> {
        let tenant = tenant.clone();
        Box::pin(async move {
            self.client
                .get_many(names::SKILLS, &tenant, &format!("characters/{character_id}/skills"))
                .await
        })
    }
}

impl GameDataPeer for HttpPeers {
    fn skill_data(&self, tenant: &Tenant, skill_id: u32) -> PeerFuture<'_, SkillData> {
        let tenant = tenant.clone();
        Box::pin(async move {
            self.client
                .get_one(names::DATA, &tenant, &format!("data/skills/{skill_id}"), skill_id)
                .await
        })
    }

    fn cash_item_data(&self, tenant: &Tenant, template_id: u32) -> PeerFuture<'_, CashItemData> {
        let tenant = tenant.clone();
        Box::pin(async move {
            self.client
                .get_one(names::DATA, &tenant, &format!("data/cash/items/{template_id}"), template_id)
                .await
        })
    }

    fn equipment_data(&self, tenant: &Tenant, template_id: u32) -> PeerFuture<'_, EquipmentData> {
        let tenant = tenant.clone();
        Box::pin(async move {
            self.client
                .get_one(names::DATA, &tenant, &format!("data/equipment/{template_id}"), template_id)
                .await
        })
    }

    fn reactor_data(&self, tenant: &Tenant, classification: u32) -> PeerFuture<'_, ReactorData> {
        let tenant = tenant.clone();
        Box::pin(async move {
            self.client
                .get_one(
                    names::DATA,
                    &tenant,
                    &format!("data/reactors/{classification}"),
                    classification,
                )
                .await
        })
    }
}

#[derive(Deserialize)]
struct QuestProgress {
    state: QuestState,
}

impl QuestPeer for HttpPeers {
    fn quest_status(&self, tenant: &Tenant, character_id: u32, quest_id: u32) -> PeerFuture<'_, QuestStatus> {
        let tenant = tenant.clone();
        Box::pin(async move {
            let progress = self
                .client
                .get_one::<QuestProgress>(
                    names::QUESTS,
                    &tenant,
                    &format!("characters/{character_id}/quests/{quest_id}"),
                    quest_id,
                )
                .await;
            let state = match progress {
                Ok(progress) => progress.state,
                Err(PeerError::NotFound { .. }) => QuestState::NotStarted,
                Err(e) => return Err(e),
            };
            Ok(QuestStatus { quest_id, state })
        })
    }
}

impl MapPeer for HttpPeers {
    fn player_count(&self, tenant: &Tenant, world: u8, channel: u8, map: u32) -> PeerFuture<'_, u32> {
        let tenant = tenant.clone();
        Box::pin(async move {
            let characters: Vec<IgnoredAny> = self
                .client
                .get_many(
                    names::MAPS,
                    &tenant,
                    &format!("worlds/{world}/channels/{channel}/maps/{map}/characters"),
                )
                .await?;
            Ok(u32::try_from(characters.len()).unwrap_or(u32::MAX))
        })
    }
}

impl PartyPeer for HttpPeers {
    fn party(&self, tenant: &Tenant, party_id: u32) -> PeerFuture<'_, Party> {
        let tenant = tenant.clone();
        Box::pin(async move {
            self.client
                .get_one(names::PARTIES, &tenant, &format!("parties/{party_id}"), party_id)
                .await
        })
    }

    fn party_of(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Party> {
        let tenant = tenant.clone();
        Box::pin(async move {
            let parties: Vec<Party> = self
                .client
                .get_many(
                    names::PARTIES,
                    &tenant,
                    &format!("parties?filter[members.id]={character_id}"),
                )
                .await?;
            parties.into_iter().next().ok_or_else(|| PeerError::NotFound {
                peer: names::PARTIES,
                id: format!("member {character_id}"),
            })
        })
    }
}

impl GuildPeer for HttpPeers {
    fn guild_of(&self, tenant: &Tenant, character_id: u32) -> PeerFuture<'_, Guild> {
        let tenant = tenant.clone();
        Box::pin(async move {
            let guilds: Vec<Guild> = self
                .client
                .get_many(
                    names::GUILDS,
                    &tenant,
                    &format!("guilds?filter[members.id]={character_id}"),
                )
                .await?;
            guilds.into_iter().next().ok_or_else(|| PeerError::NotFound {
                peer: names::GUILDS,
                id: format!("member {character_id}"),
            })
        })
    }
}

fn monsters_path(field: &MapKey) -> String {
    format!(
        "worlds/{}/channels/{}/maps/{}/instances/{}/monsters",
        field.world, field.channel, field.map, field.instance
    )
}

impl MonsterPeer for HttpPeers {
    fn spawn_monster(&self, tenant: &Tenant, field: &MapKey, spawn: MonsterSpawn) -> PeerFuture<'_, ()> {
        let tenant = tenant.clone();
        let path = monsters_path(field);
        Box::pin(async move {
            self.client
                .post(names::MONSTERS, &tenant, &path, "monsters", &spawn)
                .await
        })
    }

    fn destroy_monsters(&self, tenant: &Tenant, field: &MapKey) -> PeerFuture<'_, ()> {
        let tenant = tenant.clone();
        let path = monsters_path(field);
        Box::pin(async move { self.client.delete(names::MONSTERS, &tenant, &path).await })
    }
}
