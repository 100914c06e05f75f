//! `HttpPeers` against a mock peer server.

#![allow(clippy::expect_used)]

use realm_core::Tenant;
use realm_core::peer::{
    CharacterPeer, GameDataPeer, InventoryPeer, MapPeer, MonsterPeer, MonsterSpawn, PartyPeer, PeerError,
    QuestPeer, QuestState,
};
use realm_core::registry::MapKey;
use realm_peers::{HttpPeers, PeerClient};
use realm_runtime::RetryPolicy;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tenant() -> Tenant {
    Tenant::new(
        Uuid::parse_str("00000000-0000-0000-0000-000000000001").expect("uuid"),
        "GMS",
        83,
        1,
    )
}

fn peers(server: &MockServer, retries: u32) -> HttpPeers {
    let client = PeerClient::with_timeout(format!("{}/api", server.uri()), Duration::from_secs(2))
        .expect("client")
        .with_retry(
            RetryPolicy::builder()
                .max_retries(retries)
                .initial_delay(Duration::from_millis(1))
                .build(),
        );
    HttpPeers::new(client)
}

#[tokio::test]
async fn character_request_carries_tenant_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/characters/12345"))
        .and(header("TENANT_ID", "00000000-0000-0000-0000-000000000001"))
        .and(header("REGION", "GMS"))
        .and(header("MAJOR_VERSION", "83"))
        .and(header("MINOR_VERSION", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "type": "characters",
                "id": "12345",
                "attributes": {
                    "worldId": 0, "level": 30, "mapId": 100000000,
                    "strength": 50, "dexterity": 4, "intelligence": 4, "luck": 4,
                    "hp": 500, "maxHp": 5000, "mp": 100, "maxMp": 300
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let character = peers(&server, 0)
        .character_by_id(&tenant(), 12345)
        .await
        .expect("character");
    assert_eq!(character.id, 12345);
    assert_eq!(character.strength, 50);
    assert_eq!(character.max_hp, 5000);
}

#[tokio::test]
async fn missing_character_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(path("/api/characters/9"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = peers(&server, 3).character_by_id(&tenant(), 9).await;
    assert!(matches!(result, Err(PeerError::NotFound { peer: "character", .. })));
}

#[tokio::test]
async fn server_errors_are_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(path("/api/data/skills/1000001"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let result = peers(&server, 2).skill_data(&tenant(), 1_000_001).await;
    assert!(matches!(result, Err(PeerError::Unavailable { peer: "data", .. })));
}

#[tokio::test]
async fn unreadable_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(path("/api/data/equipment/1302000"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let result = peers(&server, 2).equipment_data(&tenant(), 1_302_000).await;
    assert!(matches!(result, Err(PeerError::Decode { .. })));
}

#[tokio::test]
async fn equip_compartment_reads_assets() {
    let server = MockServer::start().await;
    Mock::given(path("/api/characters/7/inventory/compartments/1/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "type": "assets", "id": "100", "attributes": {
                    "slot": -11, "templateId": 1302000,
                    "stats": { "strength": 15, "weaponAttack": 17 } } },
                { "type": "assets", "id": "101", "attributes": { "slot": 4, "templateId": 1040002 } }
            ]
        })))
        .mount(&server)
        .await;

    let assets = peers(&server, 0)
        .equip_compartment(&tenant(), 7)
        .await
        .expect("assets");
    assert_eq!(assets.len(), 2);
    assert!(assets[0].is_equipped());
    assert_eq!(assets[0].stats.map(|s| s.weapon_attack), Some(17));
    assert!(!assets[1].is_equipped());
}

#[tokio::test]
async fn missing_collection_is_empty() {
    let server = MockServer::start().await;
    Mock::given(path("/api/characters/7/inventory/compartments/5/assets"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let assets = peers(&server, 0).cash_compartment(&tenant(), 7).await;
    assert_eq!(assets, Ok(Vec::new()));
}

#[tokio::test]
async fn quest_never_touched_is_not_started() {
    let server = MockServer::start().await;
    Mock::given(path("/api/characters/7/quests/2000"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(path("/api/characters/7/quests/2001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "type": "quest-status", "id": "2001", "attributes": { "state": "COMPLETED" } }
        })))
        .mount(&server)
        .await;

    let peers = peers(&server, 0);
    let untouched = peers.quest_status(&tenant(), 7, 2000).await.expect("status");
    assert_eq!(untouched.state, QuestState::NotStarted);
    let done = peers.quest_status(&tenant(), 7, 2001).await.expect("status");
    assert_eq!((done.quest_id, done.state), (2001, QuestState::Completed));
}

#[tokio::test]
async fn player_count_is_population_size() {
    let server = MockServer::start().await;
    Mock::given(path("/api/worlds/0/channels/1/maps/101000300/characters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "type": "characters", "id": "1", "attributes": {} },
                { "type": "characters", "id": "2", "attributes": {} },
                { "type": "characters", "id": "3", "attributes": {} }
            ]
        })))
        .mount(&server)
        .await;

    let count = peers(&server, 0)
        .player_count(&tenant(), 0, 1, 101_000_300)
        .await;
    assert_eq!(count, Ok(3));
}

#[tokio::test]
async fn party_of_filters_by_member() {
    let server = MockServer::start().await;
    Mock::given(path("/api/parties"))
        .and(query_param("filter[members.id]", "11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [ { "type": "parties", "id": "3", "attributes": {
                "leaderId": 10, "members": [10, 11, 12] } } ]
        })))
        .mount(&server)
        .await;
    Mock::given(path("/api/parties"))
        .and(query_param("filter[members.id]", "99"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let peers = peers(&server, 0);
    let party = peers.party_of(&tenant(), 11).await.expect("party");
    assert_eq!((party.id, party.leader_id), (3, 10));
    assert!(matches!(
        peers.party_of(&tenant(), 99).await,
        Err(PeerError::NotFound { .. })
    ));
}

#[tokio::test]
async fn spawn_posts_a_monster_resource_into_the_instance() {
    let server = MockServer::start().await;
    let instance = Uuid::parse_str("6f1c0a52-3a6e-4c55-9a1c-2b8f0e3d4c11").expect("uuid");
    Mock::given(method("POST"))
        .and(path(format!("/api/worlds/0/channels/1/maps/103000800/instances/{instance}/monsters")))
        .and(header("TENANT_ID", "00000000-0000-0000-0000-000000000001"))
        .and(body_partial_json(json!({
            "data": { "type": "monsters", "attributes": { "monsterId": 9300061, "x": -120, "fh": 4 } }
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let spawn = MonsterSpawn {
        monster_id: 9_300_061,
        x: -120,
        y: 50,
        fh: 4,
    };
    let result = peers(&server, 0)
        .spawn_monster(&tenant(), &MapKey::new(0, 1, 103_000_800, instance), spawn)
        .await;
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn destroying_an_empty_field_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/api/worlds/0/channels/1/maps/103000800/instances/{}/monsters", Uuid::nil())))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = peers(&server, 0)
        .destroy_monsters(&tenant(), &MapKey::new(0, 1, 103_000_800, Uuid::nil()))
        .await;
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn refused_spawn_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let result = peers(&server, 3)
        .spawn_monster(&tenant(), &MapKey::new(0, 1, 103_000_800, Uuid::nil()), MonsterSpawn::default())
        .await;
    assert!(matches!(result, Err(PeerError::Unavailable { .. })));
}
