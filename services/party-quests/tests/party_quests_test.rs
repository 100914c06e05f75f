//! Party-quest runs against recorded events, stub party, guild and monster services,
//! an in-memory catalog and a manual clock.

#![allow(clippy::expect_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use chrono::Duration;
use realm_core::catalog::InMemoryCatalog;
use realm_core::peer::{Guild, MonsterSpawn, Party};
use realm_core::registry::MapKey;
use realm_core::status::{CharacterChange, CharacterStatus, FieldPosition, MonsterChange, MonsterStatus};
use realm_core::{RealmError, Tenant};
use realm_party_quests::events::{
    CharacterCommand, CharacterCommandKind, CommandKind, InstanceBody, PartyQuestCommand, PartyQuestStatus,
    RegisterBody, StatusChange, SystemMessageCommand, SystemMessageKind, Topics, UpdateStageStateBody,
};
use realm_party_quests::handlers::{CharacterStatusHandler, MonsterStatusHandler, PartyQuestCommandHandler};
use realm_party_quests::model::{CharacterEntry, InstanceState};
use realm_party_quests::server::{AppState, build_router};
use realm_party_quests::timers::PartyQuestTimers;
use realm_party_quests::{Definition, PartyQuestProcessor, RegisterRequest};
use realm_runtime::{MessageHandler, Tickable};
use realm_testing::{ManualClock, RecordingEventBus, StubPeers, inbound, other_tenant, test_tenant, test_time};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

const STATUS: &str = "party-quest-status";
const CHARACTER: &str = "character-command";
const REACTOR: &str = "reactor-command";
const MESSAGES: &str = "system-message-command";

const KPQ_EXIT: u32 = 103_000_890;
const KPQ_STAGE_0: u32 = 103_000_800;
const KPQ_STAGE_1: u32 = 103_000_801;
const COUPON: u32 = 4_001_007;

const LPQ_LOBBY: u32 = 221_024_500;
const LPQ_BONUS: u32 = 922_011_000;
const LPQ_REWARD_ROOM: u32 = 922_011_100;

fn topics() -> Topics {
    Topics {
        status: STATUS.to_string(),
        character: CHARACTER.to_string(),
        reactor: REACTOR.to_string(),
        system_message: MESSAGES.to_string(),
    }
}

fn definition(value: serde_json::Value) -> Definition {
    serde_json::from_value(value).expect("definition")
}

/// Party quest, instant start, two stages, no bonus.
fn kpq() -> Definition {
    definition(json!({
        "questId": "kpq",
        "name": "Kerning PQ",
        "duration": 600,
        "registration": { "type": "party", "mode": "instant" },
        "exit": KPQ_EXIT,
        "stages": [
            {
                "index": 0,
                "type": "item_collection",
                "mapIds": [KPQ_STAGE_0],
                "clearConditions": [
                    { "type": "item", "referenceId": COUPON, "operator": ">=", "value": 10 }
                ],
                "rewards": [{ "type": "experience", "amount": 500 }]
            },
            { "index": 1, "type": "monster_killing", "mapIds": [KPQ_STAGE_1], "duration": 120 }
        ],
        "rewards": [{ "type": "experience", "amount": 2000 }]
    }))
}

/// Individual quest grouped by party, timed registration, manual bonus.
fn lpq() -> Definition {
    definition(json!({
        "questId": "lpq",
        "duration": 1800,
        "registration": {
            "type": "individual",
            "mode": "timed",
            "duration": 30,
            "mapId": LPQ_LOBBY,
            "affinity": "party"
        },
        "exit": LPQ_LOBBY,
        "bonus": {
            "mapId": LPQ_BONUS,
            "duration": 60,
            "entry": "manual",
            "completionMapId": LPQ_REWARD_ROOM
        },
        "stages": [
            { "index": 0, "type": "combination_puzzle", "mapIds": [922_010_100], "properties": { "positions": 4 } }
        ]
    }))
}

/// Single stage with an automatic bonus round.
fn opq() -> Definition {
    definition(json!({
        "questId": "opq",
        "registration": { "type": "party", "mode": "instant" },
        "exit": 200_080_101,
        "bonus": { "mapId": 920_011_300, "duration": 45, "entry": "auto" },
        "stages": [{ "index": 0, "type": "custom", "mapIds": [920_010_000] }]
    }))
}

fn stub_peers() -> StubPeers {
    let peers = StubPeers::new();
    peers.add_party(Party {
        id: 7,
        leader_id: 1,
        members: vec![1, 2, 3],
    });
    peers.add_party(Party {
        id: 8,
        leader_id: 10,
        members: vec![10, 11],
    });
    peers.add_party(Party {
        id: 9,
        leader_id: 20,
        members: vec![20],
    });
    peers.add_guild(Guild {
        id: 300,
        members: vec![10, 20],
    });
    peers
}

struct Fixture {
    processor: PartyQuestProcessor,
    bus: RecordingEventBus,
    clock: Arc<ManualClock>,
    peers: StubPeers,
}

async fn setup() -> Fixture {
    let bus = RecordingEventBus::new();
    let clock = Arc::new(ManualClock::new(test_time()));
    let peers = stub_peers();
    let processor = PartyQuestProcessor::new(
        Arc::new(InMemoryCatalog::new()),
        Arc::new(peers.clone()),
        bus.emitter(),
        topics(),
        clock.clone(),
    )
    .expect("processor")
    .with_completion_timeout(120);
    let tenant = test_tenant();
    for def in [kpq(), lpq(), opq()] {
        processor.create_definition(&tenant, def).await.expect("definition");
    }
    Fixture {
        processor,
        bus,
        clock,
        peers,
    }
}

fn party_request(quest_id: &str, party_id: u32) -> RegisterRequest {
    RegisterRequest {
        quest_id: quest_id.to_string(),
        world_id: 0,
        channel_id: 1,
        map_id: 0,
        party_id,
        characters: Vec::new(),
    }
}

fn individual_request(quest_id: &str, character_id: u32) -> RegisterRequest {
    RegisterRequest {
        quest_id: quest_id.to_string(),
        world_id: 0,
        channel_id: 1,
        map_id: LPQ_LOBBY,
        party_id: 0,
        characters: vec![CharacterEntry {
            character_id,
            world_id: 0,
            channel_id: 1,
        }],
    }
}

/// (character, map, field instance) of every warp on the character topic.
fn warps(bus: &RecordingEventBus) -> Vec<(u32, u32, Uuid)> {
    bus.decoded::<CharacterCommand>(CHARACTER)
        .into_iter()
        .filter_map(|c| match c.kind {
            CharacterCommandKind::ChangeMap(body) => Some((c.character_id, body.map_id, body.instance)),
            CharacterCommandKind::AwardExperience(_) => None,
        })
        .collect()
}

fn experience(bus: &RecordingEventBus) -> Vec<(u32, u32)> {
    bus.decoded::<CharacterCommand>(CHARACTER)
        .into_iter()
        .filter_map(|c| match c.kind {
            CharacterCommandKind::AwardExperience(body) => {
                Some((c.character_id, body.distributions.iter().map(|d| d.amount).sum()))
            },
            CharacterCommandKind::ChangeMap(_) => None,
        })
        .collect()
}

fn with_tenant(request: TestRequest, tenant: &Tenant) -> TestRequest {
    [
        ("tenant_id", tenant.id.to_string()),
        ("region", tenant.region.clone()),
        ("major_version", tenant.major_version.to_string()),
        ("minor_version", tenant.minor_version.to_string()),
    ]
    .into_iter()
    .fold(request, |request, (name, value)| {
        request.add_header(
            HeaderName::from_static(name),
            HeaderValue::from_str(&value).expect("header value"),
        )
    })
}

#[tokio::test]
async fn party_run_clears_advances_and_times_out() {
    let f = setup().await;
    let tenant = test_tenant();

    let instance = f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register");
    let id = instance.id();
    assert_eq!(instance.state(), InstanceState::Active);
    assert_eq!(instance.stage_index(), 0);
    assert_eq!(instance.characters().len(), 3);
    assert_eq!(f.bus.event_types(STATUS), vec!["INSTANCE_CREATED", "STARTED"]);
    assert_eq!(
        warps(&f.bus),
        vec![(1, KPQ_STAGE_0, id), (2, KPQ_STAGE_0, id), (3, KPQ_STAGE_0, id)]
    );

    // not enough coupons yet
    f.processor
        .update_stage_state(&tenant, id, &BTreeMap::from([(COUPON, 6)]), &BTreeMap::new())
        .expect("update");
    assert!(!f.processor.attempt_clear(&tenant, id).await.expect("attempt"));
    assert_eq!(f.processor.get(&tenant, id).expect("live").state(), InstanceState::Active);

    f.processor
        .update_stage_state(&tenant, id, &BTreeMap::from([(COUPON, 4)]), &BTreeMap::new())
        .expect("update");
    assert!(f.processor.attempt_clear(&tenant, id).await.expect("attempt"));
    assert_eq!(f.processor.get(&tenant, id).expect("live").state(), InstanceState::Clearing);
    assert_eq!(experience(&f.bus), vec![(1, 500), (2, 500), (3, 500)]);

    f.bus.clear();
    let advanced = f.processor.advance(&tenant, id).await.expect("advance");
    assert_eq!(advanced.state(), InstanceState::Active);
    assert_eq!(advanced.stage_index(), 1);
    assert!(advanced.stage_state().item_counts.is_empty());
    assert_eq!(f.bus.event_types(STATUS), vec!["STAGE_ADVANCED"]);
    assert_eq!(
        warps(&f.bus),
        vec![(1, KPQ_STAGE_1, id), (2, KPQ_STAGE_1, id), (3, KPQ_STAGE_1, id)]
    );

    // stage 1 has two minutes, the run ten; jump past both
    f.bus.clear();
    f.clock.advance(Duration::seconds(601));
    assert_eq!(f.processor.expire(&tenant, f.processor.now()).await, 1);

    assert!(f.processor.get(&tenant, id).is_err_and(|e| e.is_not_found()));
    assert_eq!(f.bus.event_types(STATUS), vec!["FAILED", "INSTANCE_DESTROYED"]);
    let statuses: Vec<PartyQuestStatus> = f.bus.decoded(STATUS);
    assert_eq!(
        statuses[0].change,
        StatusChange::Failed {
            reason: "time_expired".to_string()
        }
    );
    assert_eq!(f.bus.event_types(REACTOR), vec!["DESTROY_IN_FIELD"]);
    assert_eq!(
        warps(&f.bus),
        vec![(1, KPQ_EXIT, Uuid::nil()), (2, KPQ_EXIT, Uuid::nil()), (3, KPQ_EXIT, Uuid::nil())]
    );
}

#[tokio::test]
async fn stage_timer_advances_then_last_advance_completes() {
    let f = setup().await;
    let tenant = test_tenant();
    let id = f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register").id();

    f.processor.force_complete_stage(&tenant, id).await.expect("force");
    assert_eq!(f.processor.get(&tenant, id).expect("live").stage_index(), 1);

    f.bus.clear();
    f.clock.advance(Duration::seconds(120));
    assert_eq!(f.processor.expire(&tenant, f.processor.now()).await, 1);

    // past the last stage: completed, paid, and with no bonus, destroyed
    assert_eq!(
        f.bus.event_types(STATUS),
        vec!["COMPLETED", "INSTANCE_DESTROYED"]
    );
    assert_eq!(experience(&f.bus), vec![(1, 2000), (2, 2000), (3, 2000)]);
    assert_eq!(f.bus.event_types(REACTOR), vec!["DESTROY_IN_FIELD"]);
    assert!(f.processor.instances(&tenant).is_empty());
}

#[tokio::test]
async fn character_cannot_run_two_instances() {
    let f = setup().await;
    let tenant = test_tenant();
    f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register");
    f.bus.clear();

    let again = f.processor.register(&tenant, party_request("opq", 7)).await;
    assert!(matches!(again, Err(RealmError::Conflict(_))));
    assert_eq!(f.processor.instances(&tenant).len(), 1);
    assert!(f.bus.is_empty());

    // tenants are isolated
    let other = other_tenant();
    f.processor.create_definition(&other, kpq()).await.expect("definition");
    f.processor.register(&other, party_request("kpq", 7)).await.expect("other tenant");
}

#[tokio::test]
async fn registration_needs_characters_and_a_known_quest() {
    let f = setup().await;
    let tenant = test_tenant();
    let empty = f.processor.register(&tenant, party_request("kpq", 0)).await;
    assert!(matches!(empty, Err(RealmError::Validation(_))));

    let unknown = f.processor.register(&tenant, party_request("hpq", 7)).await;
    assert!(unknown.is_err_and(|e| e.is_not_found()));

    f.peers.make_unavailable(realm_core::peer::names::PARTIES);
    let outage = f.processor.register(&tenant, party_request("kpq", 7)).await;
    assert!(matches!(outage, Err(RealmError::PeerUnavailable { .. })));
    assert!(f.bus.is_empty());
}

#[tokio::test]
async fn individuals_group_by_affinity_until_registration_closes() {
    let f = setup().await;
    let tenant = test_tenant();

    let first = f.processor.register(&tenant, individual_request("lpq", 10)).await.expect("first");
    assert_eq!(first.state(), InstanceState::Registering);
    assert_eq!(first.affinity_id(), 8);
    let joined = f.processor.register(&tenant, individual_request("lpq", 11)).await.expect("join");
    assert_eq!(joined.id(), first.id());
    assert_eq!(joined.characters().len(), 2);

    // same character again is a no-op
    let repeat = f.processor.register(&tenant, individual_request("lpq", 11)).await.expect("repeat");
    assert_eq!(repeat.characters().len(), 2);

    // different party, different instance
    let separate = f.processor.register(&tenant, individual_request("lpq", 20)).await.expect("separate");
    assert_ne!(separate.id(), first.id());

    // off the lobby map
    let mut stray = individual_request("lpq", 1);
    stray.map_id = 100_000_000;
    assert!(matches!(f.processor.register(&tenant, stray).await, Err(RealmError::Validation(_))));

    assert_eq!(
        f.bus.event_types(STATUS),
        vec![
            "INSTANCE_CREATED",
            "REGISTRATION_OPENED",
            "CHARACTER_REGISTERED",
            "INSTANCE_CREATED",
            "REGISTRATION_OPENED"
        ]
    );

    // registering characters cannot leave
    let leave = f.processor.leave(&tenant, 10, "voluntary").await;
    assert!(matches!(leave, Err(RealmError::InvalidState { .. })));

    f.clock.advance(Duration::seconds(30));
    let timers = PartyQuestTimers::new(f.processor.clone());
    timers.tick(f.processor.now()).await;
    let started = f.processor.get(&tenant, first.id()).expect("live");
    assert_eq!(started.state(), InstanceState::Active);
    let combination = &started.stage_state().combination;
    assert_eq!(combination.len(), 4);
    assert!(combination.iter().all(|&d| d < 3));
}

#[tokio::test]
async fn manual_bonus_waits_for_entry_then_expires() {
    let f = setup().await;
    let tenant = test_tenant();
    let id = f.processor.register(&tenant, individual_request("lpq", 10)).await.expect("register").id();
    f.processor.start(&tenant, id).await.expect("start");
    f.processor.force_complete_stage(&tenant, id).await.expect("complete");

    let completed = f.processor.get(&tenant, id).expect("live");
    assert_eq!(completed.state(), InstanceState::Completed);
    assert_eq!(f.processor.timer_for(&tenant, 10).await.expect("timer"), 0);
    assert!(warps(&f.bus).contains(&(10, LPQ_REWARD_ROOM, id)));

    f.clock.advance(Duration::seconds(20));
    let bonus = f.processor.enter_bonus(&tenant, id).await.expect("bonus");
    assert_eq!(bonus.state(), InstanceState::Bonus);
    assert_eq!(f.processor.timer_for(&tenant, 10).await.expect("timer"), 60);
    assert!(warps(&f.bus).contains(&(10, LPQ_BONUS, id)));

    f.clock.advance(Duration::seconds(45));
    assert_eq!(f.processor.timer_for(&tenant, 10).await.expect("timer"), 15);

    f.bus.clear();
    f.clock.advance(Duration::seconds(15));
    assert_eq!(f.processor.expire(&tenant, f.processor.now()).await, 1);
    let statuses: Vec<PartyQuestStatus> = f.bus.decoded(STATUS);
    assert_eq!(
        statuses.last().map(|s| s.change.clone()),
        Some(StatusChange::InstanceDestroyed {
            reason: "bonus_expired".to_string()
        })
    );
    assert_eq!(f.bus.decoded::<serde_json::Value>(REACTOR)[0]["mapId"], LPQ_BONUS);
    assert_eq!(warps(&f.bus), vec![(10, LPQ_LOBBY, Uuid::nil())]);
}

#[tokio::test]
async fn unclaimed_manual_bonus_expires_after_completion_timeout() {
    let f = setup().await;
    let tenant = test_tenant();
    let id = f.processor.register(&tenant, individual_request("lpq", 10)).await.expect("register").id();
    f.processor.start(&tenant, id).await.expect("start");
    f.processor.force_complete_stage(&tenant, id).await.expect("complete");

    f.clock.advance(Duration::seconds(119));
    assert_eq!(f.processor.expire(&tenant, f.processor.now()).await, 0);
    f.clock.advance(Duration::seconds(1));
    assert_eq!(f.processor.expire(&tenant, f.processor.now()).await, 1);
    let statuses: Vec<PartyQuestStatus> = f.bus.decoded(STATUS);
    assert_eq!(
        statuses.last().map(|s| s.change.clone()),
        Some(StatusChange::InstanceDestroyed {
            reason: "completion_expired".to_string()
        })
    );
}

#[tokio::test]
async fn automatic_bonus_follows_completion() {
    let f = setup().await;
    let tenant = test_tenant();
    let id = f.processor.register(&tenant, party_request("opq", 9)).await.expect("register").id();
    let bonus = f.processor.advance(&tenant, id).await.expect("advance");
    assert_eq!(bonus.state(), InstanceState::Bonus);
    assert_eq!(
        f.bus.event_types(STATUS),
        vec!["INSTANCE_CREATED", "STARTED", "COMPLETED", "BONUS_ENTERED"]
    );

    let enter = f.processor.enter_bonus(&tenant, id).await;
    assert!(matches!(enter, Err(RealmError::InvalidState { .. })));
    let forfeit = f.processor.forfeit(&tenant, id).await;
    assert!(matches!(forfeit, Err(RealmError::InvalidState { .. })));
}

#[tokio::test]
async fn last_one_out_destroys_the_instance() {
    let f = setup().await;
    let tenant = test_tenant();
    let id = f.processor.register(&tenant, party_request("kpq", 8)).await.expect("register").id();
    f.bus.clear();

    let remaining = f.processor.leave(&tenant, 10, "voluntary").await.expect("leave");
    assert_eq!(remaining.characters().len(), 1);
    assert!(f.processor.by_character(&tenant, 10).is_err_and(|e| e.is_not_found()));
    assert_eq!(warps(&f.bus), vec![(10, KPQ_EXIT, Uuid::nil())]);

    f.processor.leave(&tenant, 11, "voluntary").await.expect("leave");
    assert!(f.processor.get(&tenant, id).is_err_and(|e| e.is_not_found()));
    assert_eq!(
        f.bus.event_types(STATUS),
        vec!["CHARACTER_LEFT", "CHARACTER_LEFT", "INSTANCE_DESTROYED"]
    );
    let statuses: Vec<PartyQuestStatus> = f.bus.decoded(STATUS);
    assert_eq!(
        statuses[2].change,
        StatusChange::InstanceDestroyed {
            reason: "empty".to_string()
        }
    );
}

fn count(bus: &RecordingEventBus, event_type: &str) -> usize {
    bus.event_types(STATUS).iter().filter(|t| *t == event_type).count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_destroys_announce_once() {
    let f = setup().await;
    let tenant = test_tenant();
    let rounds = 25;
    for _ in 0..rounds {
        let id = f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register").id();
        let destroys: Vec<_> = (0..8)
            .map(|_| {
                let processor = f.processor.clone();
                let tenant = tenant.clone();
                tokio::spawn(async move { processor.destroy(&tenant, id, "forfeit").await })
            })
            .collect();
        let mut destroyed = 0;
        for destroy in destroys {
            match destroy.await.expect("join") {
                Ok(_) => destroyed += 1,
                Err(e) => assert!(e.is_not_found(), "unexpected error {e}"),
            }
        }
        assert_eq!(destroyed, 1);
    }
    assert_eq!(count(&f.bus, "INSTANCE_DESTROYED"), rounds);
    let exits = warps(&f.bus).into_iter().filter(|(_, map, _)| *map == KPQ_EXIT).count();
    assert_eq!(exits, rounds * 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn destroy_racing_the_global_timer_ends_the_run_once() {
    let f = setup().await;
    let tenant = test_tenant();
    let id = f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register").id();
    f.clock.advance(Duration::seconds(601));
    let now = f.processor.now();

    let expiries: Vec<_> = (0..2)
        .map(|_| {
            let processor = f.processor.clone();
            let tenant = tenant.clone();
            tokio::spawn(async move { processor.expire(&tenant, now).await })
        })
        .collect();
    let destroy = {
        let processor = f.processor.clone();
        let tenant = tenant.clone();
        tokio::spawn(async move { processor.destroy(&tenant, id, "forfeit").await })
    };
    let mut acted = 0;
    for expiry in expiries {
        acted += expiry.await.expect("join");
    }
    if destroy.await.expect("join").is_ok() {
        acted += 1;
    }

    assert_eq!(acted, 1);
    assert!(f.processor.get(&tenant, id).is_err_and(|e| e.is_not_found()));
    assert_eq!(count(&f.bus, "INSTANCE_DESTROYED"), 1);
    assert!(count(&f.bus, "FAILED") <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_leaves_warp_once() {
    let f = setup().await;
    let tenant = test_tenant();
    f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register");
    f.bus.clear();

    let leaves: Vec<_> = (0..4)
        .map(|_| {
            let processor = f.processor.clone();
            let tenant = tenant.clone();
            tokio::spawn(async move { processor.leave(&tenant, 2, "disconnected").await })
        })
        .collect();
    let mut left = 0;
    for leave in leaves {
        match leave.await.expect("join") {
            Ok(remaining) => {
                left += 1;
                assert_eq!(remaining.characters().len(), 2);
            },
            Err(e) => assert!(e.is_not_found(), "unexpected error {e}"),
        }
    }
    assert_eq!(left, 1);
    assert_eq!(warps(&f.bus), vec![(2, KPQ_EXIT, Uuid::nil())]);
    assert_eq!(f.bus.event_types(STATUS), vec!["CHARACTER_LEFT"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_sweeps_advance_a_stage_once() {
    let f = setup().await;
    let tenant = test_tenant();
    let timed_stage = |index: u32, map_id: u32| json!({ "index": index, "type": "custom", "mapIds": [map_id], "duration": 60 });
    f.processor
        .create_definition(
            &tenant,
            definition(json!({
                "questId": "gpq",
                "registration": { "type": "party", "mode": "instant" },
                "exit": KPQ_EXIT,
                "stages": [timed_stage(0, 990_000_100), timed_stage(1, 990_000_200), timed_stage(2, 990_000_300)]
            })),
        )
        .await
        .expect("definition");
    let id = f.processor.register(&tenant, party_request("gpq", 7)).await.expect("register").id();

    f.clock.advance(Duration::seconds(61));
    let now = f.processor.now();
    let sweeps: Vec<_> = (0..4)
        .map(|_| {
            let processor = f.processor.clone();
            let tenant = tenant.clone();
            tokio::spawn(async move { processor.expire(&tenant, now).await })
        })
        .collect();
    let mut fired = 0;
    for sweep in sweeps {
        fired += sweep.await.expect("join");
    }

    assert_eq!(fired, 1);
    assert_eq!(f.processor.get(&tenant, id).expect("live").stage_index(), 1);
    assert_eq!(count(&f.bus, "STAGE_ADVANCED"), 1);
}

const HPQ_EXIT: u32 = 910_010_300;
const HPQ_HILL: u32 = 910_010_000;
const MOON_BUNNY: u32 = 9_300_061;

/// Escort stage: keep the Moon Bunny alive while it makes rice cakes.
fn hpq() -> Definition {
    definition(json!({
        "questId": "hpq",
        "registration": { "type": "party", "mode": "instant" },
        "exit": HPQ_EXIT,
        "stages": [
            {
                "index": 0,
                "type": "custom",
                "mapIds": [HPQ_HILL],
                "clearActions": ["destroy_monsters"],
                "properties": { "friendlyMonster": {
                    "monsterId": MOON_BUNNY, "x": -187, "y": -186, "fh": 4,
                    "spawnMessage": "Protect the Moon Bunny!",
                    "onDamaged": { "hitInterval": 2, "message": "The Moon Bunny is hurt!" },
                    "onKilled": { "message": "The Moon Bunny has fallen.", "action": "fail" },
                    "onDrop": { "messageTemplate": "Rice cakes: {count}" }
                } }
            },
            { "index": 1, "type": "custom", "mapIds": [910_010_100] }
        ]
    }))
}

/// Text of every system message, in publish order.
fn messages(bus: &RecordingEventBus) -> Vec<String> {
    bus.decoded::<SystemMessageCommand>(MESSAGES)
        .into_iter()
        .map(|m| match m.kind {
            SystemMessageKind::SendMessage(body) => body.message,
        })
        .collect()
}

#[tokio::test]
async fn escort_is_spawned_announced_and_cleared() {
    let f = setup().await;
    let tenant = test_tenant();
    f.processor.create_definition(&tenant, hpq()).await.expect("definition");

    let id = f.processor.register(&tenant, party_request("hpq", 7)).await.expect("register").id();
    let field = MapKey::new(0, 1, HPQ_HILL, id);
    assert_eq!(
        f.peers.spawned_monsters(),
        vec![(
            field,
            MonsterSpawn {
                monster_id: MOON_BUNNY,
                x: -187,
                y: -186,
                fh: 4
            }
        )]
    );
    assert_eq!(messages(&f.bus), vec!["Protect the Moon Bunny!"; 3]);
    assert_eq!(f.processor.by_field_instance(&tenant, id).expect("owner").id(), id);
    assert!(f.processor.by_field_instance(&tenant, Uuid::nil()).is_err_and(|e| e.is_not_found()));

    // every second hit is announced
    f.bus.clear();
    assert_eq!(f.processor.on_friendly_damaged(&tenant, &field, MOON_BUNNY).await.expect("hit"), 1);
    assert!(messages(&f.bus).is_empty());
    assert_eq!(f.processor.on_friendly_damaged(&tenant, &field, MOON_BUNNY).await.expect("hit"), 2);
    assert_eq!(messages(&f.bus), vec!["The Moon Bunny is hurt!"; 3]);

    // other monsters and other fields are not the escort
    let hostile = f.processor.on_friendly_damaged(&tenant, &field, 9_300_062).await;
    assert!(hostile.is_err_and(|e| e.is_not_found()));
    let elsewhere = MapKey::new(0, 1, 910_010_100, id);
    assert!(f.processor.on_friendly_drop(&tenant, &elsewhere, MOON_BUNNY, 1).await.is_err());

    f.bus.clear();
    assert_eq!(f.processor.on_friendly_drop(&tenant, &field, MOON_BUNNY, 3).await.expect("drop"), 3);
    assert_eq!(f.processor.on_friendly_drop(&tenant, &field, MOON_BUNNY, 2).await.expect("drop"), 5);
    assert_eq!(messages(&f.bus)[3..], vec!["Rice cakes: 5".to_string(); 3]);

    let advanced = f.processor.force_complete_stage(&tenant, id).await.expect("force");
    assert_eq!(advanced.stage_index(), 1);
    assert_eq!(f.peers.cleared_fields(), vec![field]);
    assert_eq!(f.peers.spawned_monsters().len(), 1);
    // the next stage has no escort
    assert!(f.processor.on_friendly_damaged(&tenant, &field, MOON_BUNNY).await.is_err());
}

#[tokio::test]
async fn losing_the_escort_fails_the_run() {
    let f = setup().await;
    let tenant = test_tenant();
    f.processor.create_definition(&tenant, hpq()).await.expect("definition");
    let id = f.processor.register(&tenant, party_request("hpq", 7)).await.expect("register").id();
    let handler = MonsterStatusHandler::new(f.processor.clone());
    let status = |instance, monster_id, change| MonsterStatus {
        world_id: 0,
        channel_id: 1,
        map_id: HPQ_HILL,
        instance,
        unique_id: 40,
        monster_id,
        change,
    };

    // deaths outside the run or of other monsters change nothing
    let shared = status(Uuid::nil(), MOON_BUNNY, MonsterChange::Killed);
    handler.handle(inbound(&tenant, "KILLED", 40_u32, &shared)).await.expect("ignored");
    let hostile = status(id, 9_300_062, MonsterChange::Killed);
    handler.handle(inbound(&tenant, "KILLED", 40_u32, &hostile)).await.expect("ignored");
    assert_eq!(f.processor.get(&tenant, id).expect("live").state(), InstanceState::Active);

    f.bus.clear();
    let killed = status(id, MOON_BUNNY, MonsterChange::Killed);
    handler.handle(inbound(&tenant, "KILLED", 40_u32, &killed)).await.expect("killed");

    assert!(f.processor.get(&tenant, id).is_err_and(|e| e.is_not_found()));
    assert_eq!(messages(&f.bus), vec!["The Moon Bunny has fallen."; 3]);
    assert_eq!(f.bus.event_types(STATUS), vec!["FAILED", "INSTANCE_DESTROYED"]);
    let statuses: Vec<PartyQuestStatus> = f.bus.decoded(STATUS);
    assert_eq!(
        statuses[0].change,
        StatusChange::Failed {
            reason: "friendly_monster_killed".to_string()
        }
    );
    assert_eq!(warps(&f.bus), vec![(1, HPQ_EXIT, Uuid::nil()), (2, HPQ_EXIT, Uuid::nil()), (3, HPQ_EXIT, Uuid::nil())]);

    // a late event for the gone run is dropped
    handler.handle(inbound(&tenant, "KILLED", 40_u32, &killed)).await.expect("ignored");
}

#[tokio::test]
async fn stage_timer_reports_remaining_time() {
    let f = setup().await;
    let tenant = test_tenant();
    let id = f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register").id();

    // stage 0 has no limit of its own; the run does
    f.clock.advance(Duration::seconds(100));
    assert_eq!(f.processor.timer_for(&tenant, 2).await.expect("timer"), 500);

    f.processor.force_complete_stage(&tenant, id).await.expect("force");
    f.clock.advance(Duration::seconds(20));
    assert_eq!(f.processor.timer_for(&tenant, 2).await.expect("timer"), 100);

    assert!(f.processor.timer_for(&tenant, 99).await.is_err_and(|e| e.is_not_found()));
}

#[tokio::test]
async fn commands_and_logouts_drive_instances() {
    let f = setup().await;
    let tenant = test_tenant();
    let commands = PartyQuestCommandHandler::new(f.processor.clone());
    let command = |character_id, kind| PartyQuestCommand {
        world_id: 0,
        character_id,
        kind,
    };

    let register = command(
        1,
        CommandKind::Register(RegisterBody {
            quest_id: "kpq".to_string(),
            party_id: 7,
            channel_id: 1,
            map_id: 0,
        }),
    );
    commands.handle(inbound(&tenant, "REGISTER", 1_u32, &register)).await.expect("register");
    let id = f.processor.by_character(&tenant, 3).expect("registered").id();

    let update = command(
        1,
        CommandKind::UpdateStageState(UpdateStageStateBody {
            instance_id: id,
            item_counts: BTreeMap::from([(COUPON, 10)]),
            monster_kills: BTreeMap::new(),
        }),
    );
    commands.handle(inbound(&tenant, "UPDATE_STAGE_STATE", id, &update)).await.expect("update");
    let attempt = command(1, CommandKind::StageClearAttempt(InstanceBody { instance_id: id }));
    commands.handle(inbound(&tenant, "STAGE_CLEAR_ATTEMPT", id, &attempt)).await.expect("attempt");
    assert_eq!(f.processor.get(&tenant, id).expect("live").state(), InstanceState::Clearing);

    // unknown instances are ignored
    let stray = command(1, CommandKind::StageAdvance(InstanceBody { instance_id: Uuid::new_v4() }));
    commands.handle(inbound(&tenant, "STAGE_ADVANCE", 1_u32, &stray)).await.expect("ignored");

    let statuses = CharacterStatusHandler::new(f.processor.clone());
    let logout = CharacterStatus {
        world_id: 0,
        character_id: 2,
        change: CharacterChange::Logout(FieldPosition::default()),
    };
    statuses.handle(inbound(&tenant, "LOGOUT", 2_u32, &logout)).await.expect("logout");
    assert_eq!(f.processor.get(&tenant, id).expect("live").characters().len(), 2);
    let left: Vec<PartyQuestStatus> = f.bus.decoded(STATUS);
    assert!(left.iter().any(|s| s.change
        == StatusChange::CharacterLeft {
            character_id: 2,
            channel_id: 1,
            reason: "disconnected".to_string()
        }));

    let forfeit = command(1, CommandKind::Forfeit(InstanceBody { instance_id: id }));
    commands.handle(inbound(&tenant, "FORFEIT", id, &forfeit)).await.expect("forfeit");
    assert!(f.processor.instances(&tenant).is_empty());
}

#[tokio::test]
async fn broadcast_reaches_every_participant() {
    let f = setup().await;
    let tenant = test_tenant();
    let id = f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register").id();
    let sent = f.processor.broadcast(&tenant, id, "PINK_TEXT", "Collect the coupons").await.expect("broadcast");
    assert_eq!(sent, 3);
    assert_eq!(f.bus.event_types(MESSAGES), vec!["SEND_MESSAGE"; 3]);
}

#[tokio::test]
async fn shutdown_destroys_everything() {
    let f = setup().await;
    let tenant = test_tenant();
    f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register");
    f.processor.register(&tenant, individual_request("lpq", 10)).await.expect("register");
    assert_eq!(f.processor.shutdown().await, 2);
    assert!(f.processor.instances(&tenant).is_empty());
}

#[tokio::test]
async fn rest_serves_instances_timers_and_definitions() {
    let f = setup().await;
    let tenant = test_tenant();
    let server = TestServer::new(build_router(AppState::new(f.processor.clone()))).expect("server");
    let instance = f.processor.register(&tenant, party_request("kpq", 7)).await.expect("register");

    let one = with_tenant(server.get(&format!("/party-quests/instances/{}", instance.id())), &tenant).await;
    one.assert_status_ok();
    let body: serde_json::Value = one.json();
    assert_eq!(body["data"]["type"], "instances");
    assert_eq!(body["data"]["attributes"]["state"], "active");
    assert_eq!(body["data"]["attributes"]["questId"], "kpq");

    let filtered = with_tenant(server.get("/party-quests/instances?filter[questId]=lpq"), &tenant).await;
    let body: serde_json::Value = filtered.json();
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));

    let mine = with_tenant(server.get("/characters/3/party-quest"), &tenant).await;
    mine.assert_status_ok();
    let body: serde_json::Value = mine.json();
    assert_eq!(body["data"]["id"], instance.id().to_string());

    f.clock.advance(Duration::seconds(60));
    let timer = with_tenant(server.get("/characters/3/party-quest/timer"), &tenant).await;
    timer.assert_status_ok();
    let body: serde_json::Value = timer.json();
    assert_eq!(body["data"]["attributes"]["duration"], 540);

    with_tenant(server.get("/characters/99/party-quest"), &tenant)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let created = with_tenant(server.post("/party-quests/definitions"), &tenant)
        .json(&json!({
            "data": {
                "type": "definitions",
                "attributes": {
                    "questId": "hpq",
                    "registration": { "type": "party", "mode": "instant" },
                    "exit": 100_000_200,
                    "stages": [{ "index": 0, "type": "custom", "mapIds": [910_010_000] }]
                }
            }
        }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = created.json();
    let definition_id = body["data"]["id"].as_str().expect("id").to_string();

    with_tenant(server.get(&format!("/party-quests/definitions/{definition_id}")), &tenant)
        .await
        .assert_status_ok();
    let all = with_tenant(server.get("/party-quests/definitions"), &tenant).await;
    let body: serde_json::Value = all.json();
    assert_eq!(body["data"].as_array().map(Vec::len), Some(4));

    let duplicate = with_tenant(server.post("/party-quests/definitions"), &tenant)
        .json(&json!({
            "data": {
                "type": "definitions",
                "attributes": {
                    "questId": "kpq",
                    "registration": { "type": "party", "mode": "instant" },
                    "exit": 0,
                    "stages": []
                }
            }
        }))
        .await;
    duplicate.assert_status(StatusCode::CONFLICT);
}
