//! Rates service behavior against recorded events, stub peers and a manual
//! clock.

#![allow(clippy::expect_used)]

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use chrono::Duration;
use realm_core::Tenant;
use realm_core::environment::Clock;
use realm_core::peer::{Asset, BonusExpTier, CashItemData, EquipmentData, StatChange, names};
use realm_core::status::{BuffBody, BuffChange, BuffStatus, CharacterChange, CharacterStatus, FieldPosition};
use realm_rates::events::{RateChanged, Topics, WorldRateChanged};
use realm_rates::expiry::CouponExpiry;
use realm_rates::handlers::{BuffStatusHandler, CharacterStatusHandler, WorldRateHandler};
use realm_rates::server::{AppState, build_router};
use realm_rates::{RateType, RatesProcessor};
use realm_runtime::{MessageHandler, Tickable};
use realm_testing::{ManualClock, RecordingEventBus, StubPeers, inbound, other_tenant, test_tenant, test_time};
use std::sync::Arc;

const STATUS: &str = "rate-status";
const CHARACTER: u32 = 12_345;
const EXP_COUPON: u32 = 5_211_000;
const EXP_RING: u32 = 1_112_127;

fn topics() -> Topics {
    Topics {
        status: STATUS.to_string(),
    }
}

fn stub_peers() -> StubPeers {
    let peers = StubPeers::new();
    peers.set_equipment(
        CHARACTER,
        vec![Asset {
            id: 1,
            slot: -12,
            template_id: EXP_RING,
            equipped_since: Some(test_time() - Duration::hours(2)),
            ..Asset::default()
        }],
    );
    peers.add_equipment_data(EquipmentData {
        id: EXP_RING,
        bonus_exp: vec![
            BonusExpTier { inc_exp_r: 10, term_start_hours: 0 },
            BonusExpTier { inc_exp_r: 20, term_start_hours: 1 },
            BonusExpTier { inc_exp_r: 30, term_start_hours: 24 },
        ],
    });
    peers.set_cash(
        CHARACTER,
        vec![Asset {
            id: 2,
            slot: 1,
            template_id: EXP_COUPON,
            created_at: Some(test_time() - Duration::hours(1)),
            ..Asset::default()
        }],
    );
    peers.add_cash_item(CashItemData {
        id: EXP_COUPON,
        rate: 2.0,
        time_minutes: 240,
        time_windows: Vec::new(),
    });
    peers
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

struct Fixture {
    processor: RatesProcessor,
    bus: RecordingEventBus,
    peers: StubPeers,
    clock: Arc<ManualClock>,
}

fn setup() -> Fixture {
    let bus = RecordingEventBus::new();
    let peers = stub_peers();
    let clock = Arc::new(ManualClock::new(test_time()));
    let processor = RatesProcessor::new(
        Arc::new(peers.clone()),
        bus.emitter(),
        topics(),
        clock.clone(),
    );
    Fixture {
        processor,
        bus,
        peers,
        clock,
    }
}

fn assert_rate(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

#[tokio::test]
async fn lazy_init_multiplies_tracked_items() {
    let f = setup();
    let tenant = test_tenant();

    let view = f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");

    // ring at tier 2 (1.2) × exp coupon (2.0)
    assert_rate(view.rate(RateType::Exp), 2.4);
    assert_rate(view.rate(RateType::Meso), 1.0);

    let inventory_calls = f.peers.calls(names::INVENTORY);
    let again = f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");
    assert_eq!(again, view);
    assert_eq!(f.peers.calls(names::INVENTORY), inventory_calls);
    assert!(f.processor.tracker().is_complete(&tenant, CHARACTER));
}

#[tokio::test]
async fn bonus_exp_climbs_tiers_with_time() {
    let f = setup();
    let tenant = test_tenant();
    f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");

    f.clock.advance(Duration::hours(22));
    let view = f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");

    // 24h equipped: ring at 1.3, coupon long expired
    assert_rate(view.rate(RateType::Exp), 1.3);
    let model = f.processor.registry().get(&tenant, &CHARACTER).expect("model");
    assert!(!model.items().contains_key(&EXP_COUPON));
}

#[tokio::test]
async fn world_rate_reaches_live_and_new_models() {
    let f = setup();
    let tenant = test_tenant();
    f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");

    let updated = f
        .processor
        .update_world_rate(&tenant, 0, RateType::Exp, 2.0)
        .await
        .expect("world rate");

    assert_eq!(updated, 1);
    let events: Vec<RateChanged> = f.bus.decoded(STATUS);
    assert_eq!(events.len(), 1);
    assert_rate(events[0].rates[&RateType::Exp], 4.8);

    let newcomer = f.processor.get(&tenant, 0, 2, 99).await.expect("rates");
    assert_rate(newcomer.rate(RateType::Exp), 2.0);
    let elsewhere = f.processor.get(&tenant, 1, 1, 98).await.expect("rates");
    assert_rate(elsewhere.rate(RateType::Exp), 1.0);
    let other = f.processor.get(&other_tenant(), 0, 1, 97).await.expect("rates");
    assert_rate(other.rate(RateType::Exp), 1.0);
}

#[tokio::test]
async fn world_rate_handler_applies_operator_change() {
    let f = setup();
    let tenant = test_tenant();
    f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");
    let handler = WorldRateHandler::new(f.processor.clone());

    let change = WorldRateChanged {
        world_id: 0,
        rate_type: RateType::Meso,
        multiplier: 3.0,
    };
    handler
        .handle(inbound(&tenant, "WORLD_RATE_CHANGED", 0u32, &change))
        .await
        .expect("handled");

    let view = f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");
    assert_rate(view.rate(RateType::Meso), 3.0);
}

#[tokio::test]
async fn expiry_sweep_drops_coupon_and_publishes() {
    let f = setup();
    let tenant = test_tenant();
    f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");
    f.bus.clear();

    f.clock.advance(Duration::hours(3) + Duration::minutes(1));
    CouponExpiry::new(f.processor.clone())
        .tick(f.clock.now())
        .await;

    let events: Vec<RateChanged> = f.bus.decoded(STATUS);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].character_id, CHARACTER);
    assert_rate(events[0].rates[&RateType::Exp], 1.2);
    let model = f.processor.registry().get(&tenant, &CHARACTER).expect("model");
    assert_eq!(model.items().len(), 1);
}

#[tokio::test]
async fn buff_handler_adds_and_retracts_factor() {
    let f = setup();
    let tenant = test_tenant();
    f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");
    let handler = BuffStatusHandler::new(f.processor.clone());
    let body = BuffBody {
        source_id: 2_311_003,
        changes: vec![StatChange { kind: "HOLY_SYMBOL".to_string(), amount: 50 }],
        expires_at: None,
    };

    let applied = BuffStatus {
        world_id: 0,
        character_id: CHARACTER,
        change: BuffChange::Applied(body.clone()),
    };
    handler
        .handle(inbound(&tenant, "APPLIED", CHARACTER, &applied))
        .await
        .expect("applied");
    let view = f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");
    assert_rate(view.rate(RateType::Exp), 3.6);

    let expired = BuffStatus {
        world_id: 0,
        character_id: CHARACTER,
        change: BuffChange::Expired(body),
    };
    handler
        .handle(inbound(&tenant, "EXPIRED", CHARACTER, &expired))
        .await
        .expect("expired");
    let view = f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");
    assert_rate(view.rate(RateType::Exp), 2.4);
    assert_eq!(f.bus.decoded::<RateChanged>(STATUS).len(), 2);
}

#[tokio::test]
async fn buff_for_unknown_character_is_ignored() {
    let f = setup();
    let handler = BuffStatusHandler::new(f.processor.clone());
    let applied = BuffStatus {
        world_id: 0,
        character_id: 55,
        change: BuffChange::Applied(BuffBody {
            source_id: 2_311_003,
            changes: vec![StatChange { kind: "HOLY_SYMBOL".to_string(), amount: 50 }],
            expires_at: None,
        }),
    };

    handler
        .handle(inbound(&test_tenant(), "APPLIED", 55u32, &applied))
        .await
        .expect("ignored");

    assert!(f.bus.is_empty());
    assert!(!f.processor.registry().contains(&test_tenant(), &55));
}

#[tokio::test]
async fn paused_bonus_item_contributes_nothing() {
    let f = setup();
    let tenant = test_tenant();
    f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");

    f.processor
        .update_equipped_since(&tenant, CHARACTER, EXP_RING, None)
        .await
        .expect("paused");

    let factors = f
        .processor
        .item_factors(&tenant, 0, 1, CHARACTER)
        .await
        .expect("factors");
    assert_eq!(factors.len(), 1);
    assert_eq!(factors[0].source, format!("item:{EXP_COUPON}"));
}

#[tokio::test]
async fn logout_forgets_character() {
    let f = setup();
    let tenant = test_tenant();
    f.processor.get(&tenant, 0, 1, CHARACTER).await.expect("rates");
    let handler = CharacterStatusHandler::new(f.processor.clone());

    let logout = CharacterStatus {
        world_id: 0,
        character_id: CHARACTER,
        change: CharacterChange::Logout(FieldPosition { channel_id: 1, map_id: 100_000_000 }),
    };
    handler
        .handle(inbound(&tenant, "LOGOUT", CHARACTER, &logout))
        .await
        .expect("logout");

    assert!(!f.processor.registry().contains(&tenant, &CHARACTER));
    assert!(!f.processor.tracker().is_started(&tenant, CHARACTER));
}

#[tokio::test]
async fn rest_serves_rates_and_items() {
    let f = setup();
    let server = TestServer::new(build_router(AppState::new(f.processor.clone()))).expect("server");
    let tenant = test_tenant();
    let base = format!("/worlds/0/channels/1/characters/{CHARACTER}/rates");

    let response = with_tenant(server.get(&base), &tenant).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["type"], "rates");
    assert_eq!(body["data"]["id"], CHARACTER.to_string());
    let exp = body["data"]["attributes"]["rates"]["exp"].as_f64().expect("exp");
    assert_rate(exp, 2.4);

    let items = with_tenant(server.get(&format!("{base}/items")), &tenant).await;
    items.assert_status_ok();
    let body: serde_json::Value = items.json();
    let ids: Vec<&str> = body["data"]
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|r| r["id"].as_str())
        .collect();
    assert_eq!(ids, vec![EXP_RING.to_string(), EXP_COUPON.to_string()]);
}

#[tokio::test]
async fn rest_refresh_refetches() {
    let f = setup();
    let server = TestServer::new(build_router(AppState::new(f.processor.clone()))).expect("server");
    let tenant = test_tenant();
    let base = format!("/worlds/0/channels/1/characters/{CHARACTER}/rates");
    with_tenant(server.get(&base), &tenant).await.assert_status_ok();
    let calls = f.peers.calls(names::INVENTORY);

    with_tenant(server.post(&format!("{base}/refresh")), &tenant)
        .await
        .assert_status_ok();

    assert!(f.peers.calls(names::INVENTORY) > calls);
}
