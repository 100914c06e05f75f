//! Scheduled routes and instanced voyages against recorded events, a stub
//! map service, in-memory catalogs and a manual clock.

#![allow(clippy::expect_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use realm_core::catalog::InMemoryCatalog;
use realm_core::peer::names;
use realm_core::status::{CharacterChange, CharacterStatus, FieldPosition, MapChange};
use realm_core::{RealmError, Tenant};
use realm_runtime::{MessageHandler, Tickable};
use realm_testing::{ManualClock, RecordingEventBus, StubPeers, inbound, other_tenant, test_tenant, test_time};
use realm_transports::events::{
    CharacterCommand, CharacterCommandKind, InstanceChange, InstanceTransportCommand, InstanceTransportEvent,
    RouteChange, RouteStatus, StartBody, Topics,
};
use realm_transports::handlers::{CharacterStatusHandler, InstanceTransportCommandHandler};
use realm_transports::server::{AppState, build_router};
use realm_transports::states::{TransportStates, VoyageTimers};
use realm_transports::{
    InstanceRoute, InstanceTransportProcessor, Passenger, RouteDefinition, RouteState, SharedVessel,
    TransportProcessor, VoyageState,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const STATUS: &str = "transport-status";
const CHARACTER: &str = "character-command";
const INSTANCE: &str = "instance-transport";

const ELLINIA: u32 = 101_000_300;
const ELLINIA_STATION: u32 = 101_000_301;
const CABIN: u32 = 200_090_010;
const CABIN_DECK: u32 = 200_090_011;
const ORBIS: u32 = 200_000_100;

const KERNING: u32 = 103_000_100;
const TRAIN: u32 = 103_000_301;
const TRAIN_REAR: u32 = 103_000_302;
const SQUARE: u32 = 103_000_310;

const WORLD: u8 = 0;
const CHANNEL: u8 = 1;

fn topics() -> Topics {
    Topics {
        status: STATUS.to_string(),
        character: CHARACTER.to_string(),
        instance: INSTANCE.to_string(),
    }
}

fn at(hour: i64, minute: i64) -> DateTime<Utc> {
    test_time() + Duration::hours(hour) + Duration::minutes(minute)
}

/// Hourly from midnight: boarding xx:53 to xx:58, departure on the hour,
/// arrival ten minutes later.
fn ellinia() -> RouteDefinition {
    serde_json::from_value(json!({
        "name": "Ellinia to Orbis",
        "startMapId": ELLINIA,
        "stagingMapId": ELLINIA_STATION,
        "enRouteMapIds": [CABIN, CABIN_DECK],
        "destinationMapId": ORBIS,
        "boardingWindowSecs": 300,
        "preDepartureSecs": 120,
        "travelSecs": 600,
        "cycleIntervalSecs": 3_600
    }))
    .expect("route")
}

fn half_hourly(name: &str, start: u32, staging: u32) -> RouteDefinition {
    serde_json::from_value(json!({
        "name": name,
        "startMapId": start,
        "stagingMapId": staging,
        "enRouteMapIds": [staging + 10],
        "destinationMapId": start + 100,
        "boardingWindowSecs": 240,
        "travelSecs": 600,
        "cycleIntervalSecs": 1_800
    }))
    .expect("route")
}

/// Two seats, ten seconds of boarding, thirty of travel.
fn kerning() -> InstanceRoute {
    serde_json::from_value(json!({
        "name": "Kerning Square Train",
        "startMapId": KERNING,
        "transitMapIds": [TRAIN, TRAIN_REAR],
        "destinationMapId": SQUARE,
        "capacity": 2,
        "boardingWindowSecs": 10,
        "travelSecs": 30,
        "transitMessage": "Next stop, Kerning Square."
    }))
    .expect("instance route")
}

struct Fixture {
    processor: TransportProcessor,
    instanced: InstanceTransportProcessor,
    bus: RecordingEventBus,
    clock: Arc<ManualClock>,
    peers: StubPeers,
    route_id: Uuid,
    train_id: Uuid,
}

async fn setup() -> Fixture {
    let bus = RecordingEventBus::new();
    let clock = Arc::new(ManualClock::new(at(11, 30)));
    let peers = StubPeers::new();
    let processor = TransportProcessor::new(
        Arc::new(InMemoryCatalog::new()),
        Arc::new(InMemoryCatalog::new()),
        Arc::new(peers.clone()),
        bus.emitter(),
        topics(),
        clock.clone(),
    )
    .with_field(WORLD, CHANNEL);
    let route = processor.create_route(&test_tenant(), ellinia()).await.expect("route");
    let instanced = InstanceTransportProcessor::new(Arc::new(InMemoryCatalog::new()), bus.emitter(), topics(), clock.clone());
    let train = instanced.create_route(&test_tenant(), kerning()).await.expect("instance route");
    Fixture {
        processor,
        instanced,
        bus,
        clock,
        peers,
        route_id: route.id(),
        train_id: train.id,
    }
}

impl Fixture {
    fn status_handler(&self) -> CharacterStatusHandler {
        CharacterStatusHandler::new(self.processor.clone(), self.instanced.clone())
    }
}

fn changes(bus: &RecordingEventBus) -> Vec<RouteChange> {
    bus.decoded::<RouteStatus>(STATUS).into_iter().map(|s| s.change).collect()
}

fn logout(character_id: u32, map_id: u32) -> CharacterStatus {
    CharacterStatus {
        world_id: WORLD,
        character_id,
        change: CharacterChange::Logout(FieldPosition {
            channel_id: CHANNEL,
            map_id,
        }),
    }
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
async fn ticks_walk_the_route_through_a_trip() {
    let f = setup().await;
    let tenant = test_tenant();
    let ticker = TransportStates::new(f.processor.clone());
    let state = || f.processor.registry().get(&tenant, &f.route_id).expect("loaded").state();

    assert_eq!(state(), RouteState::AwaitingReturn);
    assert_eq!(
        changes(&f.bus),
        vec![RouteChange::StateChanged {
            previous: RouteState::OutOfService,
            state: RouteState::AwaitingReturn
        }]
    );

    ticker.tick(at(11, 40)).await;
    assert_eq!(f.bus.event_types(STATUS).len(), 1);

    ticker.tick(at(11, 55)).await;
    assert_eq!(state(), RouteState::OpenEntry);
    ticker.tick(at(11, 59)).await;
    assert_eq!(state(), RouteState::LockedEntry);

    f.peers.set_player_count(WORLD, CHANNEL, ELLINIA_STATION, 4);
    ticker.tick(at(12, 1)).await;
    assert_eq!(state(), RouteState::InTransit);

    f.peers.set_player_count(WORLD, CHANNEL, CABIN, 3);
    f.peers.set_player_count(WORLD, CHANNEL, CABIN_DECK, 1);
    ticker.tick(at(12, 10)).await;
    assert_eq!(state(), RouteState::AwaitingReturn);

    assert_eq!(
        f.bus.event_types(STATUS),
        vec![
            "STATE_CHANGED",
            "STATE_CHANGED",
            "STATE_CHANGED",
            "STATE_CHANGED",
            "DEPARTED",
            "STATE_CHANGED",
            "ARRIVED"
        ]
    );
    let all = changes(&f.bus);
    assert_eq!(
        all[4],
        RouteChange::Departed {
            map_id: ELLINIA_STATION,
            passengers: 4
        }
    );
    assert_eq!(
        all[6],
        RouteChange::Arrived {
            map_id: ORBIS,
            passengers: 4
        }
    );
    let statuses: Vec<RouteStatus> = f.bus.decoded(STATUS);
    assert!(statuses.iter().all(|s| s.route_id == f.route_id));
}

#[tokio::test]
async fn departure_without_a_map_service_counts_nobody() {
    let f = setup().await;
    let ticker = TransportStates::new(f.processor.clone());
    f.peers.make_unavailable(names::MAPS);

    ticker.tick(at(11, 55)).await;
    ticker.tick(at(12, 0)).await;
    assert_eq!(
        changes(&f.bus).last(),
        Some(&RouteChange::Departed {
            map_id: ELLINIA_STATION,
            passengers: 0
        })
    );
}

#[tokio::test]
async fn first_evaluation_mid_trip_is_not_a_departure() {
    let f = setup().await;
    let tenant = other_tenant();
    f.clock.set(at(12, 5));
    let route = f.processor.create_route(&tenant, ellinia()).await.expect("route");
    assert_eq!(route.state(), RouteState::InTransit);
    let events: Vec<RouteStatus> = f
        .bus
        .decoded::<RouteStatus>(STATUS)
        .into_iter()
        .filter(|s| s.route_id == route.id())
        .collect();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].change, RouteChange::StateChanged { .. }));
}

#[tokio::test]
async fn logout_aboard_or_boarding_returns_to_the_start_map() {
    let f = setup().await;
    let tenant = test_tenant();
    let handler = f.status_handler();

    for (character_id, map_id) in [(1_u32, ELLINIA_STATION), (2, CABIN_DECK), (3, ORBIS), (4, 100_000_000)] {
        handler
            .handle(inbound(&tenant, "LOGOUT", character_id, &logout(character_id, map_id)))
            .await
            .expect("logout");
    }

    let warps: Vec<(u32, u32, u8)> = f
        .bus
        .decoded::<CharacterCommand>(CHARACTER)
        .into_iter()
        .map(|c| match c.kind {
            CharacterCommandKind::ChangeMap(body) => {
                assert!(body.instance.is_nil());
                (c.character_id, body.map_id, c.channel_id)
            },
        })
        .collect();
    assert_eq!(warps, vec![(1, ELLINIA, CHANNEL), (2, ELLINIA, CHANNEL)]);

    let login = CharacterStatus {
        world_id: WORLD,
        character_id: 5,
        change: CharacterChange::Login(FieldPosition {
            channel_id: CHANNEL,
            map_id: CABIN,
        }),
    };
    handler.handle(inbound(&tenant, "LOGIN", 5_u32, &login)).await.expect("login");
    assert_eq!(f.bus.event_types(CHARACTER).len(), 2);
}

#[tokio::test]
async fn routes_belong_to_their_tenant() {
    let f = setup().await;
    let other = other_tenant();
    let handler = f.status_handler();
    handler
        .handle(inbound(&other, "LOGOUT", 1_u32, &logout(1, ELLINIA_STATION)))
        .await
        .expect("logout");
    assert!(f.bus.event_types(CHARACTER).is_empty());
    assert!(f.processor.routes(&other).await.expect("routes").is_empty());
    assert!(matches!(
        f.processor.route(&other, f.route_id).await,
        Err(RealmError::NotFound { .. })
    ));
}

#[tokio::test]
async fn shared_vessel_alternates_its_routes() {
    let f = setup().await;
    let tenant = test_tenant();
    let outbound = f
        .processor
        .create_route(&tenant, half_hourly("Orbis to Ludibrium", 200_000_110, 200_000_121))
        .await
        .expect("route");
    let inbound_route = f
        .processor
        .create_route(&tenant, half_hourly("Ludibrium to Orbis", 220_000_110, 220_000_111))
        .await
        .expect("route");
    assert_eq!(outbound.schedule().len(), 48);

    f.clock.set(at(11, 20));
    let vessel = f
        .processor
        .create_vessel(
            &tenant,
            SharedVessel {
                id: Uuid::nil(),
                name: "Ludibrium train".to_string(),
                route_a_id: outbound.id(),
                route_b_id: inbound_route.id(),
                turnaround_secs: 300,
            },
        )
        .await
        .expect("vessel");
    assert!(!vessel.id.is_nil());

    let outbound = f.processor.route(&tenant, outbound.id()).await.expect("route");
    let inbound_route = f.processor.route(&tenant, inbound_route.id()).await.expect("route");
    let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).expect("time");
    assert_eq!(outbound.schedule().len(), 24);
    assert_eq!(outbound.schedule()[1].departure, hm(1, 0));
    assert_eq!(inbound_route.schedule()[0].departure, hm(0, 15));
    assert_eq!(inbound_route.schedule()[1].departure, hm(1, 15));

    // 11:20 is mid-journey for route B
    assert_eq!(inbound_route.state(), RouteState::InTransit);
    assert_eq!(
        f.processor.route(&tenant, f.route_id).await.expect("route").state(),
        RouteState::AwaitingReturn
    );

    let taken = f
        .processor
        .create_vessel(
            &tenant,
            SharedVessel {
                id: Uuid::nil(),
                name: "Second train".to_string(),
                route_a_id: outbound.id(),
                route_b_id: f.route_id,
                turnaround_secs: 60,
            },
        )
        .await;
    assert!(matches!(taken, Err(RealmError::Conflict(_))));

    let unknown = f
        .processor
        .create_vessel(
            &tenant,
            SharedVessel {
                id: Uuid::nil(),
                name: "Ghost ship".to_string(),
                route_a_id: f.route_id,
                route_b_id: Uuid::new_v4(),
                turnaround_secs: 60,
            },
        )
        .await;
    assert!(matches!(unknown, Err(RealmError::NotFound { .. })));
}

#[tokio::test]
async fn route_names_are_unique_and_definitions_checked() {
    let f = setup().await;
    let tenant = test_tenant();
    let duplicate = f.processor.create_route(&tenant, ellinia()).await;
    assert!(matches!(duplicate, Err(RealmError::Conflict(_))));

    let mut broken = half_hourly("Broken", 1, 2);
    broken.travel_secs = 0;
    assert!(matches!(
        f.processor.create_route(&tenant, broken).await,
        Err(RealmError::Validation(_))
    ));

    // re-storing under the same id keeps the route and its state
    let mut renamed = ellinia();
    renamed.id = f.route_id;
    renamed.name = "Ellinia to Orbis (night)".to_string();
    let stored = f.processor.create_route(&tenant, renamed).await.expect("update");
    assert_eq!(stored.definition().name, "Ellinia to Orbis (night)");
    assert_eq!(stored.state(), RouteState::AwaitingReturn);
    assert_eq!(f.processor.routes(&tenant).await.expect("routes").len(), 1);
}

#[tokio::test]
async fn rest_serves_and_seeds_routes() {
    let f = setup().await;
    let tenant = test_tenant();
    let server = TestServer::new(build_router(AppState::new(f.processor.clone(), f.instanced.clone()))).expect("server");

    let one = with_tenant(server.get(&format!("/transports/routes/{}", f.route_id)), &tenant).await;
    one.assert_status_ok();
    let body: serde_json::Value = one.json();
    assert_eq!(body["data"]["type"], "routes");
    assert_eq!(body["data"]["attributes"]["state"], "awaiting_return");
    assert_eq!(body["data"]["attributes"]["stagingMapId"], ELLINIA_STATION);
    assert_eq!(body["data"]["attributes"]["schedule"][12]["departure"], "12:00:00");
    assert_eq!(body["data"]["attributes"]["schedule"][12]["boardingOpen"], "11:53:00");

    with_tenant(server.get(&format!("/transports/routes/{}", Uuid::new_v4())), &tenant)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let created = with_tenant(server.post("/transports/routes"), &tenant)
        .json(&json!({
            "data": {
                "type": "routes",
                "attributes": half_hourly("Orbis to Leafre", 200_000_100, 200_000_131)
            }
        }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = created.json();
    let created_id = body["data"]["id"].as_str().expect("id").to_string();

    let from_ellinia = with_tenant(server.get(&format!("/transports/routes?filter[startMapId]={ELLINIA}")), &tenant).await;
    let body: serde_json::Value = from_ellinia.json();
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["id"], f.route_id.to_string());

    let all = with_tenant(server.get("/transports/routes"), &tenant).await;
    let body: serde_json::Value = all.json();
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));

    with_tenant(server.get("/transports/routes?filter[startMapId]=orbis"), &tenant)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let duplicate = with_tenant(server.post("/transports/routes"), &tenant)
        .json(&json!({ "data": { "type": "routes", "attributes": ellinia() } }))
        .await;
    duplicate.assert_status(StatusCode::CONFLICT);

    let vessel = with_tenant(server.post("/transports/vessels"), &tenant)
        .json(&json!({
            "data": {
                "type": "vessels",
                "attributes": {
                    "name": "Orbis ship",
                    "routeAId": f.route_id,
                    "routeBId": created_id,
                    "turnaroundSecs": 300
                }
            }
        }))
        .await;
    vessel.assert_status(StatusCode::CREATED);
    let vessels = with_tenant(server.get("/transports/vessels"), &tenant).await;
    let body: serde_json::Value = vessels.json();
    assert_eq!(body["data"][0]["type"], "vessels");
    assert_eq!(body["data"][0]["attributes"]["name"], "Orbis ship");
}

fn passenger(character_id: u32) -> Passenger {
    Passenger {
        character_id,
        world_id: WORLD,
        channel_id: CHANNEL,
    }
}

fn train() -> StartBody {
    StartBody {
        route_id: Uuid::nil(),
        route_name: "Kerning Square Train".to_string(),
    }
}

fn map_changed(character_id: u32, old_map_id: u32, target_map_id: u32) -> CharacterStatus {
    CharacterStatus {
        world_id: WORLD,
        character_id,
        change: CharacterChange::MapChanged(MapChange {
            channel_id: CHANNEL,
            old_map_id,
            target_map_id,
        }),
    }
}

fn instance_changes(bus: &RecordingEventBus) -> Vec<(u32, InstanceChange)> {
    bus.decoded::<InstanceTransportEvent>(INSTANCE)
        .into_iter()
        .map(|e| (e.character_id, e.change))
        .collect()
}

fn warps(bus: &RecordingEventBus) -> Vec<(u32, u32, Uuid)> {
    bus.decoded::<CharacterCommand>(CHARACTER)
        .into_iter()
        .map(|c| match c.kind {
            CharacterCommandKind::ChangeMap(body) => (c.character_id, body.map_id, body.instance),
        })
        .collect()
}

fn cancelled(reason: &str) -> InstanceChange {
    InstanceChange::Cancelled {
        channel_id: CHANNEL,
        reason: reason.to_string(),
    }
}

#[tokio::test]
async fn third_passenger_opens_a_second_voyage() {
    let f = setup().await;
    let tenant = test_tenant();
    let mut voyages = Vec::new();
    for character_id in 1..=3 {
        voyages.push(f.instanced.start(&tenant, passenger(character_id), &train()).await.expect("start"));
    }
    assert_eq!(voyages[0].id(), voyages[1].id());
    assert_ne!(voyages[1].id(), voyages[2].id());
    assert_eq!(f.instanced.voyage_of(&tenant, 2).expect("aboard").passengers().len(), 2);

    assert_eq!(
        warps(&f.bus),
        vec![
            (1, TRAIN, voyages[0].id()),
            (2, TRAIN, voyages[0].id()),
            (3, TRAIN, voyages[2].id())
        ]
    );
    assert_eq!(f.bus.event_types(INSTANCE), vec!["STARTED", "STARTED", "STARTED"]);
    let events: Vec<InstanceTransportEvent> = f.bus.decoded(INSTANCE);
    assert!(events.iter().all(|e| e.route_id == f.train_id));
    assert_eq!(events[2].instance_id, voyages[2].id());

    let again = f.instanced.start(&tenant, passenger(1), &train()).await;
    assert!(matches!(again, Err(RealmError::Conflict(_))), "{again:?}");
    assert_eq!(f.bus.event_types(INSTANCE).len(), 3);
}

#[tokio::test]
async fn voyage_departs_then_delivers_to_the_destination() {
    let f = setup().await;
    let tenant = test_tenant();
    let ticker = VoyageTimers::new(f.instanced.clone());
    let opened = at(11, 30);
    let first = f.instanced.start(&tenant, passenger(1), &train()).await.expect("start");

    ticker.tick(opened + Duration::seconds(10)).await;
    assert_eq!(f.instanced.voyage_of(&tenant, 1).expect("aboard").state(), VoyageState::Boarding);
    ticker.tick(opened + Duration::seconds(11)).await;
    assert_eq!(f.instanced.voyage_of(&tenant, 1).expect("aboard").state(), VoyageState::InTransit);

    f.clock.set(opened + Duration::seconds(11));
    let late = f.instanced.start(&tenant, passenger(2), &train()).await.expect("late start");
    assert_ne!(late.id(), first.id());

    ticker.tick(opened + Duration::seconds(41)).await;
    assert!(f.instanced.voyage_of(&tenant, 1).is_err_and(|e| e.is_not_found()));
    assert_eq!(f.instanced.voyage_of(&tenant, 2).expect("aboard").state(), VoyageState::InTransit);
    assert_eq!(warps(&f.bus).last(), Some(&(1, SQUARE, Uuid::nil())));
    assert_eq!(
        instance_changes(&f.bus).last(),
        Some(&(
            1,
            InstanceChange::Completed {
                channel_id: CHANNEL,
                map_id: SQUARE
            }
        ))
    );

    ticker.tick(opened + Duration::seconds(41)).await;
    assert_eq!(f.bus.event_types(INSTANCE), vec!["STARTED", "STARTED", "COMPLETED"]);
}

#[tokio::test]
async fn transit_maps_report_remaining_time_and_leaving_them_cancels() {
    let f = setup().await;
    let tenant = test_tenant();
    let handler = f.status_handler();
    let opened = at(11, 30);
    f.instanced.start(&tenant, passenger(1), &train()).await.expect("start");

    f.clock.set(opened + Duration::seconds(20));
    handler
        .handle(inbound(&tenant, "MAP_CHANGED", 1_u32, &map_changed(1, KERNING, TRAIN)))
        .await
        .expect("enter train");
    handler
        .handle(inbound(&tenant, "MAP_CHANGED", 1_u32, &map_changed(1, TRAIN, TRAIN_REAR)))
        .await
        .expect("walk to the rear car");
    assert_eq!(
        instance_changes(&f.bus)[1],
        (
            1,
            InstanceChange::TransitEntered {
                channel_id: CHANNEL,
                map_id: TRAIN,
                remaining_secs: 20,
                message: "Next stop, Kerning Square.".to_string()
            }
        )
    );

    handler
        .handle(inbound(&tenant, "MAP_CHANGED", 1_u32, &map_changed(1, TRAIN_REAR, 100_000_000)))
        .await
        .expect("leave");
    assert_eq!(
        f.bus.event_types(INSTANCE),
        vec!["STARTED", "TRANSIT_ENTERED", "TRANSIT_ENTERED", "CANCELLED"]
    );
    assert_eq!(instance_changes(&f.bus)[3], (1, cancelled("map_exit")));
    assert!(f.instanced.all_voyages(&tenant).is_empty());

    handler
        .handle(inbound(&tenant, "MAP_CHANGED", 7_u32, &map_changed(7, KERNING, TRAIN)))
        .await
        .expect("stowaway");
    assert_eq!(f.bus.event_types(INSTANCE).len(), 4);
}

#[tokio::test]
async fn logout_leaves_the_voyage_and_login_returns_to_the_start() {
    let f = setup().await;
    let tenant = test_tenant();
    let handler = f.status_handler();
    let voyage = f.instanced.start(&tenant, passenger(1), &train()).await.expect("start");
    f.instanced.start(&tenant, passenger(2), &train()).await.expect("start");

    handler
        .handle(inbound(&tenant, "LOGOUT", 1_u32, &logout(1, TRAIN)))
        .await
        .expect("logout");
    assert_eq!(instance_changes(&f.bus).last(), Some(&(1, cancelled("logout"))));
    let remaining = f.instanced.voyage_of(&tenant, 2).expect("still aboard");
    assert_eq!(remaining.id(), voyage.id());
    assert_eq!(remaining.state(), VoyageState::Boarding);

    let login = CharacterStatus {
        world_id: WORLD,
        character_id: 1,
        change: CharacterChange::Login(FieldPosition {
            channel_id: CHANNEL,
            map_id: TRAIN_REAR,
        }),
    };
    handler.handle(inbound(&tenant, "LOGIN", 1_u32, &login)).await.expect("login");
    assert_eq!(warps(&f.bus).last(), Some(&(1, KERNING, Uuid::nil())));

    handler
        .handle(inbound(&tenant, "LOGOUT", 2_u32, &logout(2, TRAIN)))
        .await
        .expect("logout");
    assert!(f.instanced.all_voyages(&tenant).is_empty());
    assert_eq!(f.bus.event_types(INSTANCE), vec!["STARTED", "STARTED", "CANCELLED", "CANCELLED"]);
}

#[tokio::test]
async fn stuck_voyage_returns_passengers_to_the_start() {
    let f = setup().await;
    let tenant = test_tenant();
    let opened = at(11, 30);
    f.instanced.start(&tenant, passenger(1), &train()).await.expect("start");
    f.instanced.start(&tenant, passenger(2), &train()).await.expect("start");

    assert_eq!(f.instanced.tick(&tenant, opened + Duration::seconds(81)).await, 1);
    assert!(f.instanced.all_voyages(&tenant).is_empty());
    let returned: Vec<_> = warps(&f.bus).into_iter().skip(2).collect();
    assert_eq!(returned, vec![(1, KERNING, Uuid::nil()), (2, KERNING, Uuid::nil())]);
    assert_eq!(
        instance_changes(&f.bus)[2..],
        [(1, cancelled("stuck")), (2, cancelled("stuck"))]
    );
}

#[tokio::test]
async fn shutdown_returns_everyone_to_the_start() {
    let f = setup().await;
    let tenant = test_tenant();
    for character_id in 1..=3 {
        f.instanced.start(&tenant, passenger(character_id), &train()).await.expect("start");
    }

    assert_eq!(f.instanced.shutdown().await, 3);
    assert!(f.instanced.all_voyages(&tenant).is_empty());
    let mut returned: Vec<u32> = warps(&f.bus)
        .into_iter()
        .filter(|(_, map_id, _)| *map_id == KERNING)
        .map(|(character_id, _, _)| character_id)
        .collect();
    returned.sort_unstable();
    assert_eq!(returned, vec![1, 2, 3]);
}

#[tokio::test]
async fn start_command_boards_by_id_and_skips_unknown_routes() {
    let f = setup().await;
    let tenant = test_tenant();
    let handler = InstanceTransportCommandHandler::new(f.instanced.clone());
    let command = |character_id: u32, body: StartBody| -> InstanceTransportCommand {
        serde_json::from_value(json!({
            "worldId": WORLD,
            "channelId": CHANNEL,
            "characterId": character_id,
            "type": "START",
            "body": body
        }))
        .expect("command")
    };

    let by_id = StartBody {
        route_id: f.train_id,
        route_name: String::new(),
    };
    handler
        .handle(inbound(&tenant, "START", 1_u32, &command(1, by_id.clone())))
        .await
        .expect("start");
    assert_eq!(f.instanced.voyage_of(&tenant, 1).expect("aboard").route_id(), f.train_id);

    let unknown = StartBody {
        route_id: Uuid::nil(),
        route_name: "Ghost Train".to_string(),
    };
    handler
        .handle(inbound(&tenant, "START", 2_u32, &command(2, unknown)))
        .await
        .expect("unknown route is skipped");
    handler
        .handle(inbound(&tenant, "START", 1_u32, &command(1, by_id)))
        .await
        .expect("second start is skipped");
    assert_eq!(f.bus.event_types(INSTANCE), vec!["STARTED"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_starts_never_overfill_a_voyage() {
    let f = setup().await;
    let tenant = test_tenant();
    let starts: Vec<_> = (1..=20_u32)
        .map(|character_id| {
            let instanced = f.instanced.clone();
            let tenant = tenant.clone();
            tokio::spawn(async move { instanced.start(&tenant, passenger(character_id), &train()).await })
        })
        .collect();
    for start in starts {
        start.await.expect("join").expect("start");
    }

    let voyages = f.instanced.all_voyages(&tenant);
    assert!(voyages.iter().all(|v| v.passengers().len() <= 2));
    let aboard: usize = voyages.iter().map(|v| v.passengers().len()).sum();
    assert_eq!(aboard, 20);
    assert_eq!(f.bus.event_types(INSTANCE).len(), 20);
}

#[tokio::test]
async fn rest_serves_instance_routes_and_voyages() {
    let f = setup().await;
    let tenant = test_tenant();
    let server = TestServer::new(build_router(AppState::new(f.processor.clone(), f.instanced.clone()))).expect("server");
    let voyage = f.instanced.start(&tenant, passenger(1), &train()).await.expect("start");

    let routes = with_tenant(server.get("/transports/instance-routes"), &tenant).await;
    routes.assert_status_ok();
    let body: serde_json::Value = routes.json();
    assert_eq!(body["data"][0]["type"], "instance-routes");
    assert_eq!(body["data"][0]["attributes"]["transitMapIds"], json!([TRAIN, TRAIN_REAR]));

    with_tenant(server.get(&format!("/transports/instance-routes/{}", f.train_id)), &tenant)
        .await
        .assert_status_ok();
    with_tenant(server.post("/transports/instance-routes"), &tenant)
        .json(&json!({ "data": { "type": "instance-routes", "attributes": kerning() } }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let running = with_tenant(server.get(&format!("/transports/instances?filter[routeId]={}", f.train_id)), &tenant).await;
    running.assert_status_ok();
    let body: serde_json::Value = running.json();
    assert_eq!(body["data"][0]["id"], voyage.id().to_string());
    assert_eq!(body["data"][0]["attributes"]["state"], "boarding");
    assert_eq!(body["data"][0]["attributes"]["passengers"][0]["characterId"], 1);

    let elsewhere = with_tenant(server.get(&format!("/transports/instances?filter[routeId]={}", f.route_id)), &tenant).await;
    let body: serde_json::Value = elsewhere.json();
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
}
