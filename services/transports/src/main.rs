//! Transports service binary.

use axum::Router;
use realm_core::catalog::{Catalog, InMemoryCatalog};
use realm_core::emitter::Emitter;
use realm_core::environment::{Clock, SystemClock};
use realm_core::event_bus::EventBus;
use realm_core::status::topics;
use realm_core::topic;
use realm_peers::{HttpPeers, PeerClient};
use realm_postgres::PgCatalog;
use realm_redpanda::RedpandaEventBus;
use realm_runtime::lifecycle::{self, DEFAULT_DRAIN_TIMEOUT};
use realm_runtime::metrics::MetricsServer;
use realm_runtime::{Consumer, Shutdown, Ticker};
use realm_transports::config::Config;
use realm_transports::events::{COMMAND_TOPIC_INSTANCE_TRANSPORT, Topics};
use realm_transports::handlers::{CharacterStatusHandler, InstanceTransportCommandHandler};
use realm_transports::server::{AppState, TransportsHealth, build_router};
use realm_transports::states::{TransportStates, VoyageTimers};
use realm_transports::{InstanceRoute, InstanceTransportProcessor, RouteDefinition, SharedVessel, TransportProcessor};
use realm_web::handlers::health_routes;
use std::sync::Arc;
use tracing::info;

type Catalogs = (
    Arc<dyn Catalog<RouteDefinition>>,
    Arc<dyn Catalog<SharedVessel>>,
    Arc<dyn Catalog<InstanceRoute>>,
);

async fn catalogs(config: &Config) -> anyhow::Result<Catalogs> {
    let Some(url) = config.service.database_url.as_deref() else {
        info!("DATABASE_URL unset, routes kept in memory");
        return Ok((
            Arc::new(InMemoryCatalog::new()),
            Arc::new(InMemoryCatalog::new()),
            Arc::new(InMemoryCatalog::new()),
        ));
    };
    let pool = realm_postgres::connect(url).await?;
    realm_postgres::migrate(&pool).await?;
    Ok((
        Arc::new(PgCatalog::new(pool.clone())),
        Arc::new(PgCatalog::new(pool.clone())),
        Arc::new(PgCatalog::new(pool)),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    realm_web::server::init_tracing("realm_transports=info,realm=info,tower_http=info");

    info!("Starting realm transports service");
    let config = Config::from_env();

    let mut metrics = MetricsServer::new(config.service.metrics_addr());
    metrics.start()?;

    let bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&config.service.bootstrap_servers)
            .consumer_group(&config.service.consumer_group)
            .build()?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let peers = Arc::new(HttpPeers::new(PeerClient::new(&config.service.base_service_url)?));
    let (routes, vessels, instance_routes) = catalogs(&config).await?;
    let topics = Topics::from_env();
    let processor = TransportProcessor::new(
        routes,
        vessels,
        peers,
        Emitter::new(bus.clone()),
        topics.clone(),
        clock.clone(),
    )
    .with_field(config.world_id, config.channel_id);
    let instanced = InstanceTransportProcessor::new(instance_routes, Emitter::new(bus.clone()), topics, clock.clone());

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let consumer = Consumer::new(
        bus.clone(),
        topic::resolve(topics::CHARACTER_STATUS),
        Arc::new(CharacterStatusHandler::new(processor.clone(), instanced.clone())),
    );
    tasks.push((
        format!("consumer:{}", topics::CHARACTER_STATUS),
        consumer.spawn(shutdown.subscribe()),
    ));
    let consumer = Consumer::new(
        bus.clone(),
        topic::resolve(COMMAND_TOPIC_INSTANCE_TRANSPORT),
        Arc::new(InstanceTransportCommandHandler::new(instanced.clone())),
    );
    tasks.push((
        format!("consumer:{COMMAND_TOPIC_INSTANCE_TRANSPORT}"),
        consumer.spawn(shutdown.subscribe()),
    ));

    let ticker = Ticker::new(config.service.tick_interval(), clock.clone());
    tasks.push((
        "ticker:transport-states".to_string(),
        ticker.spawn(Arc::new(TransportStates::new(processor.clone())), shutdown.subscribe()),
    ));
    let ticker = Ticker::new(config.service.tick_interval(), clock);
    tasks.push((
        "ticker:voyage-timers".to_string(),
        ticker.spawn(Arc::new(VoyageTimers::new(instanced.clone())), shutdown.subscribe()),
    ));

    let metrics_shutdown = shutdown.subscribe();
    tasks.push((
        "metrics".to_string(),
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(metrics_shutdown).await {
                tracing::error!(error = %e, "Metrics server failed");
            }
        }),
    ));

    let router = Router::new()
        .nest("/api", build_router(AppState::new(processor.clone(), instanced.clone())))
        .merge(health_routes(Arc::new(TransportsHealth::new(processor, instanced.clone()))));
    let server = tokio::spawn(realm_web::server::serve(
        router,
        config.service.rest_addr(),
        shutdown.subscribe(),
    ));

    lifecycle::shutdown_signal().await;
    info!("Shutting down");
    shutdown.trigger();

    server.await??;
    lifecycle::drain(tasks, DEFAULT_DRAIN_TIMEOUT).await;
    instanced.shutdown().await;
    info!("Transports service stopped");
    Ok(())
}
