//! Party-quests service binary.

use axum::Router;
use realm_core::catalog::{Catalog, InMemoryCatalog};
use realm_core::emitter::Emitter;
use realm_core::environment::{Clock, SystemClock};
use realm_core::event_bus::EventBus;
use realm_core::status::topics;
use realm_core::topic;
use realm_party_quests::config::Config;
use realm_party_quests::events::{COMMAND_TOPIC_PARTY_QUEST, Topics};
use realm_party_quests::handlers::{CharacterStatusHandler, MonsterStatusHandler, PartyQuestCommandHandler};
use realm_party_quests::server::{AppState, PartyQuestsHealth, build_router};
use realm_party_quests::timers::PartyQuestTimers;
use realm_party_quests::{Definition, PartyQuestProcessor};
use realm_peers::{HttpPeers, PeerClient};
use realm_postgres::PgCatalog;
use realm_redpanda::RedpandaEventBus;
use realm_runtime::lifecycle::{self, DEFAULT_DRAIN_TIMEOUT};
use realm_runtime::metrics::MetricsServer;
use realm_runtime::{Consumer, MessageHandler, Shutdown, Ticker};
use realm_web::handlers::health_routes;
use std::sync::Arc;
use tracing::info;

async fn definitions(config: &Config) -> anyhow::Result<Arc<dyn Catalog<Definition>>> {
    let Some(url) = config.service.database_url.as_deref() else {
        info!("DATABASE_URL unset, definitions kept in memory");
        return Ok(Arc::new(InMemoryCatalog::new()));
    };
    let pool = realm_postgres::connect(url).await?;
    realm_postgres::migrate(&pool).await?;
    Ok(Arc::new(PgCatalog::new(pool)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    realm_web::server::init_tracing("realm_party_quests=info,realm=info,tower_http=info");

    info!("Starting realm party-quests service");
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
    let processor = PartyQuestProcessor::new(
        definitions(&config).await?,
        peers,
        Emitter::new(bus.clone()),
        Topics::from_env(),
        clock.clone(),
    )?
    .with_completion_timeout(config.completion_timeout_secs);

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let consumers: [(&str, Arc<dyn MessageHandler>); 3] = [
        (COMMAND_TOPIC_PARTY_QUEST, Arc::new(PartyQuestCommandHandler::new(processor.clone()))),
        (topics::CHARACTER_STATUS, Arc::new(CharacterStatusHandler::new(processor.clone()))),
        (topics::MONSTER_STATUS, Arc::new(MonsterStatusHandler::new(processor.clone()))),
    ];
    for (variable, handler) in consumers {
        let consumer = Consumer::new(bus.clone(), topic::resolve(variable), handler);
        tasks.push((format!("consumer:{variable}"), consumer.spawn(shutdown.subscribe())));
    }

    let ticker = Ticker::new(config.service.tick_interval(), clock);
    tasks.push((
        "ticker:party-quest-timers".to_string(),
        ticker.spawn(Arc::new(PartyQuestTimers::new(processor.clone())), shutdown.subscribe()),
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
        .nest("/api", build_router(AppState::new(processor.clone())))
        .merge(health_routes(Arc::new(PartyQuestsHealth::new(processor.clone()))));
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
    let destroyed = processor.shutdown().await;
    info!(destroyed, "Party-quests service stopped");
    Ok(())
}
