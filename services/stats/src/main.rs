//! Stats service binary.

use axum::Router;
use realm_core::emitter::Emitter;
use realm_core::event_bus::EventBus;
use realm_core::status::topics;
use realm_core::topic;
use realm_peers::{HttpPeers, PeerClient};
use realm_redpanda::RedpandaEventBus;
use realm_runtime::lifecycle::{self, DEFAULT_DRAIN_TIMEOUT};
use realm_runtime::metrics::MetricsServer;
use realm_runtime::{Consumer, MessageHandler, Shutdown};
use realm_stats::config::Config;
use realm_stats::events::Topics;
use realm_stats::handlers::{
    AssetStatusHandler, BuffStatusHandler, CharacterStatusHandler, SkillStatusHandler,
};
use realm_stats::server::{AppState, StatsHealth, build_router};
use realm_stats::StatsProcessor;
use realm_web::handlers::health_routes;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    realm_web::server::init_tracing("realm_stats=info,realm=info,tower_http=info");

    info!("Starting realm stats service");
    let config = Config::from_env();

    let mut metrics = MetricsServer::new(config.service.metrics_addr());
    metrics.start()?;

    let bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&config.service.bootstrap_servers)
            .consumer_group(&config.service.consumer_group)
            .build()?,
    );
    let peers = Arc::new(HttpPeers::new(PeerClient::new(&config.service.base_service_url)?));
    let processor = StatsProcessor::new(peers, Emitter::new(bus.clone()), Topics::from_env());

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let consumers: [(&str, Arc<dyn MessageHandler>); 4] = [
        (topics::ASSET_STATUS, Arc::new(AssetStatusHandler::new(processor.clone()))),
        (topics::BUFF_STATUS, Arc::new(BuffStatusHandler::new(processor.clone()))),
        (topics::CHARACTER_STATUS, Arc::new(CharacterStatusHandler::new(processor.clone()))),
        (topics::SKILL_STATUS, Arc::new(SkillStatusHandler::new(processor.clone()))),
    ];
    for (variable, handler) in consumers {
        let consumer = Consumer::new(bus.clone(), topic::resolve(variable), handler);
        tasks.push((format!("consumer:{variable}"), consumer.spawn(shutdown.subscribe())));
    }

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
        .merge(health_routes(Arc::new(StatsHealth::new(processor))));
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
    info!("Stats service stopped");
    Ok(())
}
