//! Reactors service binary.

use axum::Router;
use realm_core::emitter::Emitter;
use realm_core::environment::{Clock, SystemClock};
use realm_core::event_bus::EventBus;
use realm_core::status::topics;
use realm_core::topic;
use realm_peers::{HttpPeers, PeerClient};
use realm_reactors::ReactorProcessor;
use realm_reactors::config::Config;
use realm_reactors::events::{COMMAND_TOPIC_REACTOR, Topics};
use realm_reactors::handlers::{DropStatusHandler, ReactorCommandHandler};
use realm_reactors::server::{AppState, ReactorsHealth, build_router};
use realm_reactors::sweep::CooldownSweep;
use realm_redpanda::RedpandaEventBus;
use realm_runtime::lifecycle::{self, DEFAULT_DRAIN_TIMEOUT};
use realm_runtime::metrics::MetricsServer;
use realm_runtime::{Consumer, MessageHandler, Shutdown, Ticker};
use realm_web::handlers::health_routes;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    realm_web::server::init_tracing("realm_reactors=info,realm=info,tower_http=info");

    info!("Starting realm reactors service");
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
    let processor = ReactorProcessor::new(peers, Emitter::new(bus.clone()), Topics::from_env(), clock.clone())
        .with_activation_delay(config.activation_delay());

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let consumers: [(&str, Arc<dyn MessageHandler>); 2] = [
        (COMMAND_TOPIC_REACTOR, Arc::new(ReactorCommandHandler::new(processor.clone()))),
        (topics::DROP_STATUS, Arc::new(DropStatusHandler::new(processor.clone()))),
    ];
    for (variable, handler) in consumers {
        let consumer = Consumer::new(bus.clone(), topic::resolve(variable), handler);
        tasks.push((format!("consumer:{variable}"), consumer.spawn(shutdown.subscribe())));
    }

    let ticker = Ticker::new(config.service.tick_interval(), clock);
    tasks.push((
        "ticker:reactor-cooldowns".to_string(),
        ticker.spawn(Arc::new(CooldownSweep::new(processor.clone())), shutdown.subscribe()),
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
        .merge(health_routes(Arc::new(ReactorsHealth::new(processor.clone()))));
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
    processor.teardown().await;
    info!("Reactors service stopped");
    Ok(())
}
