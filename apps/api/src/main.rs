mod config;
mod db;
mod errors;
mod gateway;
mod jobs;
mod pipelines;
mod routes;
mod services;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, ensure_schema};
use crate::gateway::ServiceGateway;
use crate::jobs::postgres::PgJobStore;
use crate::jobs::registry::HandlerRegistry;
use crate::jobs::store::JobStore;
use crate::jobs::worker::{cleanup_loop, Worker, WorkerConfig};
use crate::routes::build_router;
use crate::services::llm::LlmClient;
use crate::services::scraper::ScraperClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting job orchestrator v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL and the job table
    let pool = create_pool(&config.database_url).await?;
    ensure_schema(&pool).await?;
    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));

    // Gateway + external service clients; breaker/limiter state lives for
    // the whole process
    let gateway = Arc::new(ServiceGateway::with_default_services());
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone()));
    let scraper = Arc::new(ScraperClient::new(
        config.firecrawl_base_url.clone(),
        config.firecrawl_api_key.clone(),
    ));

    // Register job handlers (duplicate registration fails startup)
    let mut registry = HandlerRegistry::new();
    pipelines::register_all(&mut registry, gateway.clone(), llm, scraper)?;
    let registry = Arc::new(registry);
    info!("Registered job handlers: {:?}", registry.job_types());

    // Worker loop + periodic cleanup, co-located with the HTTP surface
    let worker = Worker::new(
        jobs.clone(),
        registry.clone(),
        WorkerConfig {
            poll_interval: config.worker_poll_interval,
            max_idle_interval: config.worker_max_idle_interval,
        },
    );
    tokio::spawn(async move { worker.run().await });
    tokio::spawn(cleanup_loop(
        jobs.clone(),
        config.cleanup_interval,
        config.job_retention,
    ));

    // Build app state + router
    let state = AppState {
        jobs,
        gateway,
        registry,
    };
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
