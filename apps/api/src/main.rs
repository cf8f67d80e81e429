mod cache;
mod config;
mod db;
mod errors;
mod experiments;
mod llm_client;
mod models;
mod routes;
mod selection;
mod state;
mod store;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::memory::MemoryKv;
use crate::cache::redis_kv::RedisKv;
use crate::cache::KvStore;
use crate::config::Config;
use crate::db::create_pool;
use crate::experiments::ExperimentRegistry;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::selection::PromptEngine;
use crate::state::AppState;
use crate::store::postgres::PgPromptStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting StoryPrompt API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let store = Arc::new(PgPromptStore::new(db));

    // Initialize cache backend: Redis when configured, otherwise process memory
    let kv: Arc<dyn KvStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?;
            let kv = RedisKv::connect(&client, "storyprompt")
                .await
                .context("Failed to connect to Redis")?;
            info!("Result cache and rate limiter backed by Redis");
            Arc::new(kv)
        }
        None => {
            info!(
                "Result cache and rate limiter in process memory (max {} entries)",
                config.engine.cache_max_entries
            );
            Arc::new(MemoryKv::new(
                config.engine.cache_max_entries,
                config.engine.cache_sweep_interval,
            ))
        }
    };

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone()));
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let engine = PromptEngine::new(
        store,
        llm,
        kv,
        ExperimentRegistry::new(),
        config.engine.clone(),
    );

    // Build router
    let app = build_router(AppState {
        engine: Arc::new(engine),
    })
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
