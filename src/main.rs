//! Estate relay - streaming chat backend for a real-estate assistant
//!
//! Relays LLM completions to browser clients over SSE while keeping an
//! append-only transcript in `SQLite`.

mod api;
mod config;
mod db;
mod llm;
mod relay;
mod state_machine;
mod tools;

use api::{create_router, AppState};
use axum::http::HeaderValue;
use config::Config;
use db::Database;
use llm::{LlmService, LoggingService, OpenAIService};
use relay::{ChatService, DatabaseStore, ServiceProvider, ToolDispatcher};
use std::net::SocketAddr;
use std::sync::Arc;
use tools::ToolRegistry;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "estate_relay=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let openai = OpenAIService::new(&config.llm)?;
    let llm: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(openai)));
    let provider = ServiceProvider::new(llm);

    if config.llm.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; streaming requests will fail");
    }
    tracing::info!(
        model = provider.model_id(),
        base_url = %config.llm.base_url,
        history_limit = ?config.relay.history_limit,
        "Completion provider configured"
    );

    let chats = ChatService::new(
        DatabaseStore::new(db),
        provider,
        ToolDispatcher::new(ToolRegistry::standard()),
        config.relay.clone(),
    );
    let state = AppState::new(chats);

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_str(origin)?)),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods(Any)
    .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Estate relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
