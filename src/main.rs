mod analyzer;
mod config;
mod error;
mod gemini;
mod models;
mod normalizer;
mod prompt;
mod retry;
mod routes;
mod schema;

use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{analyzer::AnalysisClient, config::Config, gemini::GeminiClient, routes::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    if config.api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; analysis requests will be rejected until it is configured");
    }
    tracing::info!(model = %config.model, language = %config.language, "Using Gemini endpoint {}", config.api_base);

    let gemini = Arc::new(GeminiClient::new(&config));
    let analyzer = Arc::new(AnalysisClient::new(&config, gemini));
    let state = AppState::new(analyzer, config.history_limit);

    let app = routes::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
