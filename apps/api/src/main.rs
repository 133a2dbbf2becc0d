mod config;
mod errors;
mod llm_client;
mod rewrite;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::rewrite::{LlmEmbedder, LlmRewriter, RewriteOrchestrator};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={level},rewrite::audit={level}",
                env!("CARGO_PKG_NAME"),
                level = &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rewriter v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client (shared by generation and embeddings)
    let llm = LlmClient::new(
        config.openai_api_key.clone(),
        &config.openai_base_url,
        config.llm_http_timeout,
    );
    info!(
        "LLM client initialized (model: {}, embeddings: {})",
        config.default_model, config.embedding_model
    );

    let rewriter = Arc::new(LlmRewriter::new(llm.clone(), config.default_model.clone()));
    let embedder = Arc::new(LlmEmbedder::new(llm, config.embedding_model.clone()));
    let orchestrator = RewriteOrchestrator::new(rewriter, embedder, config.rewrite.clone());
    info!(
        "Rewrite settings: attempts {}/{}, mode {}, thresholds strict {} balanced {}, fallback {:?}",
        config.rewrite.default_max_attempts,
        config.rewrite.max_attempts_limit,
        config.rewrite.default_mode,
        config.rewrite.thresholds.strict,
        config.rewrite.thresholds.balanced,
        config.rewrite.fallback
    );

    let shutdown = CancellationToken::new();

    // Build app state
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        config: config.clone(),
        shutdown: shutdown.clone(),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict origins once the web form has a fixed host
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C and cancels every in-flight rewrite run.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, cancelling in-flight rewrites");
    shutdown.cancel();
}
