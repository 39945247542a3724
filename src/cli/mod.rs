//! CLI module for the llm-doctor server.
//!
//! This module provides the `llm-doctor serve` command implementation.

mod config;
mod handlers;
mod middleware;
mod state;

pub use config::{Config, ConfigError, FakeConfig, HistoryConfig, PassthroughSection, ServerConfig};
pub use handlers::AppError;
pub use state::AppState;

use crate::stats::new_shared_stats;
use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

/// Build the application router around shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    let stats = state.stats.clone();
    let on_panic = move |_: Box<dyn std::any::Any + Send + 'static>| {
        stats.record_error();
        AppError::Internal("internal server error".to_string()).into_response()
    };

    Router::new()
        .route("/health", get(handlers::health))
        // OpenAI API routes
        .route("/v1/completions", post(handlers::completions))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/models/{model_id}", get(handlers::get_model))
        // Inspection and control
        .route("/doctor/stats", get(handlers::get_stats))
        .route(
            "/doctor/history",
            get(handlers::get_history).delete(handlers::clear_history),
        )
        .route(
            "/doctor/errors",
            get(handlers::get_errors)
                .post(handlers::enable_error)
                .delete(handlers::disable_errors),
        )
        .route("/doctor/errors/toggle", post(handlers::toggle_errors))
        .route(
            "/doctor/passthrough/toggle",
            post(handlers::toggle_passthrough),
        )
        .layer(CatchPanicLayer::custom(on_panic))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the llm-doctor server with the given configuration
pub async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(config, new_shared_stats()));
    run_server_with_state(state).await
}

/// Run the llm-doctor server on existing shared state
pub async fn run_server_with_state(state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()?;

    tracing::info!("Starting llm-doctor server on {}", addr);
    tracing::info!(
        latency_ms = state.config.fake.latency_ms,
        stream_delay_ms = state.config.fake.stream_delay_ms,
        history = state.config.history.capacity,
        "Fake response configuration"
    );
    let passthrough = state.passthrough.status();
    tracing::info!(
        enabled = passthrough.enabled,
        base_url = %passthrough.base_url,
        model = passthrough.model.as_deref().unwrap_or("request"),
        "Passthrough configuration"
    );
    tracing::info!("OpenAI endpoints: /v1/...");
    tracing::info!("Control endpoints: /doctor/...");

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
