mod config;
mod error;
mod handlers;
mod models;
mod services;
mod storage;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::handlers::{download, index, upload};
use crate::services::{deletion_queue, shortener, DeletionQueue, Sweeper, UrlShortener};
use crate::storage::StorageProvider;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn StorageProvider>,
    pub shortener: Arc<dyn UrlShortener>,
    pub deletions: DeletionQueue,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oncedrop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting oncedrop...");

    // Load configuration
    let config = Arc::new(Config::load()?);
    tracing::info!("Configuration loaded");

    let storage = storage::create_provider(&config.storage)?;
    tracing::info!("Storage backend: {}", storage.storage_type());

    // Background work: post-download deletions and the expiry sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (deletions, deletion_worker) =
        deletion_queue(storage.clone(), config.expiry.delete_delay());
    let deletion_task = tokio::spawn(deletion_worker.run(shutdown_rx.clone()));

    let sweeper = Sweeper::new(storage.clone(), config.expiry.max_age());
    let sweeper_task = tokio::spawn(sweeper.run(config.expiry.sweep_interval(), shutdown_rx));

    let state = AppState {
        config: config.clone(),
        storage,
        shortener: shortener::from_config(&config.upload.short_url_service),
        deletions,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped, finishing background work");
    // Receivers may already be gone if a task ended early
    let _ = shutdown_tx.send(true);
    if let Err(e) = deletion_task.await {
        tracing::error!("Deletion worker failed: {}", e);
    }
    if let Err(e) = sweeper_task.await {
        tracing::error!("Sweeper failed: {}", e);
    }

    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route(
            "/",
            get(index::root)
                .put(upload::upload_file)
                .fallback(index::method_not_allowed),
        )
        .route(
            "/:key",
            get(download::download_file)
                .head(download::head_file)
                .put(upload::upload_file)
                .fallback(index::method_not_allowed),
        )
        .route(
            "/:key/*rest",
            get(index::not_found)
                .put(upload::upload_file)
                .fallback(index::method_not_allowed),
        )
        .fallback(index::fallback)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
