//! Read-only status server over the state store.
//!
//! Routes:
//!
//! - `GET /` the HTML page
//! - `GET /api/failures` every tracked failure, newest first
//! - `GET /api/failures/{id}` one full record
//! - `GET /api/status` counts per phase and the last cycle summary
//! - `GET /health`

mod handlers;

pub use handlers::{FailureView, FailuresResponse, StatusResponse};

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::store::StateStore;

pub struct DashboardState {
    pub store: StateStore,
    pub started_at: DateTime<Utc>,
}

pub fn router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/failures", get(handlers::list_failures))
        .route("/api/failures/{id}", get(handlers::get_failure))
        .route("/api/status", get(handlers::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(store: StateStore, host: &str, port: u16) -> Result<()> {
    let state = Arc::new(DashboardState {
        store,
        started_at: Utc::now(),
    });
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(address = %addr, "dashboard listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Dashboard server failed")?;
    tracing::info!("dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
