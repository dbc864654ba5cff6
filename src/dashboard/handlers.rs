use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::DashboardState;
use crate::models::CycleSummary;
use crate::store::{StateStore, TrackedFailure};

const PAGE: &str = include_str!("../../assets/dashboard.html");

/// List entry for one tracked failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureView {
    pub correlation_id: String,
    pub repo: String,
    pub workflow: String,
    pub branch: String,
    pub run_id: u64,
    pub html_url: String,
    pub phase: String,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub category: Option<String>,
    pub summary: Option<String>,
    pub issue_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&TrackedFailure> for FailureView {
    fn from(tracked: &TrackedFailure) -> Self {
        Self {
            correlation_id: tracked.correlation_id().to_string(),
            repo: tracked.failure.repo.full_name(),
            workflow: tracked.failure.workflow_name.clone(),
            branch: tracked.failure.head_branch.clone(),
            run_id: tracked.failure.run_id,
            html_url: tracked.failure.html_url.clone(),
            phase: tracked.phase().name().to_string(),
            attempts_made: tracked.retry.attempts_made(),
            max_attempts: tracked.retry.max_attempts(),
            category: tracked.diagnosis.as_ref().map(|d| d.category.to_string()),
            summary: tracked.diagnosis.as_ref().map(|d| d.summary.clone()),
            issue_url: tracked
                .escalation
                .as_ref()
                .and_then(|e| e.issue_url.clone()),
            created_at: tracked.failure.created_at,
            updated_at: tracked.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FailuresResponse {
    pub failures: Vec<FailureView>,
    pub count: usize,
    pub last_scan: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub tracked: usize,
    pub by_phase: BTreeMap<String, usize>,
    pub last_cycle: Option<CycleSummary>,
    pub uptime_seconds: i64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Run a blocking store read off the async workers.
async fn with_store<T, F>(state: &Arc<DashboardState>, read: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&StateStore) -> anyhow::Result<T> + Send + 'static,
{
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || read(&store)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!(error = %format!("{e:#}"), "failed to read state store");
            Err(error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read state"))
        }
        Err(e) => {
            tracing::error!(error = %e, "state reader panicked");
            Err(error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read state"))
        }
    }
}

pub async fn index() -> Html<&'static str> {
    Html(PAGE)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "medic",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn list_failures(State(state): State<Arc<DashboardState>>) -> Response {
    let result = with_store(&state, |store| {
        let failures: Vec<FailureView> = store.list()?.iter().map(FailureView::from).collect();
        let last_scan = store.load_summary()?.and_then(|s| s.finished_at);
        Ok(FailuresResponse {
            count: failures.len(),
            failures,
            last_scan,
        })
    })
    .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(response) => response,
    }
}

pub async fn get_failure(
    State(state): State<Arc<DashboardState>>,
    Path(id): Path<String>,
) -> Response {
    if !is_correlation_id(&id) {
        return error(StatusCode::BAD_REQUEST, format!("invalid correlation id: {id}"));
    }

    match with_store(&state, move |store| store.load(&id)).await {
        Ok(Some(tracked)) => Json(tracked).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, "no such failure"),
        Err(response) => response,
    }
}

pub async fn status(State(state): State<Arc<DashboardState>>) -> Response {
    let started_at = state.started_at;
    let result = with_store(&state, move |store| {
        let records = store.list()?;
        let mut by_phase: BTreeMap<String, usize> = BTreeMap::new();
        for record in &records {
            *by_phase.entry(record.phase().name().to_string()).or_default() += 1;
        }
        Ok(StatusResponse {
            tracked: records.len(),
            by_phase,
            last_cycle: store.load_summary()?,
            uptime_seconds: (Utc::now() - started_at).num_seconds(),
        })
    })
    .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(response) => response,
    }
}

/// `wf-` followed by 16 lowercase hex digits.
fn is_correlation_id(id: &str) -> bool {
    id.strip_prefix("wf-")
        .map(|hex| hex.len() == 16 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}
