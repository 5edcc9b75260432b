//! Read-only admin surface: queue and task visibility for operators. No
//! write endpoints — accepting new scans over HTTP is out of scope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use scan_core::handler::TaskRepository;
use scan_core::queue::QueueStore;
use scan_model::TaskId;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::AdminError;

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn QueueStore>,
    pub repo: Arc<dyn TaskRepository>,
    pub supervisor_ticked: Arc<AtomicBool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/queue", get(queue))
        .route("/tasks/{task_id}", get(task_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> (axum::http::StatusCode, Json<Value>) {
    if state.supervisor_ticked.load(Ordering::Relaxed) {
        (axum::http::StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        )
    }
}

#[derive(Serialize)]
struct QueueEntryView {
    report_id: String,
    handler_pid: Option<u32>,
    position: u64,
}

async fn queue(State(state): State<AppState>) -> Result<Json<Vec<QueueEntryView>>, AdminError> {
    let entries = state.queue.iterate().await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|e| QueueEntryView {
                report_id: e.report_id.to_string(),
                handler_pid: e.handler_pid,
                position: e.position,
            })
            .collect(),
    ))
}

async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, AdminError> {
    let uuid = uuid::Uuid::parse_str(&task_id)
        .map_err(|_| AdminError::new(axum::http::StatusCode::BAD_REQUEST, "invalid task id"))?;
    let status = state.repo.task_status(&TaskId::from(uuid)).await?;
    Ok(Json(json!({ "task_id": task_id, "status": status })))
}
