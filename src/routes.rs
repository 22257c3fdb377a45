//! Read-only introspection endpoints.
//!
//! Mount wherever the host sees fit, e.g.
//! `router.nest("/debug/profiling", routes::router(manager))`:
//!
//! - `GET /status` — enabled flag, stats, task counts; `?detail=true` adds
//!   the task table
//! - `GET /tasks` — tasks partitioned into active and expired
//! - `GET /stats` — flattened stats with a success rate

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::manager::Manager;

/// Build the introspection router.
pub fn router(manager: Arc<Manager>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/tasks", get(tasks))
        .route("/stats", get(stats))
        .with_state(manager)
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(default)]
    detail: bool,
}

async fn status(
    State(manager): State<Arc<Manager>>,
    Query(query): Query<StatusQuery>,
) -> Json<serde_json::Value> {
    if !manager.is_enabled() {
        return Json(json!({
            "enabled": false,
            "message": "Profiling disabled",
        }));
    }

    let stats = manager.stats().await;
    let tasks = manager.tasks().await;

    let now = Utc::now();
    let active_tasks = tasks.values().filter(|t| !t.is_expired(now)).count();

    let mut response = json!({
        "enabled": true,
        "stats": stats,
        "active_tasks": active_tasks,
        "total_tasks": tasks.len(),
        "profile_dir": manager.options().profile_dir.display().to_string(),
    });

    if query.detail {
        response["tasks"] = serde_json::to_value(&tasks).unwrap_or_default();
    }

    Json(response)
}

async fn tasks(State(manager): State<Arc<Manager>>) -> Response {
    if !manager.is_enabled() {
        return not_enabled();
    }

    let tasks = manager.tasks().await;
    let now = Utc::now();
    let (active, expired): (Vec<_>, Vec<_>) = tasks
        .values()
        .cloned()
        .partition(|task| !task.is_expired(now));

    Json(json!({
        "active_tasks": active,
        "expired_tasks": expired,
        "total": tasks.len(),
    }))
    .into_response()
}

async fn stats(State(manager): State<Arc<Manager>>) -> Response {
    if !manager.is_enabled() {
        return not_enabled();
    }

    let stats = manager.stats().await;
    let success_rate = if stats.total_requests > 0 {
        stats.profiled_count as f64 / stats.total_requests as f64 * 100.0
    } else {
        0.0
    };

    Json(json!({
        "total_requests": stats.total_requests,
        "profiled_count": stats.profiled_count,
        "failed_count": stats.failed_count,
        "active_profiles": stats.active_profiles,
        "success_rate": success_rate,
        "last_update": stats.last_update.to_rfc3339(),
    }))
    .into_response()
}

fn not_enabled() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "Profiling not enabled"})),
    )
        .into_response()
}
