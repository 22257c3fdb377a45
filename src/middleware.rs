//! Per-request profiling adapter for axum.
//!
//! Wire it into a router with
//! `axum::middleware::from_fn_with_state(manager, middleware::profile)`.
//! Profiling failures never reach the client: the handler's own response is
//! returned unchanged whether or not a session was captured.

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, warn};

use crate::manager::Manager;

/// Profile requests that match a declared task.
///
/// The handler runs on its own task. The middleware waits for the first of
/// handler completion or the task's duration window; the window elapsing
/// releases the middleware to capture the artifact but never cancels the
/// handler, whose response is still awaited and returned.
pub async fn profile(
    State(manager): State<Arc<Manager>>,
    req: Request,
    next: Next,
) -> Response {
    if !manager.is_enabled() {
        return next.run(req).await;
    }

    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let method = req.method().as_str().to_owned();

    let Some(admission) = manager.should_profile(&path, &method).await else {
        return next.run(req).await;
    };

    let window = admission.task.session_timeout();

    let active = match manager.start_profiling(&path, admission).await {
        Ok(active) => active,
        // Already counted and logged by the manager; the request proceeds
        // unprofiled.
        Err(_) => return next.run(req).await,
    };

    let mut handler = tokio::spawn(next.run(req));

    let early_response = match tokio::time::timeout(window, &mut handler).await {
        Ok(join_result) => Some(handler_response(join_result, &path)),
        Err(_) => {
            warn!(
                path = %path,
                timeout_secs = window.as_secs(),
                "request still running at the end of its profiling window"
            );
            None
        }
    };

    let result = manager.stop_profiling(&path, &method, active).await;
    if result.success {
        debug!(
            path = %path,
            filename = result.filename.as_deref().unwrap_or(""),
            duration_ms = result.duration_ms,
            "profiling finished"
        );
    }

    match early_response {
        Some(response) => response,
        None => handler_response(handler.await, &path),
    }
}

/// Unwrap the spawned handler's outcome, converting a panic into a 500.
///
/// A panicking handler does not mark the profiling session failed; the
/// session's own capture already ran its course independently.
fn handler_response(
    join_result: std::result::Result<Response, tokio::task::JoinError>,
    path: &str,
) -> Response {
    match join_result {
        Ok(response) => response,
        Err(e) => {
            let message = if e.is_panic() {
                let payload = e.into_panic();
                if let Some(msg) = payload.downcast_ref::<String>() {
                    msg.clone()
                } else if let Some(msg) = payload.downcast_ref::<&str>() {
                    (*msg).to_string()
                } else {
                    "unknown panic".to_string()
                }
            } else {
                e.to_string()
            };

            error!(path = %path, panic_message = %message, "handler panicked during profiling");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}
