//! Inbound HTTP surface.
//!
//! - `POST /report-failure` runs one diagnosis for a failing pod
//! - `GET /health` reports liveness and the number of routable tools

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::agent_core::{run_agent, FailureReport};
use crate::AppContext;

/// Build the router over a shared context.
pub fn create_router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/report-failure", post(report_failure))
        .route("/health", get(health))
        .with_state(context)
}

async fn report_failure(
    State(context): State<Arc<AppContext>>,
    Json(report): Json<FailureReport>,
) -> Response {
    if let Some(field) = report.missing_field() {
        tracing::warn!(field, "rejecting failure report with empty field");
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "status": "error",
                "detail": format!("'{field}' must not be empty"),
            })),
        )
            .into_response();
    }

    tracing::info!(
        namespace = %report.namespace,
        pod = %report.pod_name,
        container = report.container().unwrap_or("(not specified)"),
        "received failure report"
    );

    let run = run_agent(&context.llm, &context.registry, &context.settings, &report).await;

    tracing::info!(
        outcome = ?run.outcome,
        iterations = run.iterations,
        tool_calls = run.tool_calls,
        "failure report processed"
    );

    Json(json!({
        "status": "success",
        "result": run.result,
        "outcome": run.outcome,
        "iterations": run.iterations,
        "tool_calls": run.tool_calls,
    }))
    .into_response()
}

async fn health(State(context): State<Arc<AppContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "tools": context.registry.len(),
        "unavailable_servers": context.registry.unavailable_servers(),
    }))
}
