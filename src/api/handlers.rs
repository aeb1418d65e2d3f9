use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::core::metrics;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let api = state.settings().api();
    Json(RootResponse {
        message: api.project_name.clone(),
        version: api.version.clone(),
        api_prefix: api.api_v1_str.clone(),
    })
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    match state.db() {
        Some(pool) => match repositories::health::ping(pool).await {
            Ok(()) => {
                components.insert("database".to_string(), "healthy".to_string());
            }
            Err(err) => {
                components.insert("database".to_string(), format!("unhealthy: {err}"));
                status = "unhealthy".to_string();
            }
        },
        None => {
            components.insert("database".to_string(), "not configured".to_string());
        }
    }

    let live = state.sessions().live_count().await;
    components.insert("sessions".to_string(), format!("{live} live"));

    Json(HealthResponse { service: "cbt-engine".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
