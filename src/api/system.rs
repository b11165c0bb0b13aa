//! Service status and health checks.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::{AppState, HealthResponse, StatusResponse};

#[derive(Debug, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthReadinessChecks {
    pub database: bool,
    pub directory: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthReadyResponse {
    pub ready: bool,
    pub checks: HealthReadinessChecks,
}

/// `GET /api/status`
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "AD administration API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mock_mode: state.mock_mode(),
    })
}

/// `GET /api/health`
///
/// Reports component state without failing the request; use
/// `/health/ready` for a readiness check that returns 503.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = state.store().ping().await.is_ok();
    let directory = state.directory.ping().await.is_ok();

    Json(HealthResponse {
        status: if database { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        mock_mode: state.mock_mode(),
        database: Some(if database { "ok" } else { "error" }.to_string()),
        directory: Some(if directory { "ok" } else { "unreachable" }.to_string()),
    })
}

/// `GET /api/health/live`
pub async fn liveness() -> impl IntoResponse {
    Json(HealthLiveResponse { status: "alive" })
}

/// `GET /api/health/ready`
///
/// 503 unless both the database and the directory answer.
pub async fn readiness(State(state): State<Arc<AppState>>) -> Response {
    let database = match state.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Readiness: database ping failed");
            false
        }
    };
    let directory = match state.directory.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Readiness: directory ping failed");
            false
        }
    };

    let ready = database && directory;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthReadyResponse {
            ready,
            checks: HealthReadinessChecks {
                database,
                directory,
            },
        }),
    )
        .into_response()
}
