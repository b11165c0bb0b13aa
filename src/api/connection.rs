use axum::{Json, extract::State};
use std::sync::Arc;

use super::validation::ApiJson;
use super::{
    ApiError, AppState, ConnectionSettingsDto, ConnectionSettingsRequest, ConnectionTestRequest,
    MutationResponse, TestConnectionResponse,
};

/// Always answers 200; the outcome is in the body.
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ConnectionTestRequest>,
) -> Json<TestConnectionResponse> {
    Json(state.connection.test_connection(request).await)
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<ConnectionSettingsDto>>, ApiError> {
    Ok(Json(state.settings.get_connection().await?))
}

pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ConnectionSettingsRequest>,
) -> Result<Json<ConnectionSettingsDto>, ApiError> {
    Ok(Json(state.settings.save_connection(request).await?))
}

pub async fn clear_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MutationResponse>, ApiError> {
    let message = if state.settings.clear_connection().await? {
        "Connection settings cleared"
    } else {
        "No connection settings were saved"
    };
    Ok(Json(MutationResponse::ok(message)))
}
