use axum::{Json, extract::State};
use std::sync::Arc;

use super::validation::ApiQuery;
use super::{ApiError, AppState, AuditLogQuery, AuditLogsResponse, AuditStatistics};

pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<AuditLogQuery>,
) -> Result<Json<AuditLogsResponse>, ApiError> {
    Ok(Json(state.audit.list(query).await?))
}

pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AuditStatistics>, ApiError> {
    Ok(Json(state.audit.statistics().await?))
}
