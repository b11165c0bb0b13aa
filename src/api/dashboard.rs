use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, AppState, DashboardStats};

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.reports.dashboard().await?))
}
