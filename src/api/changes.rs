use axum::{Json, extract::State};
use std::sync::Arc;

use super::validation::ApiQuery;
use super::{ApiError, AppState, ChangesQuery, ChangesResponse};

pub async fn list_recent(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ChangesQuery>,
) -> Result<Json<ChangesResponse>, ApiError> {
    Ok(Json(state.changes.list_recent(query).await?))
}
