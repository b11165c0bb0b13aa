use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, AppState, OrganizationalUnitDto};

pub async fn list_ous(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OrganizationalUnitDto>>, ApiError> {
    Ok(Json(state.directory.list_ous().await?))
}
