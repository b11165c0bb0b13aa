use axum::{Json, extract::State};
use std::sync::Arc;

use super::validation::ApiQuery;
use super::{
    ApiError, AppState, ComputerInventory, DaysQuery, InactiveComputersReport,
    PasswordExpiryReport,
};

pub async fn password_expiry(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<DaysQuery>,
) -> Result<Json<PasswordExpiryReport>, ApiError> {
    Ok(Json(state.reports.password_expiry(query).await?))
}

pub async fn inactive_computers(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<DaysQuery>,
) -> Result<Json<InactiveComputersReport>, ApiError> {
    Ok(Json(state.reports.inactive_computers(query).await?))
}

pub async fn computer_inventory(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ComputerInventory>, ApiError> {
    Ok(Json(state.reports.computer_inventory().await?))
}
