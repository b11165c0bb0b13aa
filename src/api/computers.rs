use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::validation::{ApiJson, ApiQuery, validate_object_name};
use super::{
    AccountStatusRequest, ApiError, AppState, ComputerDto, ComputerListQuery, ComputersPage,
    GroupMembershipRequest, MoveComputerRequest, MutationResponse, PaginationQuery,
};
use crate::services::Operator;

pub async fn list_computers(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ComputerListQuery>,
) -> Result<Json<Vec<ComputerDto>>, ApiError> {
    Ok(Json(state.directory.list_computers(query).await?))
}

pub async fn list_computers_paginated(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<PaginationQuery>,
) -> Result<Json<ComputersPage>, ApiError> {
    Ok(Json(state.directory.list_computers_paginated(query).await?))
}

pub async fn get_computer(
    State(state): State<Arc<AppState>>,
    Path(sam): Path<String>,
) -> Result<Json<ComputerDto>, ApiError> {
    let sam = validate_object_name("sAMAccountName", &sam)?;
    Ok(Json(state.directory.get_computer(sam).await?))
}

pub async fn set_account_status(
    State(state): State<Arc<AppState>>,
    operator: Operator,
    Path(sam): Path<String>,
    ApiJson(request): ApiJson<AccountStatusRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(
        state
            .directory
            .set_computer_status(&operator, &sam, request)
            .await?,
    ))
}

pub async fn add_to_group(
    State(state): State<Arc<AppState>>,
    operator: Operator,
    Path(sam): Path<String>,
    ApiJson(request): ApiJson<GroupMembershipRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(
        state
            .directory
            .add_computer_to_group(&operator, &sam, &request.group_name)
            .await?,
    ))
}

pub async fn remove_from_group(
    State(state): State<Arc<AppState>>,
    operator: Operator,
    Path(sam): Path<String>,
    ApiJson(request): ApiJson<GroupMembershipRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(
        state
            .directory
            .remove_computer_from_group(&operator, &sam, &request.group_name)
            .await?,
    ))
}

pub async fn move_computer(
    State(state): State<Arc<AppState>>,
    operator: Operator,
    Path(sam): Path<String>,
    ApiJson(request): ApiJson<MoveComputerRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(
        state
            .directory
            .move_computer(&operator, &sam, &request.target_ou_dn)
            .await?,
    ))
}
