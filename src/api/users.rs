use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::validation::{ApiJson, ApiQuery, validate_object_name};
use super::{
    AccountStatusRequest, ApiError, AppState, GroupMembershipRequest, MutationResponse,
    PaginationQuery, ResetPasswordRequest, UserDto, UserListQuery, UsersPage,
};
use crate::services::Operator;

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    Ok(Json(state.directory.list_users(query).await?))
}

pub async fn list_users_paginated(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<PaginationQuery>,
) -> Result<Json<UsersPage>, ApiError> {
    Ok(Json(state.directory.list_users_paginated(query).await?))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(sam): Path<String>,
) -> Result<Json<UserDto>, ApiError> {
    let sam = validate_object_name("sAMAccountName", &sam)?;
    Ok(Json(state.directory.get_user(sam).await?))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    operator: Operator,
    Path(sam): Path<String>,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(
        state
            .directory
            .reset_password(&operator, &sam, request)
            .await?,
    ))
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
            .set_user_status(&operator, &sam, request)
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
            .add_user_to_group(&operator, &sam, &request.group_name)
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
            .remove_user_from_group(&operator, &sam, &request.group_name)
            .await?,
    ))
}
