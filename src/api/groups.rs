use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::validation::{ApiJson, validate_object_name};
use super::{
    ApiError, AppState, CreateGroupRequest, GroupDto, GroupMemberDto, GroupMemberRequest,
    MutationResponse,
};
use crate::services::Operator;

pub async fn list_groups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<GroupDto>>, ApiError> {
    Ok(Json(state.directory.list_groups().await?))
}

pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<GroupDto>, ApiError> {
    let name = validate_object_name("Group name", &name)?;
    Ok(Json(state.directory.get_group(name).await?))
}

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<GroupMemberDto>>, ApiError> {
    let name = validate_object_name("Group name", &name)?;
    Ok(Json(state.directory.list_group_members(name).await?))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    operator: Operator,
    ApiJson(request): ApiJson<CreateGroupRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(state.directory.create_group(&operator, request).await?))
}

pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    operator: Operator,
    Path(name): Path<String>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(state.directory.delete_group(&operator, &name).await?))
}

pub async fn add_member(
    State(state): State<Arc<AppState>>,
    operator: Operator,
    Path(name): Path<String>,
    ApiJson(request): ApiJson<GroupMemberRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(
        state
            .directory
            .add_group_member(&operator, &name, &request.sam_account_name)
            .await?,
    ))
}

pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    operator: Operator,
    Path(name): Path<String>,
    ApiJson(request): ApiJson<GroupMemberRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(
        state
            .directory
            .remove_group_member(&operator, &name, &request.sam_account_name)
            .await?,
    ))
}
