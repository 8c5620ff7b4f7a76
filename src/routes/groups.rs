use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppError,
    models::{
        auth::AuthenticatedUser,
        group::{CreateGroupRequest, Group, GroupDetail, GroupSummary, UpdateGroupRequest},
        task::Task,
    },
    services::{groups::GroupService, tasks::TaskService},
    AppState,
};

pub async fn list_groups(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<GroupSummary>>, AppError> {
    let groups = GroupService::list(&state.store, user.user_id).await?;
    Ok(Json(groups))
}

pub async fn create_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), AppError> {
    let group = GroupService::create(&state.store, user.user_id, &body).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<GroupDetail>, AppError> {
    let detail = GroupService::detail(&state.store, user.user_id, id).await?;
    Ok(Json(detail))
}

pub async fn update_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateGroupRequest>,
) -> Result<Json<Group>, AppError> {
    let group = GroupService::update(&state.store, user.user_id, id, &body).await?;
    Ok(Json(group))
}

pub async fn delete_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    GroupService::delete(&state.store, user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_group_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = TaskService::list(&state.store, user.user_id, id).await?;
    Ok(Json(tasks))
}
