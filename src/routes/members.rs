use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        access::{AccessGrant, AddMemberRequest, UpdateMemberRequest},
        auth::AuthenticatedUser,
    },
    services::members::MemberService,
    AppState,
};

pub async fn list_members(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<AccessGrant>>, AppError> {
    let members = MemberService::list(&state.store, user.user_id, group_id).await?;
    Ok(Json(members))
}

pub async fn add_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(group_id): Path<i64>,
    Json(body): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<AccessGrant>), AppError> {
    let grant = MemberService::add(&state.store, user.user_id, group_id, &body).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn update_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((group_id, member_id)): Path<(i64, Uuid)>,
    Json(body): Json<UpdateMemberRequest>,
) -> Result<Json<AccessGrant>, AppError> {
    let grant =
        MemberService::update(&state.store, user.user_id, group_id, member_id, &body).await?;
    Ok(Json(grant))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((group_id, member_id)): Path<(i64, Uuid)>,
) -> Result<StatusCode, AppError> {
    MemberService::remove(&state.store, user.user_id, group_id, member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
