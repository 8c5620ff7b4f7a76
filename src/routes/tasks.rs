use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppError,
    models::{
        auth::AuthenticatedUser,
        task::{CreateTaskRequest, Task, UpdateTaskRequest},
    },
    services::tasks::TaskService,
    AppState,
};

pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = TaskService::create(&state.store, user.user_id, &body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let task = TaskService::update(&state.store, user.user_id, id, &body).await?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    TaskService::delete(&state.store, user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart upload; the image is read from the `file` field.
pub async fn upload_task_photo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Task>, AppError> {
    let bad_body = |e: axum::extract::multipart::MultipartError| {
        AppError::Validation(format!("Invalid multipart body: {e}"))
    };

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_body)? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await.map_err(bad_body)?;
            upload = Some((filename, bytes));
        }
    }
    let (filename, bytes) =
        upload.ok_or_else(|| AppError::Validation("Missing file field".into()))?;

    let task = TaskService::attach_photo(
        &state.store,
        user.user_id,
        id,
        &state.config.media_dir,
        &filename,
        &bytes,
    )
    .await?;
    Ok(Json(task))
}
