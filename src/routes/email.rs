use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::AppError, models::auth::AuthenticatedUser, services::reports::ReportService, AppState,
};

/// POST /email/dashboard: queues the caller's dashboard report.
/// Delivery happens in the background; the response never waits for SMTP.
pub async fn send_dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<(StatusCode, Json<Value>), AppError> {
    ReportService::dashboard(&state.store, state.notifications.as_ref(), user.user_id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))))
}
