use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    error::AppError,
    middleware::rate_limit::check_rate_limit,
    models::{
        auth::AuthenticatedUser,
        user::{LoginRequest, RefreshTokenRequest, SignupRequest, TokenResponse, UserProfile},
    },
    services::auth::AuthService,
    AppState,
};

/// Extracts the client IP from proxy headers.
/// Priority: X-Real-IP, then the first X-Forwarded-For entry.
fn real_ip(headers: &HeaderMap) -> String {
    if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return ip.to_string();
    }
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            return first.trim().to_string();
        }
    }
    "unknown".to_string()
}

pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    // 5 signups per hour per IP
    let ip = real_ip(&headers);
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &format!("rate:signup:ip:{ip}"), 5, 3600).await?;

    let profile = AuthService::signup(&state.store, &state.config, &body).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    // 10 attempts per 15 min per login name
    let rate_key = format!("rate:login:{}", body.username.trim().to_lowercase());
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &rate_key, 10, 900).await?;

    let tokens = AuthService::login(&state.store, &state.config, &body.username, &body.password).await?;
    Ok(Json(tokens))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let tokens = AuthService::refresh(&state.store, &state.config, &body.refresh_token).await?;
    Ok(Json(tokens))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserProfile>, AppError> {
    let profile = AuthService::me(&state.store, user.user_id).await?;
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn real_ip_prefers_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        assert_eq!(real_ip(&headers), "10.0.0.1");

        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.7"));
        assert_eq!(real_ip(&headers), "192.0.2.7");

        assert_eq!(real_ip(&HeaderMap::new()), "unknown");
    }
}
