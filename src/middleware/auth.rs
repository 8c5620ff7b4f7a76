use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::error::{AppError, AppResult};
use crate::models::auth::{AuthenticatedUser, Claims};
use crate::services::auth::AuthService;
use crate::AppState;

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = decode_bearer(parts, &state.config.jwt_secret)?;
        AuthService::resolve(&state.store, claims).await
    }
}

/// Reads the `Authorization: Bearer` header and checks the token signature
/// and expiry. The account itself is checked by [`AuthService::resolve`].
pub fn decode_bearer(parts: &Parts, secret: &str) -> AppResult<AuthenticatedUser> {
    let auth_header = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".into()))?;

    decode_access_token(token, secret)
        .map_err(|_| AppError::Unauthorized("Could not validate credentials".into()))
}

pub fn decode_access_token(token: &str, secret: &str) -> Result<AuthenticatedUser, anyhow::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &key, &validation)?;
    let claims = data.claims;

    Ok(AuthenticatedUser {
        user_id: claims.sub.parse()?,
        username: claims.username,
    })
}
