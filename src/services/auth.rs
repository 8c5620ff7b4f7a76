use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{Store, StoreTx, UserStore},
    error::{AppError, AppResult},
    models::{
        auth::{AuthenticatedUser, Claims, RefreshClaims},
        user::{NewUser, SignupRequest, TokenResponse, User, UserProfile},
    },
    services::metrics,
};

const BAD_CREDENTIALS: &str = "Incorrect username or password";

pub struct AuthService;

impl AuthService {
    /// Registers a new account. The password is stored as a bcrypt hash only.
    pub async fn signup<S: Store>(
        store: &S,
        config: &Config,
        req: &SignupRequest,
    ) -> AppResult<UserProfile> {
        req.validate()?;
        let username = req.username.trim();
        let email = req.email.trim().to_lowercase();

        let mut tx = store.begin().await?;
        if tx.user_exists(username, &email).await? {
            return Err(AppError::Conflict("User already exists".into()));
        }

        let password_hash = bcrypt::hash(&req.password, config.bcrypt_cost)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;
        let user = tx
            .insert_user(NewUser {
                username: username.to_string(),
                email,
                password_hash,
                name: req.name.clone(),
                surname: req.surname.clone(),
            })
            .await?;
        tx.commit().await?;

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user.into())
    }

    /// Checks credentials and issues a token pair. `login` matches either
    /// the username or the email address.
    pub async fn login<S: Store>(
        store: &S,
        config: &Config,
        login: &str,
        password: &str,
    ) -> AppResult<TokenResponse> {
        let mut tx = store.begin().await?;
        let user = tx.find_user_by_login(login.trim()).await?;

        let user = match user {
            Some(u) if password_matches(Some(&u), password, config.bcrypt_cost) && u.is_active => u,
            other => {
                if other.is_none() {
                    password_matches(None, password, config.bcrypt_cost);
                }
                metrics::record_login("failure");
                return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
            }
        };

        metrics::record_login("success");
        info!(user_id = %user.id, "login");
        Self::issue_tokens(&user, config)
    }

    /// Exchanges a valid refresh token for a new pair.
    pub async fn refresh<S: Store>(
        store: &S,
        config: &Config,
        refresh_token: &str,
    ) -> AppResult<TokenResponse> {
        let invalid = || AppError::Unauthorized("Invalid refresh token".into());

        let key = DecodingKey::from_secret(config.jwt_refresh_secret.as_bytes());
        let data = decode::<RefreshClaims>(refresh_token, &key, &Validation::new(Algorithm::HS256))
            .map_err(|_| invalid())?;
        let user_id: Uuid = data.claims.sub.parse().map_err(|_| invalid())?;

        let mut tx = store.begin().await?;
        let user = tx
            .find_user(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(invalid)?;

        Self::issue_tokens(&user, config)
    }

    pub async fn me<S: Store>(store: &S, user_id: Uuid) -> AppResult<UserProfile> {
        let mut tx = store.begin().await?;
        tx.find_user(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    /// Maps a decoded access token to a live account. Tokens of deleted or
    /// deactivated users stop working immediately.
    pub async fn resolve<S: Store>(
        store: &S,
        claims: AuthenticatedUser,
    ) -> AppResult<AuthenticatedUser> {
        let mut tx = store.begin().await?;
        let user = tx
            .find_user(claims.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Unauthorized("Could not validate credentials".into()))?;
        Ok(AuthenticatedUser {
            user_id: user.id,
            username: user.username,
        })
    }

    /// Enables or disables an account, looked up by username or email.
    pub async fn set_active<S: Store>(store: &S, login: &str, active: bool) -> AppResult<UserProfile> {
        let mut tx = store.begin().await?;
        let user = tx
            .find_user_by_login(login.trim())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        let user = tx.set_user_active(user.id, active).await?;
        tx.commit().await?;

        info!(user_id = %user.id, active, "user activation changed");
        Ok(user.into())
    }

    fn issue_tokens(user: &User, config: &Config) -> AppResult<TokenResponse> {
        let access_token =
            Self::generate_access_token(user, &config.jwt_secret, config.jwt_expiry_seconds)?;
        let refresh_token = Self::generate_refresh_token(
            &user.id,
            &config.jwt_refresh_secret,
            config.jwt_refresh_expiry_days,
        )?;
        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "bearer",
        })
    }

    pub fn generate_access_token(
        user: &User,
        secret: &str,
        ttl_seconds: u64,
    ) -> anyhow::Result<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iat: now,
            exp: now + ttl_seconds as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }

    fn generate_refresh_token(
        user_id: &Uuid,
        secret: &str,
        ttl_days: u64,
    ) -> anyhow::Result<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + (ttl_days * 86400) as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }
}

/// Runs one bcrypt round whether or not the account exists, so a missing
/// user costs the same time as a wrong password.
fn password_matches(user: Option<&User>, password: &str, cost: u32) -> bool {
    match user {
        Some(u) => bcrypt::verify(password, &u.password_hash).unwrap_or(false),
        None => {
            let _ = bcrypt::hash(password, cost);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::db::MemoryStore;
    use crate::middleware::auth::decode_access_token;

    fn signup_req(username: &str, email: &str) -> SignupRequest {
        SignupRequest {
            username: username.into(),
            email: email.into(),
            password: "correct horse".into(),
            name: Some("Alice".into()),
            surname: None,
        }
    }

    #[tokio::test]
    async fn signup_then_login_by_username_or_email() {
        let store = MemoryStore::new();
        let config = test_config();

        let profile = AuthService::signup(&store, &config, &signup_req("alice", "Alice@Example.com"))
            .await
            .unwrap();
        assert_eq!(profile.email, "alice@example.com");

        for login in ["alice", "alice@example.com"] {
            let tokens = AuthService::login(&store, &config, login, "correct horse")
                .await
                .unwrap();
            let user = decode_access_token(&tokens.access_token, &config.jwt_secret).unwrap();
            assert_eq!(user.user_id, profile.id);
            assert_eq!(user.username, "alice");
        }
    }

    #[tokio::test]
    async fn signup_rejects_duplicates() {
        let store = MemoryStore::new();
        let config = test_config();
        AuthService::signup(&store, &config, &signup_req("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = AuthService::signup(&store, &config, &signup_req("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = AuthService::signup(&store, &config, &signup_req("bob", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_failures_share_one_message() {
        let store = MemoryStore::new();
        let config = test_config();
        AuthService::signup(&store, &config, &signup_req("alice", "alice@example.com"))
            .await
            .unwrap();

        let wrong_password = AuthService::login(&store, &config, "alice", "nope")
            .await
            .unwrap_err();
        let unknown_user = AuthService::login(&store, &config, "mallory", "correct horse")
            .await
            .unwrap_err();
        assert!(matches!(wrong_password, AppError::Unauthorized(_)));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn refresh_issues_a_new_pair_and_rejects_access_tokens() {
        let store = MemoryStore::new();
        let config = test_config();
        AuthService::signup(&store, &config, &signup_req("alice", "alice@example.com"))
            .await
            .unwrap();
        let tokens = AuthService::login(&store, &config, "alice", "correct horse")
            .await
            .unwrap();

        let renewed = AuthService::refresh(&store, &config, &tokens.refresh_token)
            .await
            .unwrap();
        assert!(decode_access_token(&renewed.access_token, &config.jwt_secret).is_ok());

        let err = AuthService::refresh(&store, &config, &tokens.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn me_returns_profile_without_hash() {
        let store = MemoryStore::new();
        let config = test_config();
        let profile = AuthService::signup(&store, &config, &signup_req("alice", "alice@example.com"))
            .await
            .unwrap();

        let me = AuthService::me(&store, profile.id).await.unwrap();
        assert_eq!(me, profile);
        let json = serde_json::to_value(&me).unwrap();
        assert!(json.get("password_hash").is_none());

        let err = AuthService::me(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn login_accepts_email_as_typed_at_signup() {
        let store = MemoryStore::new();
        let config = test_config();
        AuthService::signup(&store, &config, &signup_req("alice", "Alice@Example.com"))
            .await
            .unwrap();

        for login in ["Alice@Example.com", "ALICE@example.COM"] {
            assert!(AuthService::login(&store, &config, login, "correct horse").await.is_ok());
        }
    }

    #[test]
    fn unknown_account_still_runs_bcrypt_and_fails() {
        let config = test_config();
        assert!(!password_matches(None, "correct horse", config.bcrypt_cost));

        let hash = bcrypt::hash("correct horse", config.bcrypt_cost).unwrap();
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: hash,
            name: None,
            surname: None,
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(password_matches(Some(&user), "correct horse", config.bcrypt_cost));
        assert!(!password_matches(Some(&user), "wrong", config.bcrypt_cost));
    }

    #[tokio::test]
    async fn deactivated_user_is_rejected_everywhere() {
        let store = MemoryStore::new();
        let config = test_config();
        AuthService::signup(&store, &config, &signup_req("alice", "alice@example.com"))
            .await
            .unwrap();
        let tokens = AuthService::login(&store, &config, "alice", "correct horse")
            .await
            .unwrap();
        let claims = decode_access_token(&tokens.access_token, &config.jwt_secret).unwrap();
        assert_eq!(AuthService::resolve(&store, claims.clone()).await.unwrap(), claims);

        let profile = AuthService::set_active(&store, "alice@example.com", false)
            .await
            .unwrap();
        assert!(!profile.is_active);

        let err = AuthService::resolve(&store, claims.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        let err = AuthService::login(&store, &config, "alice", "correct horse")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), AppError::Unauthorized(BAD_CREDENTIALS.into()).to_string());
        let err = AuthService::refresh(&store, &config, &tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        AuthService::set_active(&store, "alice", true).await.unwrap();
        assert!(AuthService::resolve(&store, claims).await.is_ok());
    }

    #[tokio::test]
    async fn token_for_missing_user_is_rejected() {
        let store = MemoryStore::new();
        let claims = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            username: "ghost".into(),
        };
        let err = AuthService::resolve(&store, claims).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = AuthService::set_active(&store, "ghost", false).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
