use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_expiry_seconds: u64,
    pub jwt_refresh_expiry_days: u64,
    pub bcrypt_cost: u32,
    pub media_dir: String,
    pub host: String,
    pub port: u16,
    pub notification_queue_capacity: usize,
    // SMTP (optional)
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process environment.
    pub fn from_source<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| get(key).filter(|s| !s.is_empty());
        let required = |key: &str| {
            optional(key).ok_or_else(|| anyhow::anyhow!("Missing required env var: {}", key))
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: optional("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_refresh_secret: required("JWT_REFRESH_SECRET")?,
            jwt_expiry_seconds: optional("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|| "1800".into())
                .parse()?,
            jwt_refresh_expiry_days: optional("JWT_REFRESH_EXPIRY_DAYS")
                .unwrap_or_else(|| "7".into())
                .parse()?,
            bcrypt_cost: optional("BCRYPT_COST")
                .unwrap_or_else(|| bcrypt::DEFAULT_COST.to_string())
                .parse()?,
            media_dir: optional("MEDIA_DIR").unwrap_or_else(|| "/data/media".into()),
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: optional("PORT").unwrap_or_else(|| "8080".into()).parse()?,
            notification_queue_capacity: optional("NOTIFICATION_QUEUE_CAPACITY")
                .unwrap_or_else(|| "256".into())
                .parse()?,
            smtp_host: optional("SMTP_HOST"),
            smtp_port: optional("SMTP_PORT").and_then(|v| v.parse().ok()),
            smtp_username: optional("SMTP_USERNAME"),
            smtp_password: optional("SMTP_PASSWORD"),
            smtp_from: optional("SMTP_FROM"),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_source(|key| match key {
        "DATABASE_URL" => Some("postgres://localhost/taskgroups_test".into()),
        "JWT_SECRET" => Some("test-access-secret".into()),
        "JWT_REFRESH_SECRET" => Some("test-refresh-secret".into()),
        "BCRYPT_COST" => Some("4".into()),
        _ => None,
    })
    .expect("test config is complete")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_keys_are_absent() {
        let config = Config::from_source(lookup(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("JWT_SECRET", "a"),
            ("JWT_REFRESH_SECRET", "b"),
        ]))
        .unwrap();

        assert_eq!(config.jwt_expiry_seconds, 1800);
        assert_eq!(config.jwt_refresh_expiry_days, 7);
        assert_eq!(config.port, 8080);
        assert_eq!(config.notification_queue_capacity, 256);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert!(config.smtp_host.is_none());
    }

    #[test]
    fn missing_required_key_is_reported_by_name() {
        let err = Config::from_source(lookup(&[("DATABASE_URL", "postgres://db/app")]))
            .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn empty_values_count_as_missing() {
        let err = Config::from_source(lookup(&[
            ("DATABASE_URL", ""),
            ("JWT_SECRET", "a"),
            ("JWT_REFRESH_SECRET", "b"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = Config::from_source(lookup(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("JWT_SECRET", "a"),
            ("JWT_REFRESH_SECRET", "b"),
            ("PORT", "eighty"),
        ]));
        assert!(result.is_err());
    }
}
