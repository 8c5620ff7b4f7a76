use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Privilege label carried by a grant. Ordered admin > manager > user, but
/// permission checks compare roles for equality only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::User => "user",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "user" => Ok(Role::User),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

/// A (user, group) membership. At most one exists per pair; `active = false`
/// marks a revoked grant that is kept for audit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AccessGrant {
    pub id: i64,
    pub user_id: Uuid,
    pub group_id: i64,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DB row struct. The role is stored as TEXT and parsed on the way out.
#[derive(Debug, FromRow)]
pub struct GrantRow {
    pub id: i64,
    pub user_id: Uuid,
    pub group_id: i64,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<GrantRow> for AccessGrant {
    type Error = AppError;

    fn try_from(row: GrantRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            group_id: row.group_id,
            role: row.role.parse()?,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: Option<Role>,
    pub active: Option<bool>,
}

impl UpdateMemberRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.role.is_none() && self.active.is_none() {
            return Err(AppError::Validation("Nothing to update".into()));
        }
        Ok(())
    }
}
