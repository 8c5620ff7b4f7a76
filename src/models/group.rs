use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{access::AccessGrant, access::Role, task::Task, validate_name};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A group as seen by one member, with that member's role.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroupSummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub role: Role,
}

#[derive(Debug, FromRow)]
pub struct GroupSummaryRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub role: String,
}

impl TryFrom<GroupSummaryRow> for GroupSummary {
    type Error = AppError;

    fn try_from(row: GroupSummaryRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            owner_id: row.owner_id,
            role: row.role.parse()?,
        })
    }
}

/// Group with its tasks and active members.
#[derive(Debug, Clone, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    pub role: Role,
    pub tasks: Vec<Task>,
    pub members: Vec<AccessGrant>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
}

impl CreateGroupRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_name("Group name", &self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl UpdateGroupRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.is_none() && self.description.is_none() {
            return Err(AppError::Validation("Nothing to update".into()));
        }
        if let Some(name) = &self.name {
            validate_name("Group name", name)?;
        }
        Ok(())
    }
}
