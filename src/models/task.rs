use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::validate_name;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Task {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub completed: bool,
    pub photo: Option<String>, // path relative to MEDIA_DIR
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub group_id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub deadline: Option<DateTime<Utc>>,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_name("Task name", &self.name)
    }
}

/// Partial update. The owning group cannot be changed.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub deadline: Option<DateTime<Utc>>,
}

impl UpdateTaskRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.deadline.is_none()
        {
            return Err(AppError::Validation("Nothing to update".into()));
        }
        if let Some(name) = &self.name {
            validate_name("Task name", name)?;
        }
        Ok(())
    }
}
