use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::store::{AccessStore, GroupStore, Store, StoreTx, TaskStore, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    access::{AccessGrant, GrantRow, Role},
    group::{CreateGroupRequest, Group, GroupSummary, GroupSummaryRow, UpdateGroupRequest},
    task::{CreateTaskRequest, Task, UpdateTaskRequest},
    user::{NewUser, User},
};

const USER_COLS: &str =
    "id, username, email, password_hash, name, surname, is_active, created_at";
const GROUP_COLS: &str = "id, name, description, owner_id, created_at, updated_at";
const TASK_COLS: &str =
    "id, group_id, name, description, completed, photo, deadline, created_at, updated_at";
const GRANT_COLS: &str = "id, user_id, group_id, role, active, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> AppResult<PgTx> {
        Ok(PgTx {
            tx: self.pool.begin().await?,
        })
    }
}

/// One request-scoped Postgres transaction. Rolled back on drop unless committed.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl StoreTx for PgTx {
    async fn commit(self) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn grants(rows: Vec<GrantRow>) -> AppResult<Vec<AccessGrant>> {
    rows.into_iter().map(AccessGrant::try_from).collect()
}

impl UserStore for PgTx {
    async fn insert_user(&mut self, new: NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email, password_hash, name, surname)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(&new.surname)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("User already exists".into())
            }
            other => AppError::Database(other),
        })
    }

    async fn find_user(&mut self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn find_user_by_login(&mut self, login: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users
             WHERE username = $1 OR email = lower($1)
             ORDER BY (username = $1) DESC
             LIMIT 1"
        ))
        .bind(login)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(user)
    }

    async fn set_user_active(&mut self, id: Uuid, active: bool) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_active = $1 WHERE id = $2 RETURNING {USER_COLS}"
        ))
        .bind(active)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    async fn user_exists(&mut self, username: &str, email: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }
}

impl GroupStore for PgTx {
    async fn insert_group(&mut self, owner_id: Uuid, req: &CreateGroupRequest) -> AppResult<Group> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "INSERT INTO groups (name, description, owner_id)
             VALUES ($1, $2, $3)
             RETURNING {GROUP_COLS}"
        ))
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(owner_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(group)
    }

    async fn find_group(&mut self, id: i64) -> AppResult<Option<Group>> {
        let group =
            sqlx::query_as::<_, Group>(&format!("SELECT {GROUP_COLS} FROM groups WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(group)
    }

    async fn update_group(&mut self, id: i64, req: &UpdateGroupRequest) -> AppResult<Group> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "UPDATE groups
             SET name = COALESCE($1, name),
                 description = COALESCE($2, description),
                 updated_at = NOW()
             WHERE id = $3
             RETURNING {GROUP_COLS}"
        ))
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(group)
    }

    async fn delete_group(&mut self, id: i64) -> AppResult<()> {
        // tasks and group_access rows go with it (ON DELETE CASCADE)
        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn groups_for_member(&mut self, user_id: Uuid) -> AppResult<Vec<GroupSummary>> {
        let rows = sqlx::query_as::<_, GroupSummaryRow>(
            "SELECT g.id, g.name, g.description, g.owner_id, a.role
             FROM groups g
             JOIN group_access a ON a.group_id = g.id
             WHERE a.user_id = $1 AND a.active = TRUE
             ORDER BY g.id",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(GroupSummary::try_from).collect()
    }
}

impl TaskStore for PgTx {
    async fn insert_task(&mut self, req: &CreateTaskRequest) -> AppResult<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (group_id, name, description, completed, deadline)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {TASK_COLS}"
        ))
        .bind(req.group_id)
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(req.completed)
        .bind(req.deadline)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(task)
    }

    async fn find_task(&mut self, id: i64) -> AppResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(task)
    }

    async fn update_task(&mut self, id: i64, req: &UpdateTaskRequest) -> AppResult<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks
             SET name = COALESCE($1, name),
                 description = COALESCE($2, description),
                 completed = COALESCE($3, completed),
                 deadline = COALESCE($4, deadline),
                 updated_at = NOW()
             WHERE id = $5
             RETURNING {TASK_COLS}"
        ))
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(req.completed)
        .bind(req.deadline)
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(task)
    }

    async fn set_task_photo(&mut self, id: i64, photo: &str) -> AppResult<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET photo = $1, updated_at = NOW() WHERE id = $2 RETURNING {TASK_COLS}"
        ))
        .bind(photo)
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(task)
    }

    async fn delete_task(&mut self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn tasks_in_group(&mut self, group_id: i64) -> AppResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLS} FROM tasks WHERE group_id = $1 ORDER BY id"
        ))
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(tasks)
    }
}

impl AccessStore for PgTx {
    async fn upsert_grant(
        &mut self,
        user_id: Uuid,
        group_id: i64,
        role: Role,
        active: bool,
    ) -> AppResult<AccessGrant> {
        let row = sqlx::query_as::<_, GrantRow>(&format!(
            "INSERT INTO group_access (user_id, group_id, role, active)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, group_id) DO UPDATE
             SET role = EXCLUDED.role,
                 active = EXCLUDED.active,
                 updated_at = NOW()
             RETURNING {GRANT_COLS}"
        ))
        .bind(user_id)
        .bind(group_id)
        .bind(role.as_str())
        .bind(active)
        .fetch_one(&mut *self.tx)
        .await?;
        row.try_into()
    }

    async fn revoke(&mut self, user_id: Uuid, group_id: i64) -> AppResult<Option<AccessGrant>> {
        let row = sqlx::query_as::<_, GrantRow>(&format!(
            "UPDATE group_access
             SET updated_at = CASE WHEN active THEN NOW() ELSE updated_at END,
                 active = FALSE
             WHERE user_id = $1 AND group_id = $2
             RETURNING {GRANT_COLS}"
        ))
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(AccessGrant::try_from).transpose()
    }

    async fn lookup(&mut self, user_id: Uuid, group_id: i64) -> AppResult<Option<AccessGrant>> {
        // FOR SHARE: a concurrent revoke waits until this transaction ends.
        let row = sqlx::query_as::<_, GrantRow>(&format!(
            "SELECT {GRANT_COLS} FROM group_access
             WHERE user_id = $1 AND group_id = $2 AND active = TRUE
             FOR SHARE"
        ))
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(AccessGrant::try_from).transpose()
    }

    async fn find_grant(&mut self, user_id: Uuid, group_id: i64) -> AppResult<Option<AccessGrant>> {
        let row = sqlx::query_as::<_, GrantRow>(&format!(
            "SELECT {GRANT_COLS} FROM group_access WHERE user_id = $1 AND group_id = $2"
        ))
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(AccessGrant::try_from).transpose()
    }

    async fn list_active(&mut self, group_id: i64) -> AppResult<Vec<AccessGrant>> {
        let rows = sqlx::query_as::<_, GrantRow>(&format!(
            "SELECT {GRANT_COLS} FROM group_access
             WHERE group_id = $1 AND active = TRUE
             ORDER BY id"
        ))
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;
        grants(rows)
    }
}
