//! Persistence traits.
//!
//! Every request runs inside exactly one transaction obtained from
//! [`Store::begin`]. Writes become visible only after [`StoreTx::commit`];
//! dropping a transaction discards them.

use std::future::Future;

use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    access::{AccessGrant, Role},
    group::{CreateGroupRequest, Group, GroupSummary, UpdateGroupRequest},
    task::{CreateTaskRequest, Task, UpdateTaskRequest},
    user::{NewUser, User},
};

pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    fn begin(&self) -> impl Future<Output = AppResult<Self::Tx>> + Send;
}

pub trait StoreTx: UserStore + GroupStore + TaskStore + AccessStore + Send {
    fn commit(self) -> impl Future<Output = AppResult<()>> + Send;
}

pub trait UserStore: Send {
    /// Fails with `Conflict` when the username or email is taken.
    fn insert_user(&mut self, new: NewUser) -> impl Future<Output = AppResult<User>> + Send;

    fn find_user(&mut self, id: Uuid) -> impl Future<Output = AppResult<Option<User>>> + Send;

    /// Looks a user up by username first, then by email. Emails are stored
    /// lower-cased, so the email match ignores case.
    fn find_user_by_login(
        &mut self,
        login: &str,
    ) -> impl Future<Output = AppResult<Option<User>>> + Send;

    fn set_user_active(
        &mut self,
        id: Uuid,
        active: bool,
    ) -> impl Future<Output = AppResult<User>> + Send;

    fn user_exists(
        &mut self,
        username: &str,
        email: &str,
    ) -> impl Future<Output = AppResult<bool>> + Send;
}

pub trait GroupStore: Send {
    fn insert_group(
        &mut self,
        owner_id: Uuid,
        req: &CreateGroupRequest,
    ) -> impl Future<Output = AppResult<Group>> + Send;

    fn find_group(&mut self, id: i64) -> impl Future<Output = AppResult<Option<Group>>> + Send;

    fn update_group(
        &mut self,
        id: i64,
        req: &UpdateGroupRequest,
    ) -> impl Future<Output = AppResult<Group>> + Send;

    /// Removes the group together with its tasks and access grants.
    fn delete_group(&mut self, id: i64) -> impl Future<Output = AppResult<()>> + Send;

    /// Groups where `user_id` holds an active grant, with that grant's role.
    fn groups_for_member(
        &mut self,
        user_id: Uuid,
    ) -> impl Future<Output = AppResult<Vec<GroupSummary>>> + Send;
}

pub trait TaskStore: Send {
    fn insert_task(&mut self, req: &CreateTaskRequest)
        -> impl Future<Output = AppResult<Task>> + Send;

    fn find_task(&mut self, id: i64) -> impl Future<Output = AppResult<Option<Task>>> + Send;

    fn update_task(
        &mut self,
        id: i64,
        req: &UpdateTaskRequest,
    ) -> impl Future<Output = AppResult<Task>> + Send;

    fn set_task_photo(
        &mut self,
        id: i64,
        photo: &str,
    ) -> impl Future<Output = AppResult<Task>> + Send;

    fn delete_task(&mut self, id: i64) -> impl Future<Output = AppResult<()>> + Send;

    fn tasks_in_group(
        &mut self,
        group_id: i64,
    ) -> impl Future<Output = AppResult<Vec<Task>>> + Send;
}

/// The (user, group) → role mapping every permission decision reads from.
pub trait AccessStore: Send {
    /// Inserts the grant for the pair or updates the existing row in place.
    fn upsert_grant(
        &mut self,
        user_id: Uuid,
        group_id: i64,
        role: Role,
        active: bool,
    ) -> impl Future<Output = AppResult<AccessGrant>> + Send;

    /// Marks the pair's grant inactive. Returns `None` if the pair never had one.
    fn revoke(
        &mut self,
        user_id: Uuid,
        group_id: i64,
    ) -> impl Future<Output = AppResult<Option<AccessGrant>>> + Send;

    /// Active grant for the pair, if any.
    fn lookup(
        &mut self,
        user_id: Uuid,
        group_id: i64,
    ) -> impl Future<Output = AppResult<Option<AccessGrant>>> + Send;

    /// Grant for the pair whether active or revoked.
    fn find_grant(
        &mut self,
        user_id: Uuid,
        group_id: i64,
    ) -> impl Future<Output = AppResult<Option<AccessGrant>>> + Send;

    fn list_active(
        &mut self,
        group_id: i64,
    ) -> impl Future<Output = AppResult<Vec<AccessGrant>>> + Send;

    fn grant(
        &mut self,
        user_id: Uuid,
        group_id: i64,
        role: Role,
    ) -> impl Future<Output = AppResult<AccessGrant>> + Send {
        self.upsert_grant(user_id, group_id, role, true)
    }
}
