//! In-process store backed by a mutex-guarded snapshot.
//!
//! A transaction holds the lock for its whole lifetime and works on a copy
//! of the state; `commit` swaps the copy in. Transactions are therefore
//! fully serialised, and an uncommitted one leaves no trace. The test suite
//! runs every service against this backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{AccessStore, GroupStore, Store, StoreTx, TaskStore, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    access::{AccessGrant, Role},
    group::{CreateGroupRequest, Group, GroupSummary, UpdateGroupRequest},
    task::{CreateTaskRequest, Task, UpdateTaskRequest},
    user::{NewUser, User},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: BTreeMap<Uuid, User>,
    groups: BTreeMap<i64, Group>,
    tasks: BTreeMap<i64, Task>,
    grants: BTreeMap<i64, AccessGrant>,
    next_group_id: i64,
    next_task_id: i64,
    next_grant_id: i64,
}

impl MemoryState {
    fn grant_mut(&mut self, user_id: Uuid, group_id: i64) -> Option<&mut AccessGrant> {
        self.grants
            .values_mut()
            .find(|g| g.user_id == user_id && g.group_id == group_id)
    }

    fn grant(&self, user_id: Uuid, group_id: i64) -> Option<&AccessGrant> {
        self.grants
            .values()
            .find(|g| g.user_id == user_id && g.group_id == group_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

impl StoreTx for MemoryTx {
    async fn commit(self) -> AppResult<()> {
        let MemoryTx { mut guard, work } = self;
        *guard = work;
        Ok(())
    }
}

fn missing(what: &str, id: i64) -> AppError {
    AppError::NotFound(format!("{what} {id} not found"))
}

impl UserStore for MemoryTx {
    async fn insert_user(&mut self, new: NewUser) -> AppResult<User> {
        let taken = self
            .work
            .users
            .values()
            .any(|u| u.username == new.username || u.email == new.email);
        if taken {
            return Err(AppError::Conflict("User already exists".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            surname: new.surname,
            is_active: true,
            created_at: Utc::now(),
        };
        self.work.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&mut self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.work.users.get(&id).cloned())
    }

    async fn find_user_by_login(&mut self, login: &str) -> AppResult<Option<User>> {
        let users = &self.work.users;
        let found = users
            .values()
            .find(|u| u.username == login)
            .or_else(|| {
                let email = login.to_lowercase();
                users.values().find(|u| u.email == email)
            });
        Ok(found.cloned())
    }

    async fn set_user_active(&mut self, id: Uuid, active: bool) -> AppResult<User> {
        let user = self
            .work
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        user.is_active = active;
        Ok(user.clone())
    }

    async fn user_exists(&mut self, username: &str, email: &str) -> AppResult<bool> {
        Ok(self
            .work
            .users
            .values()
            .any(|u| u.username == username || u.email == email))
    }
}

impl GroupStore for MemoryTx {
    async fn insert_group(&mut self, owner_id: Uuid, req: &CreateGroupRequest) -> AppResult<Group> {
        if !self.work.users.contains_key(&owner_id) {
            return Err(AppError::NotFound("User not found".into()));
        }
        self.work.next_group_id += 1;
        let now = Utc::now();
        let group = Group {
            id: self.work.next_group_id,
            name: req.name.trim().to_string(),
            description: req.description.clone(),
            owner_id,
            created_at: now,
            updated_at: now,
        };
        self.work.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn find_group(&mut self, id: i64) -> AppResult<Option<Group>> {
        Ok(self.work.groups.get(&id).cloned())
    }

    async fn update_group(&mut self, id: i64, req: &UpdateGroupRequest) -> AppResult<Group> {
        let group = self
            .work
            .groups
            .get_mut(&id)
            .ok_or_else(|| missing("Group", id))?;
        if let Some(name) = &req.name {
            group.name = name.trim().to_string();
        }
        if let Some(description) = &req.description {
            group.description = Some(description.clone());
        }
        group.updated_at = Utc::now();
        Ok(group.clone())
    }

    async fn delete_group(&mut self, id: i64) -> AppResult<()> {
        self.work.groups.remove(&id);
        self.work.tasks.retain(|_, t| t.group_id != id);
        self.work.grants.retain(|_, g| g.group_id != id);
        Ok(())
    }

    async fn groups_for_member(&mut self, user_id: Uuid) -> AppResult<Vec<GroupSummary>> {
        let state = &self.work;
        let mut summaries: Vec<GroupSummary> = state
            .grants
            .values()
            .filter(|g| g.user_id == user_id && g.active)
            .filter_map(|g| {
                state.groups.get(&g.group_id).map(|group| GroupSummary {
                    id: group.id,
                    name: group.name.clone(),
                    description: group.description.clone(),
                    owner_id: group.owner_id,
                    role: g.role,
                })
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        Ok(summaries)
    }
}

impl TaskStore for MemoryTx {
    async fn insert_task(&mut self, req: &CreateTaskRequest) -> AppResult<Task> {
        if !self.work.groups.contains_key(&req.group_id) {
            return Err(missing("Group", req.group_id));
        }
        self.work.next_task_id += 1;
        let now = Utc::now();
        let task = Task {
            id: self.work.next_task_id,
            group_id: req.group_id,
            name: req.name.trim().to_string(),
            description: req.description.clone(),
            completed: req.completed,
            photo: None,
            deadline: req.deadline,
            created_at: now,
            updated_at: now,
        };
        self.work.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_task(&mut self, id: i64) -> AppResult<Option<Task>> {
        Ok(self.work.tasks.get(&id).cloned())
    }

    async fn update_task(&mut self, id: i64, req: &UpdateTaskRequest) -> AppResult<Task> {
        let task = self
            .work
            .tasks
            .get_mut(&id)
            .ok_or_else(|| missing("Task", id))?;
        if let Some(name) = &req.name {
            task.name = name.trim().to_string();
        }
        if let Some(description) = &req.description {
            task.description = Some(description.clone());
        }
        if let Some(completed) = req.completed {
            task.completed = completed;
        }
        if let Some(deadline) = req.deadline {
            task.deadline = Some(deadline);
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn set_task_photo(&mut self, id: i64, photo: &str) -> AppResult<Task> {
        let task = self
            .work
            .tasks
            .get_mut(&id)
            .ok_or_else(|| missing("Task", id))?;
        task.photo = Some(photo.to_string());
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn delete_task(&mut self, id: i64) -> AppResult<()> {
        self.work.tasks.remove(&id);
        Ok(())
    }

    async fn tasks_in_group(&mut self, group_id: i64) -> AppResult<Vec<Task>> {
        Ok(self
            .work
            .tasks
            .values()
            .filter(|t| t.group_id == group_id)
            .cloned()
            .collect())
    }
}

impl AccessStore for MemoryTx {
    async fn upsert_grant(
        &mut self,
        user_id: Uuid,
        group_id: i64,
        role: Role,
        active: bool,
    ) -> AppResult<AccessGrant> {
        if !self.work.users.contains_key(&user_id) {
            return Err(AppError::NotFound("User not found".into()));
        }
        if !self.work.groups.contains_key(&group_id) {
            return Err(missing("Group", group_id));
        }
        let now = Utc::now();
        if let Some(existing) = self.work.grant_mut(user_id, group_id) {
            existing.role = role;
            existing.active = active;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        self.work.next_grant_id += 1;
        let grant = AccessGrant {
            id: self.work.next_grant_id,
            user_id,
            group_id,
            role,
            active,
            created_at: now,
            updated_at: now,
        };
        self.work.grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn revoke(&mut self, user_id: Uuid, group_id: i64) -> AppResult<Option<AccessGrant>> {
        Ok(self.work.grant_mut(user_id, group_id).map(|grant| {
            if grant.active {
                grant.active = false;
                grant.updated_at = Utc::now();
            }
            grant.clone()
        }))
    }

    async fn lookup(&mut self, user_id: Uuid, group_id: i64) -> AppResult<Option<AccessGrant>> {
        Ok(self
            .work
            .grant(user_id, group_id)
            .filter(|g| g.active)
            .cloned())
    }

    async fn find_grant(&mut self, user_id: Uuid, group_id: i64) -> AppResult<Option<AccessGrant>> {
        Ok(self.work.grant(user_id, group_id).cloned())
    }

    async fn list_active(&mut self, group_id: i64) -> AppResult<Vec<AccessGrant>> {
        Ok(self
            .work
            .grants
            .values()
            .filter(|g| g.group_id == group_id && g.active)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(tx: &mut MemoryTx, username: &str) -> User {
        tx.insert_user(NewUser {
            username: username.into(),
            email: format!("{username}@example.com"),
            password_hash: "hash".into(),
            name: None,
            surname: None,
        })
        .await
        .unwrap()
    }

    fn group_req(name: &str) -> CreateGroupRequest {
        CreateGroupRequest {
            name: name.into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_writes() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            seed_user(&mut tx, "alice").await;
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_user_by_login("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let alice = seed_user(&mut tx, "alice").await;
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx.find_user_by_login("alice@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(alice.id));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        seed_user(&mut tx, "alice").await;
        let err = tx
            .insert_user(NewUser {
                username: "alice".into(),
                email: "other@example.com".into(),
                password_hash: "hash".into(),
                name: None,
                surname: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn second_grant_updates_the_existing_row() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let alice = seed_user(&mut tx, "alice").await;
        let group = tx.insert_group(alice.id, &group_req("ops")).await.unwrap();

        let first = tx.grant(alice.id, group.id, Role::User).await.unwrap();
        let second = tx.grant(alice.id, group.id, Role::Manager).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.role, Role::Manager);
        assert_eq!(tx.list_active(group.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revoke_keeps_the_row_but_hides_it_from_lookup() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let alice = seed_user(&mut tx, "alice").await;
        let group = tx.insert_group(alice.id, &group_req("ops")).await.unwrap();
        tx.grant(alice.id, group.id, Role::Admin).await.unwrap();

        let revoked = tx.revoke(alice.id, group.id).await.unwrap().unwrap();
        assert!(!revoked.active);
        assert!(tx.lookup(alice.id, group.id).await.unwrap().is_none());
        assert!(tx.find_grant(alice.id, group.id).await.unwrap().is_some());

        // idempotent
        let again = tx.revoke(alice.id, group.id).await.unwrap().unwrap();
        assert_eq!(again.updated_at, revoked.updated_at);
    }

    #[tokio::test]
    async fn revoke_of_unknown_pair_returns_none() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.revoke(Uuid::new_v4(), 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_group_cascades() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let alice = seed_user(&mut tx, "alice").await;
        let group = tx.insert_group(alice.id, &group_req("ops")).await.unwrap();
        tx.grant(alice.id, group.id, Role::Admin).await.unwrap();
        tx.insert_task(&CreateTaskRequest {
            group_id: group.id,
            name: "deploy".into(),
            description: None,
            completed: false,
            deadline: None,
        })
        .await
        .unwrap();

        tx.delete_group(group.id).await.unwrap();

        assert!(tx.tasks_in_group(group.id).await.unwrap().is_empty());
        assert!(tx.find_grant(alice.id, group.id).await.unwrap().is_none());
        assert!(tx.groups_for_member(alice.id).await.unwrap().is_empty());
    }
}
