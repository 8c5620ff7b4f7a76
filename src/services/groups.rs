use tracing::info;
use uuid::Uuid;

use crate::{
    db::{AccessStore, GroupStore, Store, StoreTx, TaskStore},
    error::{AppError, AppResult},
    models::{
        access::Role,
        group::{CreateGroupRequest, Group, GroupDetail, GroupSummary, UpdateGroupRequest},
    },
    services::permissions::{authorize, Policy},
};

pub struct GroupService;

impl GroupService {
    /// Groups where `actor` holds an active grant.
    pub async fn list<S: Store>(store: &S, actor: Uuid) -> AppResult<Vec<GroupSummary>> {
        let mut tx = store.begin().await?;
        tx.groups_for_member(actor).await
    }

    /// Creates the group and the creator's admin grant in one transaction.
    /// No check runs here: a brand-new group has no grants to check against.
    pub async fn create<S: Store>(
        store: &S,
        actor: Uuid,
        req: &CreateGroupRequest,
    ) -> AppResult<Group> {
        req.validate()?;
        let mut tx = store.begin().await?;
        let group = tx.insert_group(actor, req).await?;
        tx.grant(actor, group.id, Role::Admin).await?;
        tx.commit().await?;

        info!(group_id = group.id, owner = %actor, "group created");
        Ok(group)
    }

    pub async fn detail<S: Store>(store: &S, actor: Uuid, id: i64) -> AppResult<GroupDetail> {
        let mut tx = store.begin().await?;
        let group = load(&mut tx, id).await?;
        let decision = authorize(&mut tx, actor, id, Policy::Membership).await?;
        let tasks = tx.tasks_in_group(id).await?;
        let members = tx.list_active(id).await?;
        Ok(GroupDetail {
            group,
            role: decision.role,
            tasks,
            members,
        })
    }

    pub async fn update<S: Store>(
        store: &S,
        actor: Uuid,
        id: i64,
        req: &UpdateGroupRequest,
    ) -> AppResult<Group> {
        req.validate()?;
        let mut tx = store.begin().await?;
        load(&mut tx, id).await?;
        authorize(&mut tx, actor, id, Policy::NotExact(Role::User)).await?;
        let group = tx.update_group(id, req).await?;
        tx.commit().await?;

        info!(group_id = id, by = %actor, "group updated");
        Ok(group)
    }

    /// Deletes the group with all of its tasks and grants.
    pub async fn delete<S: Store>(store: &S, actor: Uuid, id: i64) -> AppResult<()> {
        let mut tx = store.begin().await?;
        load(&mut tx, id).await?;
        authorize(&mut tx, actor, id, Policy::Exact(Role::Admin)).await?;
        tx.delete_group(id).await?;
        tx.commit().await?;

        info!(group_id = id, by = %actor, "group deleted");
        Ok(())
    }
}

/// Loads a group or fails with the same message the permission check uses,
/// so a caller cannot tell a missing group from one they cannot see.
pub(crate) async fn load<T: StoreTx>(tx: &mut T, id: i64) -> AppResult<Group> {
    tx.find_group(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".into()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{MemoryStore, UserStore};
    use crate::models::user::NewUser;

    pub(crate) async fn seed_user(store: &MemoryStore, username: &str) -> Uuid {
        let mut tx = store.begin().await.unwrap();
        let user = tx
            .insert_user(NewUser {
                username: username.into(),
                email: format!("{username}@example.com"),
                password_hash: "hash".into(),
                name: None,
                surname: None,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        user.id
    }

    pub(crate) fn new_group(name: &str) -> CreateGroupRequest {
        CreateGroupRequest {
            name: name.into(),
            description: Some("shared".into()),
        }
    }

    pub(crate) async fn add_member(store: &MemoryStore, group_id: i64, user_id: Uuid, role: Role) {
        let mut tx = store.begin().await.unwrap();
        tx.grant(user_id, group_id, role).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn creating_a_group_grants_the_creator_admin() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;

        let group = GroupService::create(&store, alice, &new_group("Platform")).await.unwrap();
        assert_eq!(group.owner_id, alice);

        let mut tx = store.begin().await.unwrap();
        let grants = tx.list_active(group.id).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].user_id, alice);
        assert_eq!(grants[0].role, Role::Admin);
    }

    #[tokio::test]
    async fn create_rejects_blank_name_without_writing() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;

        let err = GroupService::create(&store, alice, &new_group(" ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(GroupService::list(&store, alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_shows_only_active_memberships_with_role() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let g1 = GroupService::create(&store, alice, &new_group("One")).await.unwrap();
        let g2 = GroupService::create(&store, alice, &new_group("Two")).await.unwrap();
        add_member(&store, g1.id, bob, Role::User).await;
        add_member(&store, g2.id, bob, Role::Manager).await;

        let mut tx = store.begin().await.unwrap();
        tx.revoke(bob, g2.id).await.unwrap();
        tx.commit().await.unwrap();

        let groups = GroupService::list(&store, bob).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, g1.id);
        assert_eq!(groups[0].role, Role::User);
    }

    #[tokio::test]
    async fn update_follows_not_exact_user() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;
        let manager = seed_user(&store, "manny").await;
        let member = seed_user(&store, "uma").await;
        let group = GroupService::create(&store, alice, &new_group("Ops")).await.unwrap();
        add_member(&store, group.id, manager, Role::Manager).await;
        add_member(&store, group.id, member, Role::User).await;

        let rename = UpdateGroupRequest {
            name: Some("Operations".into()),
            description: None,
        };
        let updated = GroupService::update(&store, manager, group.id, &rename).await.unwrap();
        assert_eq!(updated.name, "Operations");
        assert_eq!(updated.description.as_deref(), Some("shared"));

        let err = GroupService::update(&store, member, group.id, &rename).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn delete_requires_admin_and_cascades() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;
        let manager = seed_user(&store, "manny").await;
        let group = GroupService::create(&store, alice, &new_group("Ops")).await.unwrap();
        add_member(&store, group.id, manager, Role::Manager).await;

        let err = GroupService::delete(&store, manager, group.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        GroupService::delete(&store, alice, group.id).await.unwrap();

        for user in [alice, manager] {
            let err = GroupService::detail(&store, user, group.id).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_active(group.id).await.unwrap().is_empty());
        assert!(tx.find_grant(manager, group.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn outsiders_see_not_found_for_existing_and_missing_groups() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;
        let eve = seed_user(&store, "eve").await;
        let group = GroupService::create(&store, alice, &new_group("Ops")).await.unwrap();

        let existing = GroupService::detail(&store, eve, group.id).await.unwrap_err();
        let missing = GroupService::detail(&store, eve, group.id + 100).await.unwrap_err();
        assert_eq!(existing.to_string(), missing.to_string());
        assert!(matches!(existing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn detail_includes_tasks_members_and_role() {
        let store = MemoryStore::new();
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let group = GroupService::create(&store, alice, &new_group("Ops")).await.unwrap();
        add_member(&store, group.id, bob, Role::User).await;

        let detail = GroupService::detail(&store, bob, group.id).await.unwrap();
        assert_eq!(detail.role, Role::User);
        assert_eq!(detail.members.len(), 2);
        assert!(detail.tasks.is_empty());
    }
}
