use tracing::info;
use uuid::Uuid;

use crate::{
    db::{AccessStore, Store, StoreTx, UserStore},
    error::{AppError, AppResult},
    models::{
        access::{AccessGrant, AddMemberRequest, Role, UpdateMemberRequest},
        group::Group,
    },
    services::{
        groups::load as load_group,
        permissions::{authorize, Policy},
    },
};

/// Membership management. Every mutation requires EXACT(admin) on the group.
pub struct MemberService;

impl MemberService {
    /// Active members of the group, visible to any active member.
    pub async fn list<S: Store>(
        store: &S,
        actor: Uuid,
        group_id: i64,
    ) -> AppResult<Vec<AccessGrant>> {
        let mut tx = store.begin().await?;
        load_group(&mut tx, group_id).await?;
        authorize(&mut tx, actor, group_id, Policy::Membership).await?;
        tx.list_active(group_id).await
    }

    /// Grants `req.role` to `req.user_id`. An existing grant for the pair,
    /// revoked or not, is updated and reactivated.
    pub async fn add<S: Store>(
        store: &S,
        actor: Uuid,
        group_id: i64,
        req: &AddMemberRequest,
    ) -> AppResult<AccessGrant> {
        let mut tx = store.begin().await?;
        let group = admin_scope(&mut tx, actor, group_id).await?;
        protect_owner(&group, req.user_id)?;
        tx.find_user(req.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        let grant = tx.grant(req.user_id, group_id, req.role).await?;
        tx.commit().await?;

        info!(group_id, user_id = %req.user_id, role = %req.role, by = %actor, "member granted");
        Ok(grant)
    }

    pub async fn update<S: Store>(
        store: &S,
        actor: Uuid,
        group_id: i64,
        user_id: Uuid,
        req: &UpdateMemberRequest,
    ) -> AppResult<AccessGrant> {
        req.validate()?;
        let mut tx = store.begin().await?;
        let group = admin_scope(&mut tx, actor, group_id).await?;
        protect_owner(&group, user_id)?;
        let existing = tx
            .find_grant(user_id, group_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".into()))?;

        let role = req.role.unwrap_or(existing.role);
        let active = req.active.unwrap_or(existing.active);
        let grant = tx.upsert_grant(user_id, group_id, role, active).await?;
        tx.commit().await?;

        info!(group_id, %user_id, %role, active, by = %actor, "member updated");
        Ok(grant)
    }

    /// Revokes the member's grant. The row is kept, marked inactive.
    /// Revoking an already revoked member succeeds.
    pub async fn remove<S: Store>(
        store: &S,
        actor: Uuid,
        group_id: i64,
        user_id: Uuid,
    ) -> AppResult<()> {
        let mut tx = store.begin().await?;
        let group = admin_scope(&mut tx, actor, group_id).await?;
        protect_owner(&group, user_id)?;
        tx.revoke(user_id, group_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".into()))?;
        tx.commit().await?;

        info!(group_id, %user_id, by = %actor, "member revoked");
        Ok(())
    }
}

async fn admin_scope<T: StoreTx>(tx: &mut T, actor: Uuid, group_id: i64) -> AppResult<Group> {
    let group = load_group(tx, group_id).await?;
    authorize(tx, actor, group_id, Policy::Exact(Role::Admin)).await?;
    Ok(group)
}

/// The creator's admin grant is fixed for the lifetime of the group.
fn protect_owner(group: &Group, user_id: Uuid) -> AppResult<()> {
    if group.owner_id == user_id {
        return Err(AppError::Forbidden(
            "The group owner's access cannot be changed".into(),
        ));
    }
    Ok(())
}
