//! Group-scoped permission checks.
//!
//! [`evaluate`] is a pure decision over the caller's active grant;
//! [`authorize`] fetches that grant inside the caller's transaction,
//! evaluates it and records the outcome.
//!
//! Policies compare roles for equality, never "at least". `NotExact(User)`
//! lets admins and managers through by rejecting plain users; it is not an
//! allow-list of privileged roles.

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::db::AccessStore;
use crate::error::AppResult;
use crate::models::access::{AccessGrant, Role};
use crate::services::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Allow iff the caller's role equals the given role.
    Exact(Role),
    /// Allow iff the caller's role differs from the given role.
    NotExact(Role),
    /// Allow any active member.
    Membership,
}

impl Policy {
    /// Stable label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Policy::Exact(Role::Admin) => "exact_admin",
            Policy::Exact(Role::Manager) => "exact_manager",
            Policy::Exact(Role::User) => "exact_user",
            Policy::NotExact(Role::Admin) => "not_exact_admin",
            Policy::NotExact(Role::Manager) => "not_exact_manager",
            Policy::NotExact(Role::User) => "not_exact_user",
            Policy::Membership => "membership",
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::Exact(role) => write!(f, "EXACT({role})"),
            Policy::NotExact(role) => write!(f, "NOT_EXACT({role})"),
            Policy::Membership => f.write_str("MEMBERSHIP"),
        }
    }
}

/// The caller's resolved role once a check passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleDecision {
    pub user_id: Uuid,
    pub group_id: i64,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// No active grant for the pair.
    #[error("user {user_id} has no active grant on group {group_id}")]
    NotFound { user_id: Uuid, group_id: i64 },

    /// A grant exists but its role fails the policy.
    #[error("role {role} on group {group_id} does not satisfy {policy} for user {user_id}")]
    Forbidden {
        user_id: Uuid,
        group_id: i64,
        role: Role,
        policy: Policy,
    },
}

impl PermissionError {
    pub fn outcome(&self) -> &'static str {
        match self {
            PermissionError::NotFound { .. } => "not_found",
            PermissionError::Forbidden { .. } => "forbidden",
        }
    }
}

/// Decides whether `actor` may act on `group_id` under `policy`.
///
/// `grant` is the caller's grant for the group as read from the access store.
/// A grant that is inactive or belongs to another pair counts as absent.
pub fn evaluate(
    actor: Uuid,
    group_id: i64,
    grant: Option<&AccessGrant>,
    policy: Policy,
) -> Result<RoleDecision, PermissionError> {
    let grant = grant
        .filter(|g| g.active && g.user_id == actor && g.group_id == group_id)
        .ok_or(PermissionError::NotFound {
            user_id: actor,
            group_id,
        })?;

    let allowed = match policy {
        Policy::Exact(required) => grant.role == required,
        Policy::NotExact(excluded) => grant.role != excluded,
        Policy::Membership => true,
    };

    if allowed {
        Ok(RoleDecision {
            user_id: actor,
            group_id,
            role: grant.role,
        })
    } else {
        Err(PermissionError::Forbidden {
            user_id: actor,
            group_id,
            role: grant.role,
            policy,
        })
    }
}

/// Looks up the caller's active grant in `tx` and evaluates `policy` against it.
pub async fn authorize<T: AccessStore>(
    tx: &mut T,
    actor: Uuid,
    group_id: i64,
    policy: Policy,
) -> AppResult<RoleDecision> {
    let grant = tx.lookup(actor, group_id).await?;
    match evaluate(actor, group_id, grant.as_ref(), policy) {
        Ok(decision) => {
            metrics::record_permission_check(policy, "allow");
            Ok(decision)
        }
        Err(err) => {
            metrics::record_permission_check(policy, err.outcome());
            debug!(%actor, group_id, %policy, "permission denied: {err}");
            Err(err.into())
        }
    }
}
