use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::{AccessStore, GroupStore, Store, TaskStore, UserStore},
    error::{AppError, AppResult},
    models::access::Role,
    services::notifications::{NotificationJob, NotificationSink},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskReport {
    pub name: String,
    pub completed: bool,
    pub deadline: Option<DateTime<Utc>>,
}

/// One group as it appears in a dashboard report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupReport {
    pub id: i64,
    pub name: String,
    pub role: Role,
    pub tasks: Vec<TaskReport>,
    pub members: usize,
}

pub struct ReportService;

impl ReportService {
    /// Builds the caller's dashboard and queues it for email delivery.
    ///
    /// Only groups where the caller holds an active grant are included.
    /// A queue failure is logged and the call still succeeds.
    pub async fn dashboard<S: Store>(
        store: &S,
        sink: &dyn NotificationSink,
        actor: Uuid,
    ) -> AppResult<Vec<GroupReport>> {
        let mut tx = store.begin().await?;
        let user = tx
            .find_user(actor)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        let mut report = Vec::new();
        for summary in tx.groups_for_member(actor).await? {
            let tasks = tx
                .tasks_in_group(summary.id)
                .await?
                .into_iter()
                .map(|t| TaskReport {
                    name: t.name,
                    completed: t.completed,
                    deadline: t.deadline,
                })
                .collect();
            let members = tx.list_active(summary.id).await?.len();
            report.push(GroupReport {
                id: summary.id,
                name: summary.name,
                role: summary.role,
                tasks,
                members,
            });
        }
        drop(tx);

        let payload = serde_json::to_string(&report)
            .map_err(|e| anyhow::anyhow!("Failed to serialise report: {e}"))?;
        let job = NotificationJob {
            recipient: user.email,
            payload,
        };
        match sink.enqueue(job) {
            Ok(()) => info!(user_id = %actor, groups = report.len(), "dashboard report queued"),
            Err(e) => warn!(user_id = %actor, "dashboard report not queued: {e}"),
        }
        Ok(report)
    }
}
