//! Outbound notification queue.
//!
//! Handlers enqueue jobs through a [`NotificationSink`] and return right away.
//! A single background worker drains the queue and hands each job to a
//! [`Mailer`]. Delivery is best effort: failures are logged and counted,
//! never retried, and never reach the request that queued the job.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::services::metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    pub recipient: String,
    pub payload: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification queue is full")]
    Full,
    #[error("notification queue is closed")]
    Closed,
}

pub trait NotificationSink: Send + Sync {
    /// Queues a job without waiting for delivery.
    fn enqueue(&self, job: NotificationJob) -> Result<(), NotifyError>;
}

/// Sink backed by a bounded tokio channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<NotificationJob>,
}

impl ChannelSink {
    /// Returns the sink together with the receiver the worker drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn enqueue(&self, job: NotificationJob) -> Result<(), NotifyError> {
        match self.tx.try_send(job) {
            Ok(()) => {
                metrics::record_notification("enqueued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::record_notification("dropped");
                Err(NotifyError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::record_notification("dropped");
                Err(NotifyError::Closed)
            }
        }
    }
}

/// Delivers a rendered dashboard report to one recipient.
pub trait Mailer: Send + Sync + 'static {
    fn send_report(
        &self,
        to: &str,
        payload: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Spawns the worker. Without a mailer every job is consumed and skipped.
/// The worker stops once every sink clone has been dropped.
pub fn start_worker<M: Mailer>(
    mut rx: mpsc::Receiver<NotificationJob>,
    mailer: Option<Arc<M>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Notification worker started");
        while let Some(job) = rx.recv().await {
            let Some(mailer) = mailer.as_ref() else {
                debug!("SMTP not configured, skipping report for {}", job.recipient);
                metrics::record_notification("skipped");
                continue;
            };
            match mailer.send_report(&job.recipient, &job.payload).await {
                Ok(()) => {
                    debug!("report sent to {}", job.recipient);
                    metrics::record_notification("sent");
                }
                Err(e) => {
                    warn!("Failed to send report to {}: {e:#}", job.recipient);
                    metrics::record_notification("failed");
                }
            }
        }
        info!("Notification worker stopped");
    })
}
