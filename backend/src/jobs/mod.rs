//! Durable job queue and worker loops.
//!
//! Two queues back the ingestion pipeline: provider notifications and bulk
//! syncs flow through `email-notifications`, per-message classification
//! through `ai-classification`. Jobs are persisted rows delivered at least
//! once; a failed delivery is retried with exponential backoff until the
//! attempt budget runs out.

pub mod classify;
pub mod notification;
pub mod sync;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::db::{self, DbPool};
use crate::models::QueueJobRow;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    EmailNotifications,
    AiClassification,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::EmailNotifications => "email-notifications",
            QueueName::AiClassification => "ai-classification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    EmailNotification,
    InitialSync,
    ManualSync,
    AiClassification,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::EmailNotification => "email-notification",
            JobKind::InitialSync => "initial-sync",
            JobKind::ManualSync => "manual-sync",
            JobKind::AiClassification => "ai-classification",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "email-notification" => Some(JobKind::EmailNotification),
            "initial-sync" => Some(JobKind::InitialSync),
            "manual-sync" => Some(JobKind::ManualSync),
            "ai-classification" => Some(JobKind::AiClassification),
            _ => None,
        }
    }

    /// Which queue delivers this job kind.
    pub fn queue(&self) -> QueueName {
        match self {
            JobKind::AiClassification => QueueName::AiClassification,
            _ => QueueName::EmailNotifications,
        }
    }
}

/// Handle for enqueueing durable jobs. Cheap to clone; constructed once at
/// startup and injected wherever jobs are produced.
#[derive(Clone)]
pub struct JobQueue {
    pool: DbPool,
    settings: Arc<QueueConfig>,
}

impl JobQueue {
    pub fn new(pool: DbPool, settings: QueueConfig) -> Self {
        Self {
            pool,
            settings: Arc::new(settings),
        }
    }

    pub async fn enqueue<T: Serialize>(&self, kind: JobKind, payload: &T) -> Result<Uuid> {
        let payload_json = serde_json::to_string(payload)?;
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection")?;

        let job_id = db::queue::enqueue(
            &mut conn,
            kind.queue().as_str(),
            kind.as_str(),
            &payload_json,
            self.settings.max_attempts,
        )
        .await?;

        tracing::debug!("Enqueued {} job {}", kind.as_str(), job_id);
        Ok(job_id)
    }
}

/// Start one worker loop per queue. Notification/sync jobs and
/// classification jobs drain independently, so a notification enqueueing
/// classification work never blocks on its completion.
pub fn start_workers(state: AppState) {
    let notification_concurrency = state.config.queue.notification_concurrency;
    let classification_concurrency = state.config.queue.classification_concurrency;

    tokio::spawn(worker_loop(
        state.clone(),
        QueueName::EmailNotifications,
        notification_concurrency,
    ));
    tokio::spawn(worker_loop(
        state,
        QueueName::AiClassification,
        classification_concurrency,
    ));
}

async fn worker_loop(state: AppState, queue: QueueName, concurrency: usize) {
    tracing::info!(
        "Starting {} worker (concurrency {})",
        queue.as_str(),
        concurrency
    );

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let poll_interval = Duration::from_secs(state.config.queue.poll_interval_secs);

    loop {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        match claim_one(&state.pool, queue).await {
            Ok(Some(job)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    run_job(&state, &job).await;
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
                tokio::time::sleep(poll_interval).await;
            }
            Err(e) => {
                drop(permit);
                tracing::error!("Failed to claim job from {}: {:#}", queue.as_str(), e);
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

async fn claim_one(pool: &DbPool, queue: QueueName) -> Result<Option<QueueJobRow>> {
    let mut conn = pool.get().await.context("Failed to get DB connection")?;
    db::queue::claim_due(&mut conn, queue.as_str()).await
}

async fn run_job(state: &AppState, job: &QueueJobRow) {
    tracing::debug!(
        "Processing {} job {} (attempt {}/{})",
        job.kind,
        job.id,
        job.attempts,
        job.max_attempts
    );

    let outcome = dispatch(state, job).await;
    if let Err(e) = finish_job(state, job, outcome).await {
        tracing::error!("Failed to record outcome for job {}: {:#}", job.id, e);
    }
}

async fn dispatch(state: &AppState, job: &QueueJobRow) -> Result<()> {
    let Some(kind) = JobKind::from_str(&job.kind) else {
        bail!("Unknown job kind: {}", job.kind);
    };

    match kind {
        JobKind::EmailNotification => {
            notification::process(state, parse_payload(&job.payload)?).await
        }
        JobKind::InitialSync => sync::process(state, kind, parse_payload(&job.payload)?).await,
        JobKind::ManualSync => sync::process(state, kind, parse_payload(&job.payload)?).await,
        JobKind::AiClassification => classify::process(state, parse_payload(&job.payload)?).await,
    }
}

fn parse_payload<T: DeserializeOwned>(payload: &str) -> Result<T> {
    serde_json::from_str(payload).context("Invalid job payload")
}

async fn finish_job(state: &AppState, job: &QueueJobRow, outcome: Result<()>) -> Result<()> {
    let mut conn = state
        .pool
        .get()
        .await
        .context("Failed to get DB connection")?;

    match outcome {
        Ok(()) => db::queue::mark_completed(&mut conn, job.id).await,
        Err(e) => {
            let message = format!("{:#}", e);

            // attempts was incremented when the job was claimed, so it is
            // the number of deliveries so far.
            if job.attempts >= job.max_attempts {
                tracing::error!(
                    "Job {} ({}) failed permanently after {} attempts: {}",
                    job.id,
                    job.kind,
                    job.attempts,
                    message
                );
                db::queue::mark_failed(&mut conn, job.id, &message).await
            } else {
                let delay = retry_delay(state.config.queue.backoff_base_secs, job.attempts);
                tracing::warn!(
                    "Job {} ({}) failed on attempt {}/{}, retrying in {:?}: {}",
                    job.id,
                    job.kind,
                    job.attempts,
                    job.max_attempts,
                    delay,
                    message
                );
                let next_run_at = Utc::now() + chrono::Duration::from_std(delay)?;
                db::queue::schedule_retry(&mut conn, job.id, &message, next_run_at).await
            }
        }
    }
}

/// Exponential backoff: base * 2^(attempt - 1).
fn retry_delay(base_secs: u64, attempt: i32) -> Duration {
    let exponent = attempt.saturating_sub(1).clamp(0, 16) as u32;
    Duration::from_secs(base_secs.saturating_mul(1u64 << exponent))
}

/// Wrap a processor body in a job-log start/success/failure transition.
/// The error is re-propagated after logging so the queue's retry policy
/// decides whether the job is redelivered.
pub(crate) async fn run_logged<F, Fut>(
    pool: &DbPool,
    job_type: &str,
    payload: &impl Serialize,
    body: F,
) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let payload_json = serde_json::to_string(payload)?;
    let log_id = {
        let mut conn = pool.get().await.context("Failed to get DB connection")?;
        db::job_logs::start(&mut conn, job_type, &payload_json).await?
    };

    match body().await {
        Ok(()) => {
            let mut conn = pool.get().await.context("Failed to get DB connection")?;
            db::job_logs::mark_completed(&mut conn, log_id).await?;
            Ok(())
        }
        Err(e) => {
            let message = format!("{:#}", e);
            match pool.get().await {
                Ok(mut conn) => {
                    if let Err(log_err) = db::job_logs::mark_failed(&mut conn, log_id, &message).await
                    {
                        tracing::error!("Failed to mark job log {} failed: {:#}", log_id, log_err);
                    }
                }
                Err(pool_err) => {
                    tracing::error!("Failed to mark job log {} failed: {:#}", log_id, pool_err);
                }
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_per_attempt() {
        assert_eq!(retry_delay(2, 1), Duration::from_secs(2));
        assert_eq!(retry_delay(2, 2), Duration::from_secs(4));
        assert_eq!(retry_delay(2, 3), Duration::from_secs(8));
    }

    #[test]
    fn retry_delay_saturates_on_large_attempt_counts() {
        assert_eq!(retry_delay(2, 0), Duration::from_secs(2));
        assert_eq!(retry_delay(2, 1000), retry_delay(2, 17));
    }

    #[test]
    fn job_kind_round_trip() {
        for kind in [
            JobKind::EmailNotification,
            JobKind::InitialSync,
            JobKind::ManualSync,
            JobKind::AiClassification,
        ] {
            assert_eq!(JobKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::from_str("bogus"), None);
    }

    #[test]
    fn classification_rides_its_own_queue() {
        assert_eq!(
            JobKind::AiClassification.queue(),
            QueueName::AiClassification
        );
        assert_eq!(
            JobKind::EmailNotification.queue(),
            QueueName::EmailNotifications
        );
        assert_eq!(JobKind::InitialSync.queue(), QueueName::EmailNotifications);
        assert_eq!(JobKind::ManualSync.queue(), QueueName::EmailNotifications);
    }

    #[test]
    fn payload_parse_errors_are_contextual() {
        let result: Result<sync::SyncJob> = parse_payload("not json");
        assert!(result.is_err());
    }
}
