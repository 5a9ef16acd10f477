//! ABOUTME: Job Registry (C2): durable status transitions with its own bounded retry

use crate::store::{SharedJobStore, StoreError};
use docflow_core::{DocumentId, Job, JobId, JobStage};
use docflow_resilience::{retry_with_backoff, RetryConfig};
use std::time::Duration;

/// Durable record of each pipeline run. Wraps a `JobStore` and adds the
/// bounded-retry-with-critical-logging discipline required of
/// `update_status` by §4.2: up to 3 attempts on transient storage failure,
/// and a failure here must never abort the pipeline.
pub struct JobRegistry {
    store: SharedJobStore,
    write_retry: RetryConfig,
}

impl JobRegistry {
    #[must_use]
    pub fn new(store: SharedJobStore) -> Self {
        Self {
            store,
            // "retry up to 3 times" reads as 3 total attempts on the write.
            write_retry: RetryConfig::new(2, Duration::from_millis(200), 2.0),
        }
    }

    /// `create(user_id, source_ref) -> Job`: initializes with `queued` and
    /// returns with a fresh id.
    pub async fn create(&self, user_id: &str, source_ref: &str) -> Result<Job, StoreError> {
        let job = Job::new(user_id, source_ref);
        self.store.insert(job.clone()).await?;
        Ok(job)
    }

    /// Moves the record to a new stage, retrying the write up to 3 times on
    /// transient storage failure. On exhaustion, logs at critical severity
    /// and swallows the error — **a Job Registry write failure must never
    /// abort the pipeline** (§4.2, §7).
    pub async fn update_status(&self, job_id: JobId, stage: JobStage, error: Option<String>) {
        let outcome = retry_with_backoff(
            "job_registry.update_status",
            self.write_retry,
            |e: &StoreError| matches!(e, StoreError::Transient(_)),
            || {
                let store = self.store.clone();
                let error = error.clone();
                async move {
                    let mut job = store.get(job_id).await?;
                    job.transition(stage, error);
                    store.update(job).await
                }
            },
        )
        .await;

        if let Err(err) = outcome {
            tracing::error!(
                critical = true,
                job_id = %job_id,
                stage = %stage,
                error = %err,
                "job registry status update exhausted retries; pipeline continues without a durable record of this transition"
            );
        }
    }

    /// Terminal success. `metadata` carries any degraded-run bookkeeping the
    /// Pipeline State accumulated (`max_attempts_reached`,
    /// `classification_error`, ...) so it survives in the durable record.
    pub async fn complete(
        &self,
        job_id: JobId,
        document_id: Option<DocumentId>,
        question_count: u32,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        let outcome = retry_with_backoff(
            "job_registry.complete",
            self.write_retry,
            |e: &StoreError| matches!(e, StoreError::Transient(_)),
            || {
                let store = self.store.clone();
                let metadata = metadata.clone();
                async move {
                    let mut job = store.get(job_id).await?;
                    job.merge_metadata(metadata);
                    job.complete(document_id, question_count);
                    store.update(job).await
                }
            },
        )
        .await;

        if let Err(err) = outcome {
            tracing::error!(
                critical = true,
                job_id = %job_id,
                error = %err,
                "job registry completion write exhausted retries"
            );
        }
    }

    /// Terminal failure; sets `completed_at`. `metadata` is merged the same
    /// way as in `complete`.
    pub async fn fail(
        &self,
        job_id: JobId,
        error: impl Into<String> + Send,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        let error = error.into();
        let outcome = retry_with_backoff(
            "job_registry.fail",
            self.write_retry,
            |e: &StoreError| matches!(e, StoreError::Transient(_)),
            || {
                let store = self.store.clone();
                let error = error.clone();
                let metadata = metadata.clone();
                async move {
                    let mut job = store.get(job_id).await?;
                    job.merge_metadata(metadata);
                    job.fail(error);
                    store.update(job).await
                }
            },
        )
        .await;

        if let Err(err) = outcome {
            tracing::error!(
                critical = true,
                job_id = %job_id,
                error = %err,
                "job registry failure write exhausted retries"
            );
        }
    }

    pub async fn get(&self, job_id: JobId) -> Result<Job, StoreError> {
        self.store.get(job_id).await
    }

    pub async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, StoreError> {
        self.store.list_by_user(user_id, limit, offset).await
    }
}
