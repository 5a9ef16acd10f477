//! ABOUTME: The JobStore trait and its in-memory and Postgres-backed implementations

use async_trait::async_trait;
use docflow_core::{DocumentId, Job, JobId, JobStage};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("storage error: {0}")]
    Other(String),
}

/// The durable backing store behind the Job Registry. Kept as a trait so
/// the pipeline can run against an in-memory fake in tests and a
/// Postgres-backed implementation in production, matching the teacher's
/// storage-trait-plus-backend idiom.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<(), StoreError>;
    async fn update(&self, job: Job) -> Result<(), StoreError>;
    async fn get(&self, job_id: JobId) -> Result<Job, StoreError>;
    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, StoreError>;
}

/// In-memory `JobStore`, used for tests and any offline run mode.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        self.jobs.write().insert(job.id, job);
        Ok(())
    }

    async fn update(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        if !jobs.contains_key(&job.id) {
            return Err(StoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let mut matching: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by_key(|j| j.created_at);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}

/// Postgres-backed `JobStore`. Schema migrations that create the `jobs`
/// table are out of scope per §1's Non-goals on migration tooling; this
/// assumes the table already exists with columns matching `row_to_job`.
pub struct PostgresJobStore {
    pool: deadpool_postgres::Pool,
}

impl PostgresJobStore {
    #[must_use]
    pub const fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }

    async fn connection(
        &self,
    ) -> Result<deadpool_postgres::Client, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))
    }
}

fn row_to_job(row: &tokio_postgres::Row) -> Job {
    let stage: String = row.get("stage");
    Job {
        id: JobId::from_uuid(row.get("id")),
        user_id: row.get("user_id"),
        source_ref: row.get("source_ref"),
        stage: parse_stage(&stage),
        error_message: row.get("error_message"),
        document_id: row
            .get::<_, Option<uuid::Uuid>>("document_id")
            .map(DocumentId::from_uuid),
        question_count: u32::try_from(row.get::<_, i32>("question_count")).unwrap_or(0),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    }
}

fn parse_stage(s: &str) -> JobStage {
    match s {
        "ingesting" => JobStage::Ingesting,
        "parsing" => JobStage::Parsing,
        "validating" => JobStage::Validating,
        "persisting" => JobStage::Persisting,
        "classifying" => JobStage::Classifying,
        "vectorizing" => JobStage::Vectorizing,
        "completed" => JobStage::Completed,
        "failed" => JobStage::Failed,
        _ => JobStage::Queued,
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let client = self.connection().await?;
        client
            .execute(
                "INSERT INTO jobs (id, user_id, source_ref, stage, error_message, document_id, \
                 question_count, metadata, created_at, started_at, completed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    &job.id.as_uuid(),
                    &job.user_id,
                    &job.source_ref,
                    &job.stage.to_string(),
                    &job.error_message,
                    &job.document_id.map(|d| d.as_uuid()),
                    &i32::try_from(job.question_count).unwrap_or(i32::MAX),
                    &job.metadata,
                    &job.created_at,
                    &job.started_at,
                    &job.completed_at,
                ],
            )
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn update(&self, job: Job) -> Result<(), StoreError> {
        let client = self.connection().await?;
        let affected = client
            .execute(
                "UPDATE jobs SET stage = $2, error_message = $3, document_id = $4, \
                 question_count = $5, metadata = $6, started_at = $7, completed_at = $8 \
                 WHERE id = $1",
                &[
                    &job.id.as_uuid(),
                    &job.stage.to_string(),
                    &job.error_message,
                    &job.document_id.map(|d| d.as_uuid()),
                    &i32::try_from(job.question_count).unwrap_or(i32::MAX),
                    &job.metadata,
                    &job.started_at,
                    &job.completed_at,
                ],
            )
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        if affected == 0 {
            return Err(StoreError::NotFound(job.id));
        }
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Job, StoreError> {
        let client = self.connection().await?;
        let row = client
            .query_opt("SELECT * FROM jobs WHERE id = $1", &[&job_id.as_uuid()])
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?
            .ok_or(StoreError::NotFound(job_id))?;
        Ok(row_to_job(&row))
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let client = self.connection().await?;
        let rows = client
            .query(
                "SELECT * FROM jobs WHERE user_id = $1 ORDER BY created_at \
                 LIMIT $2 OFFSET $3",
                &[
                    &user_id,
                    &i64::try_from(limit).unwrap_or(i64::MAX),
                    &i64::try_from(offset).unwrap_or(0),
                ],
            )
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        Ok(rows.iter().map(row_to_job).collect())
    }
}

/// Shared-ownership handle to any `JobStore` implementation.
pub type SharedJobStore = Arc<dyn JobStore>;
