//! ABOUTME: Job data model and its stage/status state machine

use crate::ids::{DocumentId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The stage a job currently occupies, or one of its two terminal states.
///
/// States: `queued -> {ingesting|parsing|validating|persisting|classifying|
/// vectorizing} -> {completed|failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Ingesting,
    Parsing,
    Validating,
    Persisting,
    Classifying,
    Vectorizing,
    Completed,
    Failed,
}

impl JobStage {
    /// `completed_at` is set iff the stage is one of these two.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Ingesting => "ingesting",
            Self::Parsing => "parsing",
            Self::Validating => "validating",
            Self::Persisting => "persisting",
            Self::Classifying => "classifying",
            Self::Vectorizing => "vectorizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One record per submission: the durable status/history record the Job
/// Registry (C2) owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: String,
    pub source_ref: String,
    pub stage: JobStage,
    pub error_message: Option<String>,
    pub document_id: Option<DocumentId>,
    pub question_count: u32,
    /// Carries degraded-run bookkeeping (`max_attempts_reached`,
    /// `validation_score`, `classification_error`, `vectorization_error`)
    /// that survives after the in-memory Pipeline State is gone.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Initializes a new job in the `queued` stage with a fresh id.
    #[must_use]
    pub fn new(user_id: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            source_ref: source_ref.into(),
            stage: JobStage::Queued,
            error_message: None,
            document_id: None,
            question_count: 0,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Moves the record to a new stage, per §4.2 `update_status`: sets
    /// `started_at` on the first transition away from `queued`, records the
    /// supplied error (if any), and sets `completed_at` once terminal.
    pub fn transition(&mut self, stage: JobStage, error: Option<String>) {
        if self.started_at.is_none() && stage != JobStage::Queued {
            self.started_at = Some(Utc::now());
        }
        self.stage = stage;
        if error.is_some() {
            self.error_message = error;
        }
        if stage.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Merges degraded-run bookkeeping from the Pipeline State's metadata
    /// bag (`max_attempts_reached`, `classification_error`, ...) into the
    /// durable record, so it survives after the in-memory state is gone.
    pub fn merge_metadata(&mut self, extra: serde_json::Map<String, serde_json::Value>) {
        if extra.is_empty() {
            return;
        }
        if let serde_json::Value::Object(map) = &mut self.metadata {
            map.extend(extra);
        }
    }

    /// Terminal success.
    pub fn complete(&mut self, document_id: Option<DocumentId>, question_count: u32) {
        self.document_id = document_id;
        self.question_count = question_count;
        self.transition(JobStage::Completed, None);
    }

    /// Terminal failure.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.transition(JobStage::Failed, Some(error.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_queued_with_no_timestamps_set() {
        let job = Job::new("user-1", "https://example.com/a.pdf");
        assert_eq!(job.stage, JobStage::Queued);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.document_id.is_none());
    }

    #[test]
    fn transition_away_from_queued_sets_started_at_once() {
        let mut job = Job::new("user-1", "ref");
        job.transition(JobStage::Ingesting, None);
        let first_started = job.started_at;
        assert!(first_started.is_some());

        job.transition(JobStage::Parsing, None);
        assert_eq!(job.started_at, first_started);
    }

    #[test]
    fn completed_at_set_iff_terminal() {
        let mut job = Job::new("user-1", "ref");
        job.transition(JobStage::Ingesting, None);
        assert!(job.completed_at.is_none());

        job.complete(Some(DocumentId::new()), 5);
        assert!(job.completed_at.is_some());
        assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
    }

    #[test]
    fn document_id_only_set_on_complete() {
        let mut job = Job::new("user-1", "ref");
        job.fail("boom");
        assert!(job.document_id.is_none());
        assert_eq!(job.stage, JobStage::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }
}
