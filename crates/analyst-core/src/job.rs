use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique token identifying a submitted job.
pub type JobId = Uuid;

/// Lifecycle state of a [`Job`].
///
/// `SUCCEEDED`, `FAILED`, and `CANCELED` are terminal: once observed, a job
/// never transitions again. Exactly one terminal write happens per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Reserved,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Canceled
        )
    }
}

/// Kind + message pair describing why a job ended in `FAILED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: String,
    pub message: String,
}

impl JobError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// A submitted unit of work: a natural-language question over one or more
/// data files, plus its current lifecycle state.
///
/// `attempts` never exceeds the broker's configured `max_job_attempts`;
/// `progress_cursor` is the last `seq` value published for this job, used to
/// resume a `stream` subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub question: String,
    pub primary_file: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub result: Option<String>,
    pub error: Option<JobError>,
    pub progress_cursor: u64,
}

impl Job {
    pub fn new(question: String, primary_file: Option<String>, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            question,
            primary_file,
            submitted_at: Utc::now(),
            state: JobState::Pending,
            attempts: 0,
            max_attempts,
            result: None,
            error: None,
            progress_cursor: 0,
        }
    }
}
