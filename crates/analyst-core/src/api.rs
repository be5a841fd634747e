//! The four core-facing operations of spec §4.7, as a transport-agnostic
//! facade over a [`BrokerClient`]. `analyst-api`'s axum handlers, a CLI, or
//! a test harness can all embed this without re-deriving validation rules.

use crate::{BrokerClient, CoreError, Job, JobError, JobId, JobState, Phase, ProgressEvent};
use std::sync::Arc;
use tokio_stream::Stream;

/// Single-shot status read, shaped for direct JSON serialization.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusView {
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl From<Job> for StatusView {
    fn from(job: Job) -> Self {
        Self {
            state: job.state,
            result: job.result,
            error: job.error,
        }
    }
}

/// Thin front validating inputs, assigning identifiers, and delegating to
/// the broker. Holds no state of its own beyond the broker handle.
pub struct JobApi<B: BrokerClient> {
    broker: Arc<B>,
    max_job_attempts: u32,
}

impl<B: BrokerClient> JobApi<B> {
    pub fn new(broker: Arc<B>, max_job_attempts: u32) -> Self {
        Self {
            broker,
            max_job_attempts,
        }
    }

    /// Validate and enqueue a question. An empty question, or a
    /// `primary_file` hint naming a file that is not present, is rejected
    /// with `InputRejected` — per spec §9's open question, zero files
    /// present for a job is also `InputRejected` (callers that know the data
    /// directory should check this before calling submit, since the core
    /// does not own the directory listing).
    pub async fn submit(
        &self,
        question: String,
        primary_file: Option<String>,
    ) -> Result<JobId, CoreError> {
        if question.trim().is_empty() {
            return Err(CoreError::InputRejected("question must not be empty".into()));
        }
        let job = Job::new(question, primary_file, self.max_job_attempts);
        let job_id = self.broker.submit(job).await?;
        // Best-effort: a subscriber connecting before any worker picks up the
        // job should still see a first event rather than an empty stream.
        let event = ProgressEvent::new(Phase::Queued, "job queued");
        if let Err(err) = self.broker.publish_progress(job_id, event).await {
            tracing::warn!(job_id = %job_id, error = %err, "failed to publish queued progress event");
        }
        Ok(job_id)
    }

    pub async fn status(&self, job_id: JobId) -> Result<StatusView, CoreError> {
        let job = self
            .broker
            .status(job_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(job_id.to_string()))?;
        Ok(job.into())
    }

    /// Subscribe to progress from `from_seq` (default 1) until the terminal
    /// event.
    pub async fn stream(
        &self,
        job_id: JobId,
        from_seq: Option<u64>,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>, CoreError> {
        self.broker.subscribe_progress(job_id, from_seq.unwrap_or(1)).await
    }

    /// Best-effort cancellation.
    pub async fn cancel(&self, job_id: JobId) -> Result<(), CoreError> {
        self.broker.cancel(job_id).await
    }
}

impl<B: BrokerClient> Clone for JobApi<B> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            max_job_attempts: self.max_job_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inmemory::InMemoryBrokerClient;

    #[tokio::test]
    async fn rejects_empty_question() {
        let api = JobApi::new(Arc::new(InMemoryBrokerClient::new()), 1);
        let err = api.submit("   ".into(), None).await.unwrap_err();
        assert_eq!(err.kind(), "InputRejected");
    }

    #[tokio::test]
    async fn submit_then_status_round_trips() {
        let api = JobApi::new(Arc::new(InMemoryBrokerClient::new()), 1);
        let id = api.submit("what is the median?".into(), None).await.unwrap();
        let status = api.status(id).await.unwrap();
        assert_eq!(status.state, JobState::Pending);
    }
}
