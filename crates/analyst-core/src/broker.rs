use crate::{CoreError, Job, JobId, JobState, ProgressEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_stream::Stream;
use uuid::Uuid;

/// Why a job's attempt failed, carried into `fail_and_requeue` so the broker
/// can decide between a retry and a terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Retryable,
    NonRetryable,
}

/// A worker's time-bounded exclusive hold on a reserved job. Opaque to
/// callers beyond its expiry; the broker is the only party that interprets
/// the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedLease {
    pub job: Job,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// The outcome an Orchestrator hands to `complete`: either the final result
/// text or a terminal error.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded(String),
    Failed { kind: String, message: String },
    Canceled,
}

/// Durable queue and small key-value store over a pluggable backend (spec
/// §4.1). Implementations must guarantee: at-most-one terminal transition
/// per job; a reserved job whose lease expires without completion is
/// automatically returned to `PENDING` with `attempts` incremented;
/// progress events never flow backward in `seq`.
///
/// Connectivity faults should be retried with exponential backoff and
/// jitter inside the implementation before surfacing a [`CoreError`] — the
/// caller only sees a failure once backoff is exhausted.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Atomically persist `job` with state `PENDING` and enqueue its id on
    /// the default work queue. Idempotent when the caller supplies its own
    /// `job.id`.
    async fn submit(&self, job: Job) -> Result<JobId, CoreError>;

    /// Block up to `timeout` for an eligible job. On success, moves state to
    /// `RESERVED` and returns a lease with an expiry. Exactly one reserver
    /// succeeds per enqueue.
    async fn reserve(&self, worker_id: &str, timeout: Duration) -> Result<Option<ClaimedLease>, CoreError>;

    /// Push a lease's expiry forward. Fails if the lease has already expired
    /// and been reclaimed by another worker.
    async fn extend(&self, lease: &ClaimedLease, duration: Duration) -> Result<ClaimedLease, CoreError>;

    /// Append an event to the job's progress stream. `seq` is assigned
    /// server-side by monotone increment; loss is tolerable, duplication is
    /// not.
    async fn publish_progress(&self, id: JobId, event: ProgressEvent) -> Result<(), CoreError>;

    /// Lazy, in-order sequence of events with `seq >= from_seq`, terminating
    /// once a terminal event (`phase` = completed or failed) has been
    /// observed.
    async fn subscribe_progress(
        &self,
        id: JobId,
        from_seq: u64,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>, CoreError>;

    /// Atomically set a terminal state and publish the final progress
    /// event; releases the lease. Idempotent by lease token.
    async fn complete(&self, lease: ClaimedLease, outcome: JobOutcome) -> Result<(), CoreError>;

    /// Nack the lease. If `attempts < max_attempts`, returns the job to
    /// `PENDING` with `attempts` incremented; otherwise transitions to
    /// `FAILED`.
    async fn fail_and_requeue(&self, lease: ClaimedLease, reason: &str) -> Result<(), CoreError>;

    /// Single-shot read of a job's current state.
    async fn status(&self, id: JobId) -> Result<Option<Job>, CoreError>;

    /// Best-effort cancellation: sets a flag observable by the Orchestrator
    /// at its next state boundary. Has no effect on a job already past its
    /// terminal write.
    async fn cancel(&self, id: JobId) -> Result<(), CoreError>;

    /// Whether `cancel` has been requested for this job. The Orchestrator
    /// polls this at every state boundary and before every model request.
    async fn is_canceled(&self, id: JobId) -> Result<bool, CoreError>;
}

/// Helper shared by broker implementations: a job is terminal once its
/// state is one of the three absorbing states.
pub fn is_terminal_state(state: JobState) -> bool {
    state.is_terminal()
}
