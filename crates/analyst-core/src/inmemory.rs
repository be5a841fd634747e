//! An in-process [`BrokerClient`] backed by [`dashmap`], used by tests and
//! by the worked examples. Mirrors the shape of
//! `analyst-broker-postgres::PgBrokerClient` without a database: useful for
//! exercising the Orchestrator and Worker Pool without standing up
//! Postgres.

use crate::broker::{is_terminal_state, ClaimedLease, FailureKind, JobOutcome};
use crate::{BrokerClient, CoreError, Job, JobId, JobState, Phase, ProgressEvent};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

struct Lease {
    token: Uuid,
    expires_at: chrono::DateTime<Utc>,
}

/// In-memory broker. Cheap to clone (internally `Arc`-wrapped state);
/// intended for a single process.
#[derive(Clone)]
pub struct InMemoryBrokerClient {
    jobs: Arc<DashMap<JobId, Job>>,
    progress: Arc<DashMap<JobId, Vec<ProgressEvent>>>,
    leases: Arc<DashMap<JobId, Lease>>,
    canceled: Arc<DashMap<JobId, bool>>,
    queue: Arc<Mutex<VecDeque<JobId>>>,
    notify: Arc<Notify>,
}

impl Default for InMemoryBrokerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBrokerClient {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            progress: Arc::new(DashMap::new()),
            leases: Arc::new(DashMap::new()),
            canceled: Arc::new(DashMap::new()),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    fn reclaim_expired(&self) {
        let now = Utc::now();
        let mut expired = Vec::new();
        for entry in self.leases.iter() {
            if entry.value().expires_at < now {
                expired.push(*entry.key());
            }
        }
        for id in expired {
            self.leases.remove(&id);
            if let Some(mut job) = self.jobs.get_mut(&id) {
                if job.state == JobState::Reserved || job.state == JobState::Running {
                    if job.attempts < job.max_attempts {
                        job.attempts += 1;
                        job.state = JobState::Pending;
                        drop(job);
                        // requeue synchronously; queue lock is uncontended in tests
                        if let Ok(mut q) = self.queue.try_lock() {
                            q.push_back(id);
                        }
                        self.notify.notify_waiters();
                    } else {
                        job.state = JobState::Failed;
                        job.error = Some(crate::JobError::new(
                            "WallTimeout",
                            "lease expired and retry budget exhausted",
                        ));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl BrokerClient for InMemoryBrokerClient {
    async fn submit(&self, job: Job) -> Result<JobId, CoreError> {
        let id = job.id;
        self.jobs.insert(id, job);
        self.progress.insert(id, Vec::new());
        self.queue.lock().await.push_back(id);
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn reserve(&self, worker_id: &str, timeout: Duration) -> Result<Option<ClaimedLease>, CoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.reclaim_expired();
            let next = self.queue.lock().await.pop_front();
            if let Some(id) = next {
                if let Some(mut job) = self.jobs.get_mut(&id) {
                    if job.state != JobState::Pending {
                        continue;
                    }
                    job.state = JobState::Reserved;
                    let token = Uuid::new_v4();
                    let expires_at = Utc::now() + chrono::Duration::seconds(60);
                    self.leases.insert(
                        id,
                        Lease {
                            token,
                            expires_at,
                        },
                    );
                    let job_clone = job.clone();
                    drop(job);
                    tracing::debug!(job_id = %id, worker_id, "reserved job");
                    return Ok(Some(ClaimedLease {
                        job: job_clone,
                        token,
                        expires_at,
                    }));
                }
                continue;
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            let wait = tokio::time::timeout(Duration::from_millis(50), self.notify.notified());
            let _ = wait.await;
        }
    }

    async fn extend(&self, lease: &ClaimedLease, duration: Duration) -> Result<ClaimedLease, CoreError> {
        let mut entry = self
            .leases
            .get_mut(&lease.job.id)
            .ok_or_else(|| CoreError::BrokerError("lease already reclaimed".into()))?;
        if entry.token != lease.token {
            return Err(CoreError::BrokerError("lease token mismatch".into()));
        }
        entry.expires_at = Utc::now()
            + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::seconds(60));
        Ok(ClaimedLease {
            job: lease.job.clone(),
            token: lease.token,
            expires_at: entry.expires_at,
        })
    }

    async fn publish_progress(&self, id: JobId, mut event: ProgressEvent) -> Result<(), CoreError> {
        let mut stream = self
            .progress
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        let next_seq = stream.last().map(|e| e.seq + 1).unwrap_or(1);
        event.seq = next_seq;
        if let Some(mut job) = self.jobs.get_mut(&id) {
            job.progress_cursor = next_seq;
        }
        stream.push(event);
        Ok(())
    }

    async fn subscribe_progress(
        &self,
        id: JobId,
        from_seq: u64,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>, CoreError> {
        let progress = self.progress.clone();
        // State machine for futures::stream::unfold: a cursor plus a small
        // pending buffer of already-fetched-but-not-yet-yielded events, and
        // a `done` flag once the terminal event has been emitted.
        struct SubState {
            cursor: u64,
            pending: VecDeque<ProgressEvent>,
            done: bool,
        }
        let state = SubState {
            cursor: from_seq,
            pending: VecDeque::new(),
            done: false,
        };
        let stream = futures::stream::unfold((state, progress, id), |(mut state, progress, id)| async move {
            loop {
                if state.done {
                    return None;
                }
                if let Some(event) = state.pending.pop_front() {
                    state.cursor = event.seq + 1;
                    if event.phase.is_terminal() {
                        state.done = true;
                    }
                    return Some((event, (state, progress, id)));
                }
                let fetched: Vec<ProgressEvent> = progress
                    .get(&id)
                    .map(|v| v.iter().filter(|e| e.seq >= state.cursor).cloned().collect())
                    .unwrap_or_default();
                if fetched.is_empty() {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    continue;
                }
                state.pending = fetched.into();
            }
        });
        Ok(Box::pin(stream))
    }

    async fn complete(&self, lease: ClaimedLease, outcome: JobOutcome) -> Result<(), CoreError> {
        let mut job = self
            .jobs
            .get_mut(&lease.job.id)
            .ok_or_else(|| CoreError::NotFound(lease.job.id.to_string()))?;
        if is_terminal_state(job.state) {
            // already completed by a prior (possibly duplicate) call; idempotent no-op
            return Ok(());
        }
        let event = match &outcome {
            JobOutcome::Succeeded(result) => {
                job.state = JobState::Succeeded;
                job.result = Some(result.clone());
                ProgressEvent::new(Phase::Completed, "completed").with_partial_output(result.clone())
            }
            JobOutcome::Failed { kind, message } => {
                job.state = JobState::Failed;
                job.error = Some(crate::JobError::new(kind.clone(), message.clone()));
                ProgressEvent::new(Phase::Failed, format!("{kind}: {message}"))
            }
            JobOutcome::Canceled => {
                job.state = JobState::Canceled;
                ProgressEvent::new(Phase::Failed, "canceled")
            }
        };
        let id = job.id;
        drop(job);
        self.leases.remove(&id);
        self.publish_progress(id, event).await?;
        Ok(())
    }

    async fn fail_and_requeue(&self, lease: ClaimedLease, reason: &str) -> Result<(), CoreError> {
        let mut job = self
            .jobs
            .get_mut(&lease.job.id)
            .ok_or_else(|| CoreError::NotFound(lease.job.id.to_string()))?;
        let id = job.id;
        if job.attempts < job.max_attempts {
            job.attempts += 1;
            job.state = JobState::Pending;
            drop(job);
            self.leases.remove(&id);
            self.queue.lock().await.push_back(id);
            self.notify.notify_waiters();
        } else {
            job.state = JobState::Failed;
            job.error = Some(crate::JobError::new(FailureKind::Retryable.label(), reason));
            drop(job);
            self.leases.remove(&id);
        }
        Ok(())
    }

    async fn status(&self, id: JobId) -> Result<Option<Job>, CoreError> {
        Ok(self.jobs.get(&id).map(|j| j.clone()))
    }

    async fn cancel(&self, id: JobId) -> Result<(), CoreError> {
        self.canceled.insert(id, true);
        Ok(())
    }

    async fn is_canceled(&self, id: JobId) -> Result<bool, CoreError> {
        Ok(self.canceled.get(&id).map(|v| *v).unwrap_or(false))
    }
}

impl FailureKind {
    fn label(self) -> &'static str {
        match self {
            FailureKind::Retryable => "ModelUnavailable",
            FailureKind::NonRetryable => "ModelProtocolError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_then_reserve_moves_to_reserved() {
        let broker = InMemoryBrokerClient::new();
        let job = Job::new("what is the median price?".into(), None, 1);
        let id = broker.submit(job).await.unwrap();

        let lease = broker
            .reserve("worker-1", Duration::from_millis(200))
            .await
            .unwrap()
            .expect("job should be reservable");
        assert_eq!(lease.job.id, id);
        let status = broker.status(id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Reserved);
    }

    #[tokio::test]
    async fn single_terminal_write() {
        let broker = InMemoryBrokerClient::new();
        let job = Job::new("q".into(), None, 1);
        let id = job.id;
        broker.submit(job).await.unwrap();
        let lease = broker
            .reserve("w", Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        broker
            .complete(lease.clone(), JobOutcome::Succeeded("42".into()))
            .await
            .unwrap();
        // A second complete call on the same (stale) lease must not flip the
        // already-terminal state.
        broker
            .complete(
                lease,
                JobOutcome::Failed {
                    kind: "X".into(),
                    message: "late".into(),
                },
            )
            .await
            .unwrap();
        let status = broker.status(id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Succeeded);
        assert_eq!(status.result.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn progress_seq_is_monotone() {
        let broker = InMemoryBrokerClient::new();
        let job = Job::new("q".into(), None, 1);
        let id = broker.submit(job).await.unwrap();
        for i in 0..3 {
            broker
                .publish_progress(id, ProgressEvent::new(Phase::LoadingContext, format!("step {i}")))
                .await
                .unwrap();
        }
        let mut stream = broker.subscribe_progress(id, 1).await.unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.seq, 1);
        let second = stream.next().await.unwrap();
        assert_eq!(second.seq, 2);
    }

    #[tokio::test]
    async fn lease_expiry_requeues_with_incremented_attempts() {
        let broker = InMemoryBrokerClient::new();
        let job = Job::new("q".into(), None, 3);
        broker.submit(job).await.unwrap();
        let lease = broker
            .reserve("w1", Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        // force the lease to be already expired
        broker
            .leases
            .get_mut(&lease.job.id)
            .unwrap()
            .expires_at = Utc::now() - chrono::Duration::seconds(1);

        let requeued = broker
            .reserve("w2", Duration::from_millis(200))
            .await
            .unwrap()
            .expect("reclaimed job should be reservable again");
        assert_eq!(requeued.job.attempts, 1);
    }

    #[tokio::test]
    async fn fail_and_requeue_and_lease_expiry_agree_on_the_retry_boundary() {
        // Same `attempts < max_attempts` predicate the lease-expiry path uses
        // (see `reclaim_expired` above) must govern an explicit nack too, so
        // a job sees the same number of attempts whether a worker crashes or
        // calls `fail_and_requeue` at the same `attempts` count.
        let broker = InMemoryBrokerClient::new();
        let job = Job::new("q".into(), None, 1);
        let id = broker.submit(job).await.unwrap();

        let lease = broker.reserve("w1", Duration::from_millis(200)).await.unwrap().unwrap();
        broker.fail_and_requeue(lease, "transient").await.unwrap();
        let requeued = broker.status(id).await.unwrap().unwrap();
        assert_eq!(requeued.state, JobState::Pending);
        assert_eq!(requeued.attempts, 1);

        let lease = broker.reserve("w2", Duration::from_millis(200)).await.unwrap().unwrap();
        broker.fail_and_requeue(lease, "transient again").await.unwrap();
        let failed = broker.status(id).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.attempts, 1);
    }
}
