//! PostgreSQL implementation of the `analyst-core` [`BrokerClient`] trait.
//!
//! Generalizes the teacher workspace's `seesaw-job-postgres::PgJobStore`
//! (optimistic locking via `FOR UPDATE SKIP LOCKED`, exponential-backoff
//! retry scheduling, dead-letter transition on retry exhaustion) from a
//! generic job queue into a queue specifically over [`Job`] and
//! [`ProgressEvent`].
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TYPE job_state AS ENUM (
//!     'pending', 'reserved', 'running', 'succeeded', 'failed', 'canceled'
//! );
//!
//! CREATE TABLE jobs (
//!     id UUID PRIMARY KEY,
//!     question TEXT NOT NULL,
//!     primary_file TEXT,
//!     submitted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     state job_state NOT NULL DEFAULT 'pending',
//!     attempts INTEGER NOT NULL DEFAULT 0,
//!     max_attempts INTEGER NOT NULL DEFAULT 1,
//!     result TEXT,
//!     error_kind TEXT,
//!     error_message TEXT,
//!     progress_cursor BIGINT NOT NULL DEFAULT 0,
//!     worker_id TEXT,
//!     lease_token UUID,
//!     lease_expires_at TIMESTAMPTZ,
//!     canceled BOOLEAN NOT NULL DEFAULT FALSE,
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE job_progress (
//!     job_id UUID NOT NULL REFERENCES jobs(id),
//!     seq BIGINT NOT NULL,
//!     at TIMESTAMPTZ NOT NULL,
//!     phase TEXT NOT NULL,
//!     detail TEXT NOT NULL,
//!     partial_output TEXT,
//!     PRIMARY KEY (job_id, seq)
//! );
//!
//! CREATE INDEX idx_jobs_ready ON jobs (run_at) WHERE state = 'pending';
//! CREATE INDEX idx_jobs_lease ON jobs (lease_expires_at)
//!     WHERE state IN ('reserved', 'running');
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use analyst_broker_postgres::PgBrokerClient;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/analyst").await?;
//! let broker = PgBrokerClient::new(pool);
//! ```

use analyst_core::{
    async_trait, BrokerClient, ClaimedLease, CoreError, Job, JobError, JobId, JobOutcome,
    JobState, Phase, ProgressEvent,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Duration;
use tokio_stream::Stream;
use uuid::Uuid;

fn str_to_state(s: &str) -> JobState {
    match s {
        "pending" => JobState::Pending,
        "reserved" => JobState::Reserved,
        "running" => JobState::Running,
        "succeeded" => JobState::Succeeded,
        "failed" => JobState::Failed,
        "canceled" => JobState::Canceled,
        _ => JobState::Failed,
    }
}

fn row_to_job(row: &PgRow) -> Job {
    let error_kind: Option<String> = row.get("error_kind");
    let error_message: Option<String> = row.get("error_message");
    let error = match (error_kind, error_message) {
        (Some(kind), Some(message)) => Some(JobError::new(kind, message)),
        _ => None,
    };
    let attempts: i32 = row.get("attempts");
    let max_attempts: i32 = row.get("max_attempts");
    let progress_cursor: i64 = row.get("progress_cursor");
    let state_str: String = row.get("state");
    Job {
        id: row.get("id"),
        question: row.get("question"),
        primary_file: row.get("primary_file"),
        submitted_at: row.get("submitted_at"),
        state: str_to_state(&state_str),
        attempts: attempts as u32,
        max_attempts: max_attempts as u32,
        result: row.get("result"),
        error,
        progress_cursor: progress_cursor as u64,
    }
}

/// PostgreSQL broker. Holds a connection pool and the default lease
/// duration new reservations are given.
#[derive(Clone)]
pub struct PgBrokerClient {
    pool: PgPool,
    default_lease: Duration,
    poll_interval: Duration,
}

impl PgBrokerClient {
    /// Create a broker with a 10-minute default lease, matching spec §6's
    /// `lease_duration` default.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            default_lease: Duration::from_secs(600),
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_lease_duration(pool: PgPool, lease: Duration) -> Self {
        Self {
            pool,
            default_lease: lease,
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Return leases whose `lease_expires_at` has passed to `pending`,
    /// incrementing `attempts` or moving to `failed` if the retry budget is
    /// exhausted. Called on every `reserve` poll, mirroring the teacher's
    /// `reclaim_expired` maintenance routine but folded into the hot path
    /// instead of a separate periodic job, since the spec requires this to
    /// happen automatically rather than via an operator-run task.
    async fn reclaim_expired(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending',
                worker_id = NULL,
                lease_token = NULL,
                lease_expires_at = NULL,
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE state IN ('reserved', 'running')
              AND lease_expires_at < NOW()
              AND attempts < max_attempts
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed',
                error_kind = 'WallTimeout',
                error_message = 'lease expired and retry budget exhausted',
                updated_at = NOW()
            WHERE state IN ('reserved', 'running')
              AND lease_expires_at < NOW()
              AND attempts >= max_attempts
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl BrokerClient for PgBrokerClient {
    async fn submit(&self, job: Job) -> Result<JobId, CoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, question, primary_file, submitted_at, run_at, state, attempts, max_attempts)
            VALUES ($1, $2, $3, $4, $4, 'pending', $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(&job.question)
        .bind(&job.primary_file)
        .bind(job.submitted_at)
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        Ok(job.id)
    }

    async fn reserve(&self, worker_id: &str, timeout: Duration) -> Result<Option<ClaimedLease>, CoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.reclaim_expired().await?;

            let lease_token = Uuid::new_v4();
            let lease_expires_at = Utc::now()
                + ChronoDuration::from_std(self.default_lease).unwrap_or(ChronoDuration::seconds(600));

            let row = sqlx::query(
                r#"
                WITH claimable AS (
                    SELECT id
                    FROM jobs
                    WHERE state = 'pending'
                      AND run_at <= NOW()
                    ORDER BY run_at ASC
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                UPDATE jobs
                SET state = 'reserved',
                    worker_id = $1,
                    lease_token = $2,
                    lease_expires_at = $3,
                    updated_at = NOW()
                WHERE id IN (SELECT id FROM claimable)
                RETURNING *
                "#,
            )
            .bind(worker_id)
            .bind(lease_token)
            .bind(lease_expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;

            if let Some(row) = row {
                let job = row_to_job(&row);
                tracing::debug!(job_id = %job.id, worker_id, "reserved job");
                return Ok(Some(ClaimedLease {
                    job,
                    token: lease_token,
                    expires_at: lease_expires_at,
                }));
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            // Jittered so a fleet of idle workers doesn't poll in lockstep.
            let jitter = Duration::from_millis(fastrand::u64(0..50));
            tokio::time::sleep(self.poll_interval.min(Duration::from_millis(200)) + jitter).await;
        }
    }

    async fn extend(&self, lease: &ClaimedLease, duration: Duration) -> Result<ClaimedLease, CoreError> {
        let new_expiry = Utc::now()
            + ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::seconds(600));

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = $1, updated_at = NOW()
            WHERE id = $2
              AND lease_token = $3
              AND state IN ('reserved', 'running')
            "#,
        )
        .bind(new_expiry)
        .bind(lease.job.id)
        .bind(lease.token)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::BrokerError(
                "lease already expired and reclaimed".into(),
            ));
        }

        Ok(ClaimedLease {
            job: lease.job.clone(),
            token: lease.token,
            expires_at: new_expiry,
        })
    }

    async fn publish_progress(&self, id: JobId, mut event: ProgressEvent) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        let next_seq: i64 = sqlx::query(
            "SELECT COALESCE(MAX(seq), 0) + 1 AS next_seq FROM job_progress WHERE job_id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| CoreError::BrokerError(e.to_string()))?
        .get("next_seq");

        event.seq = next_seq as u64;

        sqlx::query(
            r#"
            INSERT INTO job_progress (job_id, seq, at, phase, detail, partial_output)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(next_seq)
        .bind(event.at)
        .bind(format!("{:?}", event.phase))
        .bind(&event.detail)
        .bind(&event.partial_output)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        sqlx::query("UPDATE jobs SET progress_cursor = $1, updated_at = NOW() WHERE id = $2")
            .bind(next_seq)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        tx.commit().await.map_err(|e| CoreError::BrokerError(e.to_string()))?;
        Ok(())
    }

    async fn subscribe_progress(
        &self,
        id: JobId,
        from_seq: u64,
    ) -> Result<std::pin::Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>, CoreError> {
        let pool = self.pool.clone();
        let poll_interval = self.poll_interval;
        let stream = futures::stream::unfold(
            (pool, id, from_seq as i64, false),
            move |(pool, id, cursor, done)| async move {
                if done {
                    return None;
                }
                loop {
                    let rows = sqlx::query(
                        "SELECT seq, at, phase, detail, partial_output FROM job_progress \
                         WHERE job_id = $1 AND seq >= $2 ORDER BY seq",
                    )
                    .bind(id)
                    .bind(cursor)
                    .fetch_all(&pool)
                    .await
                    .unwrap_or_default();

                    if let Some(row) = rows.into_iter().next() {
                        let seq: i64 = row.get("seq");
                        let phase_str: String = row.get("phase");
                        let phase = parse_phase(&phase_str);
                        let event = ProgressEvent {
                            seq: seq as u64,
                            at: row.get("at"),
                            phase,
                            detail: row.get("detail"),
                            partial_output: row.get("partial_output"),
                        };
                        let terminal = event.phase.is_terminal();
                        return Some((event, (pool, id, seq + 1, terminal)));
                    }

                    tokio::time::sleep(poll_interval).await;
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn complete(&self, lease: ClaimedLease, outcome: JobOutcome) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        let current: Option<PgRow> = sqlx::query("SELECT state FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(lease.job.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        let Some(current) = current else {
            return Err(CoreError::NotFound(lease.job.id.to_string()));
        };
        let current_state: String = current.get("state");
        if str_to_state(&current_state).is_terminal() {
            // idempotent: a duplicate complete() call on an already-terminal
            // job (e.g. retried after a transport blip) is a no-op.
            tx.commit().await.ok();
            return Ok(());
        }

        let event = match &outcome {
            JobOutcome::Succeeded(result) => {
                sqlx::query(
                    "UPDATE jobs SET state = 'succeeded', result = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(result)
                .bind(lease.job.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::BrokerError(e.to_string()))?;
                ProgressEvent::new(Phase::Completed, "completed").with_partial_output(result.clone())
            }
            JobOutcome::Failed { kind, message } => {
                sqlx::query(
                    "UPDATE jobs SET state = 'failed', error_kind = $1, error_message = $2, updated_at = NOW() WHERE id = $3",
                )
                .bind(kind)
                .bind(message)
                .bind(lease.job.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::BrokerError(e.to_string()))?;
                ProgressEvent::new(Phase::Failed, format!("{kind}: {message}"))
            }
            JobOutcome::Canceled => {
                sqlx::query("UPDATE jobs SET state = 'canceled', updated_at = NOW() WHERE id = $1")
                    .bind(lease.job.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| CoreError::BrokerError(e.to_string()))?;
                ProgressEvent::new(Phase::Failed, "canceled")
            }
        };

        let next_seq: i64 = sqlx::query(
            "SELECT COALESCE(MAX(seq), 0) + 1 AS next_seq FROM job_progress WHERE job_id = $1 FOR UPDATE",
        )
        .bind(lease.job.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| CoreError::BrokerError(e.to_string()))?
        .get("next_seq");

        sqlx::query(
            "INSERT INTO job_progress (job_id, seq, at, phase, detail, partial_output) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(lease.job.id)
        .bind(next_seq)
        .bind(event.at)
        .bind(format!("{:?}", event.phase))
        .bind(&event.detail)
        .bind(&event.partial_output)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        tx.commit().await.map_err(|e| CoreError::BrokerError(e.to_string()))?;
        Ok(())
    }

    async fn fail_and_requeue(&self, lease: ClaimedLease, reason: &str) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        let row = sqlx::query("SELECT attempts, max_attempts FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(lease.job.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;
        let attempts: i32 = row.get("attempts");
        let max_attempts: i32 = row.get("max_attempts");

        if attempts < max_attempts {
            let base_secs = 2i64.pow(attempts.max(0) as u32).min(3600);
            let jitter_secs = fastrand::i64(0..=base_secs.max(1) / 4 + 1);
            let retry_at = Utc::now() + ChronoDuration::seconds(base_secs + jitter_secs);
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'pending',
                    run_at = $1,
                    attempts = attempts + 1,
                    worker_id = NULL,
                    lease_token = NULL,
                    lease_expires_at = NULL,
                    updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(retry_at)
            .bind(lease.job.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'failed',
                    error_kind = 'BrokerError',
                    error_message = $1,
                    updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(reason)
            .bind(lease.job.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| CoreError::BrokerError(e.to_string()))?;
        Ok(())
    }

    async fn status(&self, id: JobId) -> Result<Option<Job>, CoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;
        Ok(row.map(|r| row_to_job(&r)))
    }

    async fn cancel(&self, id: JobId) -> Result<(), CoreError> {
        sqlx::query("UPDATE jobs SET canceled = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;
        Ok(())
    }

    async fn is_canceled(&self, id: JobId) -> Result<bool, CoreError> {
        let row = sqlx::query("SELECT canceled FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;
        Ok(row.map(|r| r.get::<bool, _>("canceled")).unwrap_or(false))
    }
}

fn parse_phase(s: &str) -> Phase {
    match s {
        "Queued" => Phase::Queued,
        "LoadingContext" => Phase::LoadingContext,
        "Prompting" => Phase::Prompting,
        "GeneratingCode" => Phase::GeneratingCode,
        "ExecutingCode" => Phase::ExecutingCode,
        "Summarizing" => Phase::Summarizing,
        "Completed" => Phase::Completed,
        _ => Phase::Failed,
    }
}

/// Utility functions not part of the `BrokerClient` trait, used by
/// operational tooling (cleanup cron, queue dashboards).
impl PgBrokerClient {
    /// Delete succeeded jobs older than `older_than`, matching spec §1's
    /// "short retention window" non-goal on persisting finished results.
    pub async fn cleanup_succeeded(&self, older_than: DateTime<Utc>) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE state = 'succeeded' AND updated_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::BrokerError(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Snapshot counts per state, for operator dashboards.
    pub async fn stats(&self) -> Result<QueueStats, CoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE state = 'pending') as pending,
                COUNT(*) FILTER (WHERE state IN ('reserved', 'running')) as running,
                COUNT(*) FILTER (WHERE state = 'succeeded') as succeeded,
                COUNT(*) FILTER (WHERE state = 'failed') as failed
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::BrokerError(e.to_string()))?;

        Ok(QueueStats {
            pending: row.get("pending"),
            running: row.get("running"),
            succeeded: row.get("succeeded"),
            failed: row.get("failed"),
        })
    }
}

/// Job queue statistics.
#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
}
