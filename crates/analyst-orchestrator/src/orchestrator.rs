//! Drives a single job from `RESERVED` to terminal (spec §4.5). This is the
//! per-job state machine: context assembly, the bounded generate/execute
//! model loop, progress streaming, and final disposition.
//!
//! Unlike the teacher's multi-machine event bus (`seesaw::Machine` +
//! `Effect`, decide/execute split across independently-scheduled
//! components), a job here is a single sequential pipeline — there is
//! exactly one in-flight job per `Orchestrator::run` call, so the
//! generality of a shared event bus buys nothing and is not carried over
//! (see DESIGN.md). What *is* kept from that split is the discipline of
//! treating each step as "decide what happens next, then perform the one
//! IO action that follows" rather than interleaving state mutation with IO.

use crate::codeblock::extract_code_block;
use crate::error::{ExecutionError, ModelError};
use crate::executor::CodeExecutor;
use crate::model::{Message, ModelClient};
use crate::prompt;
use analyst_core::{
    BrokerClient, ClaimedLease, CoreError, DataFile, FileFormat, Job, JobOutcome, Phase,
    ProgressEvent,
};
use analyst_inflation::InflationCache;
use analyst_schema::{render_normalization_guide, SchemaInspector};
use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Everything the Orchestrator needs that isn't a collaborator trait object:
/// directory location, bounding rules, and sampling knobs. Mirrors
/// `analyst_core::Config`'s fields relevant to a single job run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub data_dir: PathBuf,
    pub lease_duration: Duration,
    pub lease_extension_interval: Duration,
    pub per_exec_timeout: Duration,
    pub per_job_exec_budget: Duration,
    pub per_job_wall_timeout: Duration,
    pub per_model_request_timeout: Duration,
    pub max_rounds: u32,
    pub max_file_bytes: u64,
    pub sample_rows: usize,
}

/// A terminal disposition that is *not* eligible for retry: deadline,
/// cancellation, malformed model reply, or a bounded-resource breach. Maps
/// directly onto a [`JobOutcome::Failed`]/[`JobOutcome::Canceled`].
enum Terminal {
    Failed(CoreError),
    Canceled,
}

/// A fault at a transport boundary (broker or model connectivity) eligible
/// for `fail_and_requeue` rather than a terminal write.
struct Transient(String);

enum StepOutcome {
    Terminal(Terminal),
    Transient(Transient),
}

impl From<Terminal> for StepOutcome {
    fn from(t: Terminal) -> Self {
        StepOutcome::Terminal(t)
    }
}
impl From<Transient> for StepOutcome {
    fn from(t: Transient) -> Self {
        StepOutcome::Transient(t)
    }
}

type StepResult<T> = Result<T, StepOutcome>;

/// Drives one job at a time. Generic over its three collaborator traits so
/// tests can supply in-memory fakes for all three (broker, model, code
/// executor) without a database, HTTP server, or subprocess.
pub struct Orchestrator<B, M, E> {
    broker: Arc<B>,
    model: Arc<M>,
    executor: Arc<E>,
    inflation: Option<Arc<InflationCache>>,
    config: OrchestratorConfig,
}

impl<B, M, E> Orchestrator<B, M, E>
where
    B: BrokerClient + 'static,
    M: ModelClient + 'static,
    E: CodeExecutor + 'static,
{
    pub fn new(
        broker: Arc<B>,
        model: Arc<M>,
        executor: Arc<E>,
        inflation: Option<Arc<InflationCache>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { broker, model, executor, inflation, config }
    }

    /// Drive `lease`'s job from `prepare` to a terminal write, then perform
    /// exactly that one terminal broker call (`complete` or
    /// `fail_and_requeue`). No externally visible side effect other than
    /// progress events happens before that call (spec §5's at-least-once
    /// delivery note).
    pub async fn run(&self, lease: ClaimedLease) -> Result<(), CoreError> {
        self.run_with_wall_timeout(lease, self.config.per_job_wall_timeout).await
    }

    /// Same as [`Orchestrator::run`], but bounds the job to `wall_timeout`
    /// instead of `config.per_job_wall_timeout`. The Worker Pool uses this
    /// to give an in-flight job a shorter deadline once a shutdown signal
    /// has arrived (spec §4.6: "let current job run to completion under a
    /// shorter deadline").
    pub async fn run_with_wall_timeout(&self, lease: ClaimedLease, wall_timeout: Duration) -> Result<(), CoreError> {
        let job_id = lease.job.id;
        let deadline = Instant::now() + wall_timeout;

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let ticker_handle = self.spawn_lease_ticker(lease.clone(), stop_rx);

        let drive_result = self.drive(&lease.job, job_id, deadline).await;

        let _ = stop_tx.send(());
        let _ = ticker_handle.await;

        match drive_result {
            Ok(result_text) => self.broker.complete(lease, JobOutcome::Succeeded(result_text)).await,
            Err(StepOutcome::Terminal(Terminal::Canceled)) => {
                self.broker.complete(lease, JobOutcome::Canceled).await
            }
            Err(StepOutcome::Terminal(Terminal::Failed(err))) => {
                tracing::warn!(job_id = %job_id, kind = err.kind(), "job terminated with error");
                self.broker
                    .complete(lease, JobOutcome::Failed { kind: err.kind().to_string(), message: err.to_string() })
                    .await
            }
            Err(StepOutcome::Transient(Transient(reason))) => {
                tracing::warn!(job_id = %job_id, reason = %reason, "transient fault, requeuing");
                self.broker.fail_and_requeue(lease, &reason).await
            }
        }
    }

    fn spawn_lease_ticker(
        &self,
        lease: ClaimedLease,
        mut stop_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let broker = self.broker.clone();
        let interval_dur = self.config.lease_extension_interval;
        let lease_duration = self.config.lease_duration;
        tokio::spawn(async move {
            let mut current = lease;
            let mut interval = tokio::time::interval(interval_dur);
            interval.tick().await; // first tick fires immediately; consume it
            loop {
                tokio::select! {
                    _ = &mut stop_rx => return,
                    _ = interval.tick() => {
                        match broker.extend(&current, lease_duration).await {
                            Ok(renewed) => current = renewed,
                            Err(err) => {
                                tracing::warn!(
                                    job_id = %current.job.id,
                                    error = %err,
                                    "lease extension failed repeatedly, abandoning job to broker reclaim"
                                );
                                return;
                            }
                        }
                    }
                }
            }
        })
    }

    /// The actual state machine: `prepare` folds into the caller (lease
    /// already held), `context` assembles the prompt, then `generate`/
    /// `execute` alternate up to `max_rounds` before falling through to
    /// `summarize`.
    async fn drive(&self, job: &Job, job_id: Uuid, deadline: Instant) -> StepResult<String> {
        self.check_boundary(job_id, deadline).await?;

        let mut conversation = self.context(job, job_id).await?;

        let mut round: u32 = 0;
        let mut cumulative_exec = Duration::ZERO;

        loop {
            self.check_boundary(job_id, deadline).await?;

            round += 1;
            if round > self.config.max_rounds {
                return Err(Terminal::Failed(CoreError::MaxRoundsExceeded).into());
            }

            let reply_content = self.generate(job_id, &conversation, deadline).await?;
            conversation.push(Message::assistant(reply_content.clone()));

            match extract_code_block(&reply_content) {
                Some(code) => {
                    if cumulative_exec >= self.config.per_job_exec_budget {
                        return Err(Terminal::Failed(CoreError::ExecBudgetExhausted).into());
                    }
                    self.publish(job_id, Phase::GeneratingCode, format!("round {round}: generated code")).await;

                    self.check_boundary(job_id, deadline).await?;

                    let remaining_budget = self.config.per_job_exec_budget.saturating_sub(cumulative_exec);
                    let exec_budget = self.config.per_exec_timeout.min(remaining_budget);
                    let started = Instant::now();
                    let outcome = self
                        .executor
                        .execute(&code, exec_budget)
                        .await
                        .map_err(|e| self.map_execution_error(e))?;
                    cumulative_exec += started.elapsed();

                    if cumulative_exec > self.config.per_job_exec_budget {
                        return Err(Terminal::Failed(CoreError::ExecBudgetExhausted).into());
                    }

                    let tail = tail_chars(&outcome.as_observation(), 500);
                    self.publish_with_output(
                        job_id,
                        Phase::ExecutingCode,
                        format!("round {round}: execution {}", if outcome.succeeded() { "succeeded" } else { "failed" }),
                        tail,
                    )
                    .await;

                    // A raised exception inside generated code is an
                    // observation, never a job failure (spec §9) — it is
                    // fed back to the model regardless of exit status.
                    conversation.push(Message::user(outcome.as_observation()));
                }
                None => {
                    self.publish(job_id, Phase::Summarizing, "model returned a final textual answer").await;
                    return Ok(reply_content);
                }
            }
        }
    }

    /// `context` state: enumerate data files, derive schemas, optionally
    /// pull in the inflation summary, and assemble the initial prompt.
    async fn context(&self, job: &Job, job_id: Uuid) -> StepResult<Vec<Message>> {
        let data_files = list_data_files(&self.config.data_dir).map_err(|e| {
            Terminal::Failed(CoreError::NotFound(format!("could not read data directory: {e}")))
        })?;

        if data_files.is_empty() {
            return Err(Terminal::Failed(CoreError::InputRejected(
                "no data files available for analysis".to_string(),
            ))
            .into());
        }

        if let Some(primary) = &job.primary_file {
            if !data_files.iter().any(|f| &f.name == primary) {
                return Err(Terminal::Failed(CoreError::InputRejected(format!(
                    "primary file '{primary}' not found in data directory"
                )))
                .into());
            }
        }

        let inspector = SchemaInspector::new(self.config.sample_rows, self.config.max_file_bytes);
        let schemas = inspector.inspect_all(&self.config.data_dir, &data_files);

        let normalization_guide =
            if data_files.len() >= 2 { Some(render_normalization_guide(&schemas)) } else { None };

        let inflation_summary = match (&self.inflation, prompt::detect_inflation_range(&job.question, Utc::now().year())) {
            (Some(cache), Some((start, end))) => {
                let table = cache.refresh(false).await.unwrap_or_else(|err| {
                    tracing::warn!(job_id = %job_id, error = %err, "inflation load failed, proceeding without it");
                    analyst_inflation::InflationTable::empty("unavailable")
                });
                Some(InflationCache::summary(&table, start, end))
            }
            _ => None,
        };

        self.publish(
            job_id,
            Phase::LoadingContext,
            format!("enumerated {} file(s), derived schemas", data_files.len()),
        )
        .await;

        let conversation = prompt::assemble_initial_conversation(
            &job.question,
            job.primary_file.as_deref(),
            &data_files,
            &schemas,
            normalization_guide.as_deref(),
            inflation_summary.as_deref(),
        );

        self.publish(job_id, Phase::Prompting, "prompt assembled, entering model loop").await;

        Ok(conversation)
    }

    /// `generate` state: issue one model request. Transport faults
    /// (connectivity, request timeout) are transient; an uninterpretable
    /// reply is terminal.
    async fn generate(&self, job_id: Uuid, conversation: &[Message], deadline: Instant) -> StepResult<String> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let request_timeout = self.config.per_model_request_timeout.min(remaining.max(Duration::from_millis(1)));

        let reply = tokio::time::timeout(request_timeout, self.model.complete(conversation))
            .await
            .map_err(|_| ModelError::Timeout)
            .and_then(|r| r);

        match reply {
            Ok(reply) => Ok(reply.content),
            Err(err) => {
                let core_err: CoreError = err.into();
                if core_err.is_retryable() {
                    Err(Transient(core_err.to_string()).into())
                } else {
                    Err(Terminal::Failed(core_err).into())
                }
            }
        }
    }

    fn map_execution_error(&self, err: ExecutionError) -> StepOutcome {
        Terminal::Failed(match err {
            ExecutionError::SpawnFailed(m) => CoreError::ExecutorUnavailable(m),
            ExecutionError::Io(m) => CoreError::ExecutorUnavailable(m),
            ExecutionError::Timeout => CoreError::ExecutionTimeout,
        })
        .into()
    }

    /// Checked at every state boundary and before every model request
    /// (spec §4.5's cancellation contract).
    async fn check_boundary(&self, job_id: Uuid, deadline: Instant) -> StepResult<()> {
        if Instant::now() >= deadline {
            return Err(Terminal::Failed(CoreError::WallTimeout).into());
        }
        match self.broker.is_canceled(job_id).await {
            Ok(true) => Err(Terminal::Canceled.into()),
            Ok(false) => Ok(()),
            Err(err) => Err(Transient(err.to_string()).into()),
        }
    }

    async fn publish(&self, job_id: Uuid, phase: Phase, detail: impl Into<String>) {
        self.publish_with_output(job_id, phase, detail, None).await
    }

    async fn publish_with_output(&self, job_id: Uuid, phase: Phase, detail: impl Into<String>, output: Option<String>) {
        let mut event = ProgressEvent::new(phase, detail);
        if let Some(output) = output {
            event = event.with_partial_output(output);
        }
        // Best-effort durable per spec §4.1: a lost progress event is
        // tolerable, so a publish failure is logged, not propagated.
        if let Err(err) = self.broker.publish_progress(job_id, event).await {
            tracing::warn!(job_id = %job_id, error = %err, "failed to publish progress event");
        }
    }
}

fn tail_chars(s: &str, max: usize) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    if s.chars().count() <= max {
        return Some(s.to_string());
    }
    let skip = s.chars().count() - max;
    Some(s.chars().skip(skip).collect())
}

/// Enumerate the flat data directory into [`DataFile`]s. The directory
/// itself is an external collaborator's concern (spec §1); the Orchestrator
/// only ever reads names, sizes, and mtimes from it, never writes.
fn list_data_files(data_dir: &Path) -> std::io::Result<Vec<DataFile>> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(data_dir)?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext_known = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(FileFormat::from_extension)
            .is_some();
        if !ext_known {
            continue;
        }
        let metadata = entry.metadata()?;
        let mtime = metadata
            .modified()
            .map(chrono::DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        files.push(DataFile::from_path(&path, metadata.len(), mtime));
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionOutcome;
    use analyst_core::inmemory::InMemoryBrokerClient;
    use analyst_core::JobState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_stream::StreamExt;

    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(&self, _conversation: &[Message]) -> Result<crate::model::ModelReply, ModelError> {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ModelError::ProtocolError("no scripted replies left".to_string()));
            }
            let content = replies.remove(0);
            Ok(crate::model::ModelReply { content, tokens_used: None })
        }
    }

    struct FlakyModel {
        attempts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ModelClient for FlakyModel {
        async fn complete(&self, _conversation: &[Message]) -> Result<crate::model::ModelReply, ModelError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ModelError::Unavailable("connection reset".to_string()))
            } else {
                Ok(crate::model::ModelReply { content: "The answer is 42.".to_string(), tokens_used: None })
            }
        }
    }

    struct ScriptedExecutor {
        outcomes: Mutex<Vec<ExecutionOutcome>>,
        per_call_delay: Duration,
    }

    impl ScriptedExecutor {
        fn new(outcomes: Vec<ExecutionOutcome>) -> Self {
            Self { outcomes: Mutex::new(outcomes), per_call_delay: Duration::ZERO }
        }
    }

    #[async_trait::async_trait]
    impl CodeExecutor for ScriptedExecutor {
        async fn execute(&self, _code: &str, _budget: Duration) -> Result<ExecutionOutcome, ExecutionError> {
            if !self.per_call_delay.is_zero() {
                tokio::time::sleep(self.per_call_delay).await;
            }
            let mut outcomes = self.outcomes.lock().unwrap();
            Ok(outcomes.remove(0))
        }
    }

    struct AlwaysTimesOutExecutor;

    #[async_trait::async_trait]
    impl CodeExecutor for AlwaysTimesOutExecutor {
        async fn execute(&self, _code: &str, _budget: Duration) -> Result<ExecutionOutcome, ExecutionError> {
            Err(ExecutionError::Timeout)
        }
    }

    fn test_config(data_dir: PathBuf) -> OrchestratorConfig {
        OrchestratorConfig {
            data_dir,
            lease_duration: Duration::from_secs(60),
            lease_extension_interval: Duration::from_secs(30),
            per_exec_timeout: Duration::from_secs(5),
            per_job_exec_budget: Duration::from_secs(30),
            per_job_wall_timeout: Duration::from_secs(10),
            per_model_request_timeout: Duration::from_secs(5),
            max_rounds: 10,
            max_file_bytes: 1_000_000,
            sample_rows: 5,
        }
    }

    fn write_csv(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn textual_reply_with_no_code_succeeds_immediately() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "a.csv", "Avg_Price\n110.92\n127.24\n101.71\n112.48\n113.50\n");

        let broker = Arc::new(InMemoryBrokerClient::new());
        let model = Arc::new(ScriptedModel { replies: Mutex::new(vec!["The median Avg_Price is 112.48.".to_string()]) });
        let executor = Arc::new(ScriptedExecutor::new(Vec::new()));

        let job = analyst_core::Job::new("what is the median Avg_Price?".to_string(), Some("a.csv".to_string()), 1);
        let job_id = broker.submit(job).await.unwrap();
        let lease = broker.reserve("w", Duration::from_secs(1)).await.unwrap().unwrap();

        let orchestrator = Orchestrator::new(broker.clone(), model, executor, None, test_config(dir.path().to_path_buf()));
        orchestrator.run(lease).await.unwrap();

        let status = broker.status(job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Succeeded);
        assert!(status.result.unwrap().contains("112.48"));
    }

    #[tokio::test]
    async fn code_failure_then_success_ends_succeeded() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "a.csv", "x\n1\n2\n3\n");

        let broker = Arc::new(InMemoryBrokerClient::new());
        let model = Arc::new(ScriptedModel {
            replies: Mutex::new(vec![
                "```python\nprint(undefined_symbol)\n```".to_string(),
                "```python\nprint('mean is 2.0')\n```".to_string(),
                "The mean of x is 2.0.".to_string(),
            ]),
        });
        let executor = Arc::new(ScriptedExecutor::new(vec![
            ExecutionOutcome {
                stdout: String::new(),
                stderr: "NameError: undefined_symbol is not defined".to_string(),
                exit_status: 1,
                final_value_text: None,
            },
            ExecutionOutcome {
                stdout: "mean is 2.0\n".to_string(),
                stderr: String::new(),
                exit_status: 0,
                final_value_text: Some("mean is 2.0".to_string()),
            },
        ]));

        let job = analyst_core::Job::new("what is the mean of x?".to_string(), Some("a.csv".to_string()), 1);
        let job_id = broker.submit(job).await.unwrap();
        let lease = broker.reserve("w", Duration::from_secs(1)).await.unwrap().unwrap();

        let orchestrator = Orchestrator::new(broker.clone(), model, executor, None, test_config(dir.path().to_path_buf()));
        orchestrator.run(lease).await.unwrap();

        let status = broker.status(job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn transport_fault_then_recovery_still_succeeds_without_requeue() {
        // FlakyModel fails once with a retryable transport error; since
        // fail_and_requeue would hand the job to a *different* reserve
        // call, we instead assert the orchestrator classifies it as
        // transient by observing the job is requeued to PENDING, not
        // failed, when max_attempts is exhausted after one try.
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "a.csv", "x\n1\n2\n3\n");

        let broker = Arc::new(InMemoryBrokerClient::new());
        let model = Arc::new(FlakyModel { attempts: AtomicUsize::new(0) });
        let executor = Arc::new(ScriptedExecutor::new(Vec::new()));

        let job = analyst_core::Job::new("what is x?".to_string(), Some("a.csv".to_string()), 1);
        let job_id = broker.submit(job).await.unwrap();
        let lease = broker.reserve("w", Duration::from_secs(1)).await.unwrap().unwrap();

        let orchestrator = Orchestrator::new(broker.clone(), model, executor, None, test_config(dir.path().to_path_buf()));
        orchestrator.run(lease).await.unwrap();

        // max_attempts=1 means attempts+1 (=1) is not < max_attempts, so
        // fail_and_requeue transitions straight to FAILED.
        let status = broker.status(job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Failed);
    }

    #[tokio::test]
    async fn no_data_files_is_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(InMemoryBrokerClient::new());
        let model = Arc::new(ScriptedModel { replies: Mutex::new(Vec::new()) });
        let executor = Arc::new(ScriptedExecutor::new(Vec::new()));

        let job = analyst_core::Job::new("what is the median?".to_string(), None, 1);
        let job_id = broker.submit(job).await.unwrap();
        let lease = broker.reserve("w", Duration::from_secs(1)).await.unwrap().unwrap();

        let orchestrator = Orchestrator::new(broker.clone(), model, executor, None, test_config(dir.path().to_path_buf()));
        orchestrator.run(lease).await.unwrap();

        let status = broker.status(job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error.unwrap().kind, "InputRejected");
    }

    #[tokio::test]
    async fn execution_timeout_fails_with_its_own_kind_not_executor_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "a.csv", "x\n1\n2\n3\n");

        let broker = Arc::new(InMemoryBrokerClient::new());
        let model = Arc::new(ScriptedModel {
            replies: Mutex::new(vec!["```python\nwhile True: pass\n```".to_string()]),
        });
        let executor = Arc::new(AlwaysTimesOutExecutor);

        let job = analyst_core::Job::new("what is the mean of x?".to_string(), Some("a.csv".to_string()), 1);
        let job_id = broker.submit(job).await.unwrap();
        let lease = broker.reserve("w", Duration::from_secs(1)).await.unwrap().unwrap();

        let orchestrator = Orchestrator::new(broker.clone(), model, executor, None, test_config(dir.path().to_path_buf()));
        orchestrator.run(lease).await.unwrap();

        let status = broker.status(job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error.unwrap().kind, "ExecutionTimeout");
    }

    #[tokio::test]
    async fn cumulative_exec_budget_exhaustion_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "a.csv", "x\n1\n2\n3\n");

        let broker = Arc::new(InMemoryBrokerClient::new());
        // Every round emits code, never a plain-text answer, forcing the
        // loop to keep executing until the budget check trips.
        let model = Arc::new(ScriptedModel {
            replies: Mutex::new(vec!["```python\npass\n```".to_string(); 10]),
        });
        let mut executor = ScriptedExecutor::new(
            std::iter::repeat_with(|| ExecutionOutcome {
                stdout: "ok\n".to_string(),
                stderr: String::new(),
                exit_status: 0,
                final_value_text: Some("ok".to_string()),
            })
            .take(10)
            .collect(),
        );
        // Each execution takes longer than the per-job budget allows for two
        // rounds, so the loop trips ExecBudgetExhausted deterministically
        // instead of racing real scheduler jitter against a near-zero budget.
        executor.per_call_delay = Duration::from_millis(50);
        let executor = Arc::new(executor);

        let job = analyst_core::Job::new("loop forever".to_string(), Some("a.csv".to_string()), 1);
        let job_id = broker.submit(job).await.unwrap();
        let lease = broker.reserve("w", Duration::from_secs(1)).await.unwrap().unwrap();

        let mut cfg = test_config(dir.path().to_path_buf());
        cfg.per_job_exec_budget = Duration::from_millis(80);
        cfg.max_rounds = 10;

        let orchestrator = Orchestrator::new(broker.clone(), model, executor, None, cfg);
        orchestrator.run(lease).await.unwrap();

        let status = broker.status(job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error.unwrap().kind, "ExecBudgetExhausted");
    }

    #[tokio::test]
    async fn cancellation_between_rounds_ends_canceled() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "a.csv", "x\n1\n2\n3\n");

        let broker = Arc::new(InMemoryBrokerClient::new());
        let model = Arc::new(ScriptedModel {
            replies: Mutex::new(vec!["```python\npass\n```".to_string(); 10]),
        });
        let executor = Arc::new(ScriptedExecutor::new(
            std::iter::repeat_with(|| ExecutionOutcome {
                stdout: "ok\n".to_string(),
                stderr: String::new(),
                exit_status: 0,
                final_value_text: Some("ok".to_string()),
            })
            .take(10)
            .collect(),
        ));

        let job = analyst_core::Job::new("loop forever".to_string(), Some("a.csv".to_string()), 1);
        let job_id = broker.submit(job).await.unwrap();
        broker.cancel(job_id).await.unwrap();
        let lease = broker.reserve("w", Duration::from_secs(1)).await.unwrap().unwrap();

        let orchestrator = Orchestrator::new(broker.clone(), model, executor, None, test_config(dir.path().to_path_buf()));
        orchestrator.run(lease).await.unwrap();

        let status = broker.status(job_id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Canceled);
    }

    #[tokio::test]
    async fn progress_events_are_strictly_monotone_and_end_terminal() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "a.csv", "x\n1\n2\n3\n");

        let broker = Arc::new(InMemoryBrokerClient::new());
        let model = Arc::new(ScriptedModel { replies: Mutex::new(vec!["Done, answer is 2.".to_string()]) });
        let executor = Arc::new(ScriptedExecutor::new(Vec::new()));

        let job = analyst_core::Job::new("what is x?".to_string(), Some("a.csv".to_string()), 1);
        let job_id = broker.submit(job).await.unwrap();
        let lease = broker.reserve("w", Duration::from_secs(1)).await.unwrap().unwrap();

        let orchestrator = Orchestrator::new(broker.clone(), model, executor, None, test_config(dir.path().to_path_buf()));
        orchestrator.run(lease).await.unwrap();

        let mut stream = broker.subscribe_progress(job_id, 1).await.unwrap();
        let mut last_seq = 0u64;
        let mut saw_terminal = false;
        while let Some(event) = stream.next().await {
            assert!(event.seq > last_seq);
            last_seq = event.seq;
            if event.phase.is_terminal() {
                saw_terminal = true;
            }
        }
        assert!(saw_terminal);
    }
}
