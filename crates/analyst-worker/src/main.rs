//! Thin launcher for one worker process (spec §4.6): reserve, hand the lease
//! to an [`Orchestrator`], repeat, until a shutdown signal arrives between
//! reservations. `worker_count` processes are expected to run this same
//! binary independently, supervised externally (spec §1's "process
//! supervision is out of scope").

use analyst_broker_postgres::PgBrokerClient;
use analyst_core::{BrokerClient, Config};
use analyst_inflation::InflationCache;
use analyst_orchestrator::{Orchestrator, OrchestratorConfig, OpenAiModelClient, SubprocessCodeExecutor};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let worker_id = format!("{}-{}", hostname(), std::process::id());
    tracing::info!(worker_id = %worker_id, "starting analyst-worker");

    let pool = sqlx::PgPool::connect(&config.broker_address)
        .await
        .context("connecting to broker backend")?;
    let broker = Arc::new(PgBrokerClient::with_lease_duration(pool, config.lease_duration));

    let model = Arc::new(OpenAiModelClient::new(
        config.model_endpoint.clone(),
        config.model_name.clone(),
        config.per_model_request_timeout,
    ));

    let executor = Arc::new(SubprocessCodeExecutor::new(
        config.executor_command.clone(),
        config.executor_args.clone(),
    ));

    let inflation = Some(Arc::new(InflationCache::new(
        config.inflation_cache_path.clone(),
        config.inflation_source_url.clone(),
        config.inflation_refresh_max_age_days,
    )));

    let orchestrator_config = OrchestratorConfig {
        data_dir: PathBuf::from(&config.data_dir),
        lease_duration: config.lease_duration,
        lease_extension_interval: config.lease_extension_interval,
        per_exec_timeout: config.per_exec_timeout,
        per_job_exec_budget: config.per_job_exec_budget,
        per_job_wall_timeout: config.per_job_wall_timeout,
        per_model_request_timeout: config.per_model_request_timeout,
        max_rounds: config.max_rounds,
        max_file_bytes: config.max_file_bytes,
        sample_rows: 20,
    };

    let shutdown_wall_timeout = config.per_job_wall_timeout / 2;
    let orchestrator = Orchestrator::new(broker.clone(), model, executor, inflation, orchestrator_config);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    run_loop(broker, orchestrator, &worker_id, shutdown, shutdown_wall_timeout).await;

    tracing::info!(worker_id = %worker_id, "analyst-worker shut down");
    Ok(())
}

/// Reserve/run/complete loop: blocks on `reserve` for up to 5 seconds so the
/// shutdown signal is checked regularly even while the queue is empty, and
/// never interrupts a job already in flight — only the gap between
/// reservations is a safe point to stop accepting new work. A job reserved
/// after the shutdown signal has already fired (a race between the
/// `select!` above and `reserve` returning) runs out under
/// `shutdown_wall_timeout` rather than the normal `per_job_wall_timeout`, so
/// a worker doesn't hang indefinitely waiting for the last job once asked
/// to stop.
async fn run_loop<B, M, E>(
    broker: Arc<B>,
    orchestrator: Orchestrator<B, M, E>,
    worker_id: &str,
    shutdown: CancellationToken,
    shutdown_wall_timeout: Duration,
) where
    B: BrokerClient + 'static,
    M: analyst_orchestrator::ModelClient + 'static,
    E: analyst_orchestrator::CodeExecutor + 'static,
{
    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let reserved = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = broker.reserve(worker_id, Duration::from_secs(5)) => result,
        };

        match reserved {
            Ok(Some(lease)) => {
                let job_id = lease.job.id;
                tracing::info!(job_id = %job_id, worker_id, "reserved job");
                let run_result = if shutdown.is_cancelled() {
                    tracing::info!(job_id = %job_id, worker_id, "shutdown in progress, running job under a shortened deadline");
                    orchestrator.run_with_wall_timeout(lease, shutdown_wall_timeout).await
                } else {
                    orchestrator.run(lease).await
                };
                if let Err(err) = run_result {
                    tracing::error!(job_id = %job_id, error = %err, "orchestrator run failed to reach a terminal write");
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "reserve failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
            sigterm.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down after the current job"),
            _ = terminate => tracing::info!("received SIGTERM, shutting down after the current job"),
        }
        shutdown.cancel();
    });
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string())
}
