//! Thin launcher binary: wires [`analyst_api::router`] to a Postgres-backed
//! [`analyst_core::api::JobApi`] and serves it. Intentionally minimal per
//! spec §1's "out of scope" note — every operation delegates straight
//! through to the core.

use analyst_broker_postgres::PgBrokerClient;
use analyst_core::api::JobApi;
use analyst_core::Config;
use anyhow::Context;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let pool = sqlx::PgPool::connect(&config.broker_address)
        .await
        .context("connecting to broker backend")?;
    let broker = Arc::new(PgBrokerClient::with_lease_duration(pool, config.lease_duration));
    let api = Arc::new(JobApi::new(broker, config.max_job_attempts));

    let app = analyst_api::router(api);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .context("binding listener")?;
    tracing::info!(addr = %listener.local_addr()?, "analyst-api listening");
    axum::serve(listener, app).await.context("serving analyst-api")?;
    Ok(())
}
