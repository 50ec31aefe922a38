use std::sync::Arc;

use anyhow::Context;

use ledgergate_api::app::{build_app, services};
use ledgergate_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).context("failed to read .env");
        }
    }
    ledgergate_observability::init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr.clone();
    let services = Arc::new(services::build_services(config).context("failed to build engine")?);
    let workers = services
        .engine()
        .start_workers()
        .context("failed to start background workers")?;

    let app = build_app(services);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    tokio::task::spawn_blocking(move || workers.shutdown())
        .await
        .context("worker shutdown failed")?;
    Ok(())
}
