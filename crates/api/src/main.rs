use std::sync::Arc;

use tracing::{info, warn};

use eventcrm_api::app;
use eventcrm_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eventcrm_observability::init();

    let config = EngineConfig::from_env()?;
    let engine = Arc::new(app::services::build_engine(config).await?);
    let workers = engine.spawn_delivery_workers()?;

    let listener = tokio::net::TcpListener::bind(engine.config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app::build_app(engine.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down delivery workers");
    tokio::task::spawn_blocking(move || workers.shutdown()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
}
