use std::sync::Arc;

use tracing::{info, warn};

use eventcrm_infra::quota::PostgresQuotaTracker;
use eventcrm_infra::{Engine, EngineConfig};

/// Build the engine for `config`.
///
/// Quota reservations go to Postgres when `DATABASE_URL` is set (the
/// reservation table is created if missing); otherwise they stay in memory
/// and are lost on restart.
pub async fn build_engine(config: EngineConfig) -> anyhow::Result<Engine> {
    match config.database_url.clone() {
        Some(url) => {
            let tracker = PostgresQuotaTracker::connect(
                &url,
                config.database_max_connections,
                config.quota_policy(),
            )
            .await?;
            tracker.migrate().await?;
            info!("quota reservations stored in postgres");
            Ok(Engine::with_quota(config, Arc::new(tracker)))
        }
        None => {
            warn!("DATABASE_URL not set; quota reservations are kept in memory");
            Ok(Engine::in_memory(config))
        }
    }
}
