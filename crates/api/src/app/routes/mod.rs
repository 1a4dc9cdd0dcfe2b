use axum::{
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use crate::app::errors;

pub mod campaigns;
pub mod customers;
pub mod quota;
pub mod reports;
pub mod system;
pub mod tags;
pub mod webhooks;

/// Router for all organizer-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/campaigns", campaigns::router())
        .nest("/quota", quota::router())
        .nest("/tags", tags::router())
        .nest("/customers", customers::router())
        .route("/reports", get(reports::report))
}

/// Run an engine call on the blocking pool.
///
/// Engine services are synchronous and may wait on locks or, with the
/// Postgres quota backend, block on the runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> Result<T, Response> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(error = %e, "engine task failed");
        errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "engine task failed",
        )
    })?
}
