//! HTTP API application wiring (Axum router + engine wiring).
//!
//! - `services.rs`: builds the engine (quota backend selection)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower::ServiceBuilder;

use eventcrm_infra::Engine;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(engine: Arc<Engine>) -> Router {
    // Organizer-scoped routes: require the organizer context.
    let scoped =
        routes::router().layer(axum::middleware::from_fn(middleware::organizer_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        // The provider does not know organizers; rows are found by dispatch id.
        .route("/webhooks/delivery", post(routes::webhooks::delivery))
        .merge(scoped)
        .layer(ServiceBuilder::new().layer(Extension(engine)))
}
