use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use eventcrm_infra::{DeliveryWebhook, Engine};

use crate::app::errors;
use crate::app::routes::blocking;

/// Provider status callback.
///
/// Duplicate and out-of-order events are acknowledged with 200 and an
/// `ignored` outcome so the provider stops retrying them.
pub async fn delivery(
    Extension(engine): Extension<Arc<Engine>>,
    Json(body): Json<DeliveryWebhook>,
) -> Response {
    let receipt = blocking(move || {
        engine
            .webhooks
            .ingest(&body)
            .map_err(errors::webhook_error_to_response)
    })
    .await;

    match receipt {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(resp) => resp,
    }
}
