use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use eventcrm_core::Channel;
use eventcrm_infra::Engine;

use crate::app::errors;
use crate::app::routes::blocking;
use crate::context::OrganizerContext;

pub fn router() -> Router {
    Router::new().route("/:channel", get(quota_status))
}

pub async fn quota_status(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Path(channel): Path<String>,
) -> Response {
    let channel = match channel.parse::<Channel>() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let status = blocking(move || {
        engine
            .campaigns
            .quota_status(organizer.organizer_id(), channel, Utc::now())
            .map_err(errors::orchestrator_error_to_response)
    })
    .await;

    match status {
        Ok(status) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "channel": channel,
                "used": status.used,
                "limit": status.limit,
                "remaining": status.remaining,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}
