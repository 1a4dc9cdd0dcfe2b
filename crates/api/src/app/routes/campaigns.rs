use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use eventcrm_core::CampaignId;
use eventcrm_infra::{CampaignRequest, Engine};

use crate::app::routes::blocking;
use crate::app::{dto, errors};
use crate::context::OrganizerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_campaign).get(list_campaigns))
        .route("/preview", post(preview_segment))
        .route("/:id", get(get_campaign))
}

pub async fn create_campaign(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Json(body): Json<CampaignRequest>,
) -> Response {
    let created = blocking(move || {
        engine
            .campaigns
            .create_campaign(organizer.organizer_id(), &body, Utc::now())
            .map_err(errors::orchestrator_error_to_response)
    })
    .await;

    match created {
        Ok(record) => (StatusCode::CREATED, Json(dto::campaign_to_json(&record))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_campaigns(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
) -> Response {
    let records = blocking(move || {
        engine
            .campaigns
            .list_campaigns(organizer.organizer_id())
            .map_err(errors::orchestrator_error_to_response)
    })
    .await;

    match records {
        Ok(records) => {
            let items = records.iter().map(dto::campaign_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(resp) => resp,
    }
}

pub async fn get_campaign(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Path(id): Path<String>,
) -> Response {
    let campaign_id = match dto::parse_id::<CampaignId>(&id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let view = blocking(move || {
        engine
            .campaigns
            .campaign_status(organizer.organizer_id(), campaign_id)
            .map_err(errors::orchestrator_error_to_response)
    })
    .await;

    match view {
        Ok(view) => (StatusCode::OK, Json(dto::campaign_status_to_json(&view))).into_response(),
        Err(resp) => resp,
    }
}

/// Recipient count for a segment, without creating anything.
pub async fn preview_segment(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Json(body): Json<dto::PreviewSegmentRequest>,
) -> Response {
    let channel = body.channel;
    let count = blocking(move || {
        engine
            .campaigns
            .preview(organizer.organizer_id(), body.channel, &body.segment)
            .map_err(errors::orchestrator_error_to_response)
    })
    .await;

    match count {
        Ok(recipients) => (
            StatusCode::OK,
            Json(serde_json::json!({ "channel": channel, "recipients": recipients })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}
