use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use eventcrm_infra::Engine;

use crate::app::routes::blocking;
use crate::app::{dto, errors};
use crate::context::OrganizerContext;

pub async fn report(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Query(query): Query<dto::ReportQuery>,
) -> Response {
    let now = Utc::now();
    let filters = match query.into_filters(now) {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let report = blocking(move || {
        engine
            .reports
            .report(organizer.organizer_id(), &filters, now)
            .map_err(errors::store_error_to_response)
    })
    .await;

    match report {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(resp) => resp,
    }
}
