use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::OrganizerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(organizer): Extension<OrganizerContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "organizer_id": organizer.organizer_id().to_string(),
    }))
}
