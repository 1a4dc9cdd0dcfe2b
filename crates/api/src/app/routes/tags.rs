use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
    Json, Router,
};
use chrono::Utc;

use eventcrm_core::{CustomerId, TagId};
use eventcrm_infra::Engine;

use crate::app::routes::blocking;
use crate::app::{dto, errors};
use crate::context::OrganizerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_tag).get(list_tags))
        .route("/:id/rule", put(update_tag_rule))
        .route("/:id/customers/:customer_id", post(assign_tag).delete(remove_tag))
}

pub async fn create_tag(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Json(body): Json<dto::CreateTagRequest>,
) -> Response {
    let change = blocking(move || {
        engine
            .tags
            .create_tag(organizer.organizer_id(), &body.name, &body.color, body.rule, Utc::now())
            .map_err(errors::service_error_to_response)
    })
    .await;

    match change {
        Ok(change) => (StatusCode::CREATED, Json(change)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_tags(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
) -> Response {
    let tags = blocking(move || {
        engine
            .tags
            .list_tags(organizer.organizer_id())
            .map_err(errors::service_error_to_response)
    })
    .await;

    match tags {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn update_tag_rule(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateTagRuleRequest>,
) -> Response {
    let tag_id = match dto::parse_id::<TagId>(&id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let change = blocking(move || {
        engine
            .tags
            .update_tag_rule(organizer.organizer_id(), tag_id, body.rule, Utc::now())
            .map_err(errors::service_error_to_response)
    })
    .await;

    match change {
        Ok(change) => (StatusCode::OK, Json(change)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn assign_tag(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Path((id, customer_id)): Path<(String, String)>,
) -> Response {
    let (tag_id, customer_id) = match parse_pair(&id, &customer_id) {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    let assigned = blocking(move || {
        engine
            .tags
            .assign_tag(organizer.organizer_id(), tag_id, customer_id, Utc::now())
            .map_err(errors::service_error_to_response)
    })
    .await;

    match assigned {
        Ok(assigned) => {
            (StatusCode::OK, Json(serde_json::json!({ "assigned": assigned }))).into_response()
        }
        Err(resp) => resp,
    }
}

pub async fn remove_tag(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Path((id, customer_id)): Path<(String, String)>,
) -> Response {
    let (tag_id, customer_id) = match parse_pair(&id, &customer_id) {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    let removed = blocking(move || {
        engine
            .tags
            .remove_tag(organizer.organizer_id(), tag_id, customer_id)
            .map_err(errors::service_error_to_response)
    })
    .await;

    match removed {
        Ok(removed) => {
            (StatusCode::OK, Json(serde_json::json!({ "removed": removed }))).into_response()
        }
        Err(resp) => resp,
    }
}

fn parse_pair(tag: &str, customer: &str) -> Result<(TagId, CustomerId), Response> {
    let tag_id = dto::parse_id::<TagId>(tag).map_err(errors::domain_error_to_response)?;
    let customer_id =
        dto::parse_id::<CustomerId>(customer).map_err(errors::domain_error_to_response)?;
    Ok((tag_id, customer_id))
}
