use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use eventcrm_core::{CustomerId, Purchase};
use eventcrm_infra::Engine;

use crate::app::routes::blocking;
use crate::app::{dto, errors};
use crate::context::OrganizerContext;

pub fn router() -> Router {
    Router::new()
        .route("/reconcile", post(reconcile_organizer))
        .route("/:id", get(get_customer).put(upsert_customer))
        .route("/:id/purchases", post(record_purchase))
        .route("/:id/reconcile", post(reconcile_customer))
}

pub async fn upsert_customer(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpsertCustomerRequest>,
) -> Response {
    let customer_id = match dto::parse_id::<CustomerId>(&id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let stored = blocking(move || {
        let organizer_id = organizer.organizer_id();
        engine
            .customers
            .upsert_customer(organizer_id, body.into_snapshot(organizer_id, customer_id))
            .map_err(errors::service_error_to_response)
    })
    .await;

    match stored {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_customer(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Path(id): Path<String>,
) -> Response {
    let customer_id = match dto::parse_id::<CustomerId>(&id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let customer = blocking(move || {
        engine
            .customers
            .customer(organizer.organizer_id(), customer_id)
            .map_err(errors::service_error_to_response)
    })
    .await;

    match customer {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(resp) => resp,
    }
}

/// Record a purchase; the response lists the tags automation added.
pub async fn record_purchase(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Path(id): Path<String>,
    Json(body): Json<Purchase>,
) -> Response {
    let customer_id = match dto::parse_id::<CustomerId>(&id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let report = blocking(move || {
        engine
            .customers
            .record_purchase(organizer.organizer_id(), customer_id, body, Utc::now())
            .map_err(errors::service_error_to_response)
    })
    .await;

    match report {
        Ok(report) => (StatusCode::CREATED, Json(report)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn reconcile_customer(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
    Path(id): Path<String>,
) -> Response {
    let customer_id = match dto::parse_id::<CustomerId>(&id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let report = blocking(move || {
        engine
            .customers
            .reconcile_customer(organizer.organizer_id(), customer_id, Utc::now())
            .map_err(errors::service_error_to_response)
    })
    .await;

    match report {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn reconcile_organizer(
    Extension(engine): Extension<Arc<Engine>>,
    Extension(organizer): Extension<OrganizerContext>,
) -> Response {
    let report = blocking(move || {
        engine
            .tags
            .reconcile_organizer(organizer.organizer_id(), Utc::now())
            .map_err(errors::service_error_to_response)
    })
    .await;

    match report {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(resp) => resp,
    }
}
