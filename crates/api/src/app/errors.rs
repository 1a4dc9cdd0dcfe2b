use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use eventcrm_core::DomainError;
use eventcrm_infra::{
    DispatchError, OrchestratorError, QuotaStoreError, ServiceError, StoreError, WebhookError,
};

pub fn orchestrator_error_to_response(err: OrchestratorError) -> axum::response::Response {
    match err {
        OrchestratorError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        OrchestratorError::NoRecipients => json_error(
            StatusCode::BAD_REQUEST,
            "no_recipients",
            "the selected segment has no reachable recipients",
        ),
        OrchestratorError::QuotaExceeded {
            requested,
            remaining,
            limit,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(json!({
                "error": "quota_exceeded",
                "message": format!(
                    "requested {requested} recipients, {remaining} of {limit} remaining"
                ),
                "requested": requested,
                "remaining": remaining,
                "limit": limit,
            })),
        )
            .into_response(),
        OrchestratorError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        OrchestratorError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        OrchestratorError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        OrchestratorError::Store(e) => store_error_to_response(e),
        OrchestratorError::Quota(e) => quota_store_error_to_response(e),
        OrchestratorError::Dispatch(e) => dispatch_error_to_response(e),
    }
}

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(e) => store_error_to_response(e),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Poisoned => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            err.to_string(),
        ),
    }
}

pub fn quota_store_error_to_response(err: QuotaStoreError) -> axum::response::Response {
    match err {
        QuotaStoreError::Poisoned => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "quota_store_error",
            err.to_string(),
        ),
        QuotaStoreError::NoRuntime | QuotaStoreError::Database { .. } => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "quota_unavailable",
            err.to_string(),
        ),
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Domain(e) => domain_error_to_response(e),
        DispatchError::Store(e) => store_error_to_response(e),
        DispatchError::Contended(_) => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::WorkerPanicked => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            err.to_string(),
        ),
    }
}

pub fn webhook_error_to_response(err: WebhookError) -> axum::response::Response {
    match err {
        WebhookError::UnknownDispatch(_) => {
            json_error(StatusCode::NOT_FOUND, "unknown_dispatch", err.to_string())
        }
        WebhookError::Status(e) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string())
        }
        WebhookError::Store(e) => store_error_to_response(e),
        WebhookError::Dispatch(e) => dispatch_error_to_response(e),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
