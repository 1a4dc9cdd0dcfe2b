use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

use crate::app::errors;
use crate::context::{OrganizerContext, OrganizerHeaderError};

/// Resolve the organizer context and attach it to the request.
///
/// A missing header is 401; a header that does not hold an organizer id is 400.
pub async fn organizer_middleware(mut req: Request, next: Next) -> Response {
    match OrganizerContext::from_headers(req.headers()) {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(err @ OrganizerHeaderError::Missing) => {
            errors::json_error(StatusCode::UNAUTHORIZED, "organizer_required", err.to_string())
        }
        Err(err) => {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_organizer", err.to_string())
        }
    }
}
