//! HTTP response building helpers
//!
//! Every handler answers through these, so error bodies share one shape:
//! `{"error": message}` plus detail fields for validation and sequence
//! collisions.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::error::StorageError;

/// Message for both hidden-owner failures
pub const NOT_FOUND_MESSAGE: &str = "Not found";

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 200 OK
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// 201 Created
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// 204 No Content
pub fn no_content() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn message_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message }))
}

pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    message_response(StatusCode::NOT_FOUND, message)
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    message_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub fn internal_error(message: &str) -> Response<Full<Bytes>> {
    message_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// HTTP status for an error
pub fn status_for(error: &StorageError) -> StatusCode {
    match error {
        StorageError::OwnerNotFound | StorageError::OwnerNotPublic => StatusCode::NOT_FOUND,
        StorageError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StorageError::DuplicateSequence { .. } | StorageError::Conflict(_) => StatusCode::CONFLICT,
        StorageError::InvalidInput(_) | StorageError::Json(_) => StatusCode::BAD_REQUEST,
        StorageError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        StorageError::AggregationInconsistency(_)
        | StorageError::Io(_)
        | StorageError::Database(_)
        | StorageError::Pool(_)
        | StorageError::Config(_)
        | StorageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a StorageError to an appropriate HTTP response
pub fn error_response(error: StorageError) -> Response<Full<Bytes>> {
    let status = status_for(&error);

    match &error {
        StorageError::Validation(errors) => json_response(
            status,
            &json!({
                "error": "Validation failed",
                "fields": errors.fields(),
            }),
        ),
        StorageError::DuplicateSequence { sequence_numbers } => json_response(
            status,
            &json!({
                "error": "Duplicate sequence numbers",
                "sequenceNumbers": sequence_numbers,
            }),
        ),
        e if e.is_owner_hidden() => not_found(NOT_FOUND_MESSAGE),
        e if status.is_server_error() => {
            error!(error = %e, "Request failed");
            // Internal details stay in the log
            internal_error("Internal server error")
        }
        e => {
            warn!(status = %status, error = %e, "Request rejected");
            message_response(status, &e.to_string())
        }
    }
}

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, StorageError>;

/// 204 if deleted, 404 if not found
pub fn from_delete_bool_result(
    result: Result<bool, StorageError>,
    not_found_msg: &str,
) -> Response<Full<Bytes>> {
    match result {
        Ok(true) => no_content(),
        Ok(false) => not_found(not_found_msg),
        Err(e) => error_response(e),
    }
}
