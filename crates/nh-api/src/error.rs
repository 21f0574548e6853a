//! Maps every crate-boundary error into the `{error, message?, details?}`
//! envelope and status code table from §7, via one `IntoResponse` impl per
//! error type rather than ad hoc matches scattered across handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] nh_store::StoreError),

    #[error(transparent)]
    Queue(#[from] nh_queue::QueueError),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Adapter(#[from] nh_common::AdapterError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error", None),
            ApiError::Store(nh_store::StoreError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, "not_found", Some(json!({ "id": id })))
            }
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error", None),
            ApiError::Queue(_) => (StatusCode::INTERNAL_SERVER_ERROR, "broker_error", None),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            ApiError::Adapter(err) => {
                // Adapter errors reaching this layer only happen on the synchronous
                // direct-send endpoints (§6); the queued dispatch path never
                // surfaces them to the original submitter (§7).
                let status = match err.kind {
                    nh_common::AdapterErrorKind::Misconfigured => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, "adapter_error", None)
            }
        };

        let body = ErrorBody { error, message: self.to_string(), details };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_bad_request() {
        let response = ApiError::Validation("channels must not be empty".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError::NotFound("notification 9".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn misconfigured_adapter_maps_to_503() {
        let err = nh_common::AdapterError::misconfigured("SMTP_HOST not set");
        let response = ApiError::Adapter(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn transient_adapter_error_maps_to_502() {
        let err = nh_common::AdapterError::transient("timed out");
        let response = ApiError::Adapter(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
