//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{TransitionError, ValidationError};
use fulfillment::FulfillmentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Error raised by a fulfillment service.
    Fulfillment(FulfillmentError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    let status = match &err {
        FulfillmentError::Validation(_)
        | FulfillmentError::InvalidTransition(TransitionError::UnknownStatus(_)) => {
            StatusCode::BAD_REQUEST
        }
        FulfillmentError::InvalidTransition(TransitionError::InvalidTransition { .. })
        | FulfillmentError::Concurrency { .. }
        | FulfillmentError::NotCancelled { .. }
        | FulfillmentError::OrderCancelled(_) => StatusCode::CONFLICT,
        FulfillmentError::OrderNotFound(_) | FulfillmentError::RecordNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        FulfillmentError::PartialFulfillment(_) => StatusCode::ACCEPTED,
        err if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(step = err.step(), error = %err, "fulfillment request failed");
    }
    (status, err.to_string())
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Fulfillment(err.into())
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        ApiError::Fulfillment(err.into())
    }
}
