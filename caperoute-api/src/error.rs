use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use caperoute_core::BookingError;
use serde_json::json;

/// HTTP projection of domain errors. Storage and integrity failures are
/// redacted; everything else carries its message to the client.
#[derive(Debug)]
pub struct AppError(pub BookingError);

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.0 {
            BookingError::Validation(msg)
            | BookingError::PolicyViolation(msg)
            | BookingError::PaymentIncomplete(msg) => (StatusCode::BAD_REQUEST, msg),
            BookingError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            BookingError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            BookingError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            BookingError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            BookingError::ExternalDependency(msg) => {
                tracing::error!("Upstream dependency error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Payment provider is unavailable".to_string(),
                )
            }
            BookingError::Integrity(msg) | BookingError::Storage(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
