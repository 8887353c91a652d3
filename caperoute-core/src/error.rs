use thiserror::Error;

/// Domain error taxonomy for the booking lifecycle. Handlers map these onto
/// HTTP status codes; storage and gateway internals are never surfaced
/// verbatim to callers.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PolicyViolation(String),

    /// The gateway has not (yet) settled the payment. Retry-later, not a
    /// fatal condition.
    #[error("payment not completed: {0}")]
    PaymentIncomplete(String),

    #[error("external dependency failed: {0}")]
    ExternalDependency(String),

    /// Reference generation exhausted, or an inconsistent partial state was
    /// detected. Should alert operators.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl BookingError {
    /// Wrap an opaque store/adapter error.
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        BookingError::Storage(err.to_string())
    }

    pub fn gateway<E: std::fmt::Display>(err: E) -> Self {
        BookingError::ExternalDependency(err.to_string())
    }
}
