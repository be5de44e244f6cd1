//! Domain error type shared by the reservation, lifecycle and reconciliation engines.
//!
//! Every failure is classified into an [`ErrorKind`] so the HTTP layer can pick a
//! status code without knowing which engine produced it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failure category, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any transaction opens.
    Validation,
    /// Business-rule conflict (slot full, duplicate booking, wrong lifecycle state).
    Conflict,
    /// No caller identity was supplied.
    Unauthenticated,
    /// Caller identity is known but lacks ownership or role.
    Authorization,
    /// Unknown schedule or booking.
    NotFound,
    /// Gateway payload failed an integrity check.
    Integrity,
    /// An outbound dependency (the payment gateway) failed.
    Dependency,
    /// Storage or runtime failure.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),

    #[error("Schedule not found.")]
    ScheduleNotFound,
    #[error("Booking not found.")]
    BookingNotFound,

    #[error("Class is full.")]
    SlotUnavailable,
    #[error("You already booked this class.")]
    DuplicateBooking,
    #[error("Booking already cancelled.")]
    AlreadyCancelled,
    #[error("Booking already paid.")]
    AlreadyConfirmed,
    #[error("Booking already finished.")]
    AlreadyFinished,

    #[error("Unauthenticated.")]
    Unauthenticated,
    #[error("Unauthorized")]
    Forbidden,

    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Unrecognized transaction status: {0}")]
    UnrecognizedStatus(String),
    #[error("Transaction already recorded for another booking.")]
    TransactionConflict,

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Payment record not found. Please contact support.")]
    PaymentMissing,
    #[error("could not generate a unique booking code")]
    CodeGeneration,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(String),
}

impl BookingError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::ScheduleNotFound | Self::BookingNotFound => ErrorKind::NotFound,
            Self::SlotUnavailable
            | Self::DuplicateBooking
            | Self::AlreadyCancelled
            | Self::AlreadyConfirmed
            | Self::AlreadyFinished => ErrorKind::Conflict,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden => ErrorKind::Authorization,
            Self::InvalidSignature | Self::UnrecognizedStatus(_) | Self::TransactionConflict => {
                ErrorKind::Integrity
            }
            Self::Gateway(_) => ErrorKind::Dependency,
            Self::PaymentMissing | Self::CodeGeneration | Self::Database(_) | Self::Pool(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // A bad signature is an authorization failure from the gateway's point of view.
            Self::InvalidSignature => StatusCode::FORBIDDEN,
            Self::UnrecognizedStatus(_) => StatusCode::BAD_REQUEST,
            _ => match self.kind() {
                ErrorKind::Validation | ErrorKind::Conflict | ErrorKind::Integrity => {
                    StatusCode::BAD_REQUEST
                }
                ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
                ErrorKind::Authorization => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Dependency => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<deadpool_diesel::PoolError> for BookingError {
    fn from(err: deadpool_diesel::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<deadpool_diesel::InteractError> for BookingError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.kind() == ErrorKind::Internal && !matches!(self, Self::PaymentMissing)
        {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_owned()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_client_errors() {
        for err in [
            BookingError::SlotUnavailable,
            BookingError::DuplicateBooking,
            BookingError::AlreadyCancelled,
            BookingError::AlreadyConfirmed,
        ] {
            assert_eq!(err.kind(), ErrorKind::Conflict);
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn webhook_failures_map_to_gateway_visible_codes() {
        assert_eq!(BookingError::InvalidSignature.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(BookingError::BookingNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            BookingError::UnrecognizedStatus("refund".into()).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(
            BookingError::TransactionConflict.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn storage_failures_are_internal() {
        let err = BookingError::from(diesel::result::Error::NotFound);
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn pool_checkout_failures_are_internal() {
        let err = BookingError::from(deadpool_diesel::PoolError::Closed);
        assert!(matches!(err, BookingError::Pool(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
