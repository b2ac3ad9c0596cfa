use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{CountryId, HotelId, ReservationId, ReservationStatus, RoomTypeId};

#[derive(Error, Debug)]
pub enum Error {
    #[error("sqlx error: {0}")]
    DbError(sqlx::Error),

    #[error("Failed to read configuration file")]
    ConfigReadError,

    #[error("Failed to parse configuration file")]
    ConfigParseError,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No hotel found with id {0}")]
    HotelNotFound(HotelId),

    #[error("No room type found with id {0}")]
    RoomTypeNotFound(RoomTypeId),

    #[error("No country found with id {0}")]
    CountryNotFound(CountryId),

    #[error("No reservation found with id {0}")]
    ReservationNotFound(ReservationId),

    #[error("No record found by the given condition")]
    NotFound,

    #[error("Check-out date must be after the check-in date")]
    InvalidTime,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("You don't have a guest account, create one then try again")]
    MissingGuestProfile,

    #[error("You do not have permission to perform this action")]
    PermissionDenied,

    #[error("Insufficient available rooms for room type {room_type_id}: requested {requested}, available {available}")]
    InsufficientAvailability {
        room_type_id: RoomTypeId,
        requested: usize,
        available: usize,
    },

    #[error("data integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("transaction aborted by a concurrent booking")]
    TransactionConflict,

    #[error("reservation cannot move from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
}

impl Error {
    /// Whether running the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransactionConflict)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::DbError(_), Self::DbError(_)) => true,
            (Self::ConfigReadError, Self::ConfigReadError) => true,
            (Self::ConfigParseError, Self::ConfigParseError) => true,
            (Self::InvalidConfig(v1), Self::InvalidConfig(v2)) => v1 == v2,
            (Self::HotelNotFound(v1), Self::HotelNotFound(v2)) => v1 == v2,
            (Self::RoomTypeNotFound(v1), Self::RoomTypeNotFound(v2)) => v1 == v2,
            (Self::CountryNotFound(v1), Self::CountryNotFound(v2)) => v1 == v2,
            (Self::ReservationNotFound(v1), Self::ReservationNotFound(v2)) => v1 == v2,
            (Self::NotFound, Self::NotFound) => true,
            (Self::InvalidTime, Self::InvalidTime) => true,
            (Self::InvalidRequest(v1), Self::InvalidRequest(v2)) => v1 == v2,
            (Self::MissingGuestProfile, Self::MissingGuestProfile) => true,
            (Self::PermissionDenied, Self::PermissionDenied) => true,
            (
                Self::InsufficientAvailability {
                    room_type_id: r1,
                    requested: q1,
                    available: a1,
                },
                Self::InsufficientAvailability {
                    room_type_id: r2,
                    requested: q2,
                    available: a2,
                },
            ) => r1 == r2 && q1 == q2 && a1 == a2,
            (Self::IntegrityViolation(v1), Self::IntegrityViolation(v2)) => v1 == v2,
            (Self::TransactionConflict, Self::TransactionConflict) => true,
            (
                Self::InvalidTransition { from: f1, to: t1 },
                Self::InvalidTransition { from: f2, to: t2 },
            ) => f1 == f2 && t1 == t2,
            _ => false,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(e) => {
                let code = e.code().map(|c| c.into_owned());
                match code.as_deref() {
                    // serialization_failure, deadlock_detected
                    Some("40001") | Some("40P01") => Error::TransactionConflict,
                    // integrity_constraint_violation class
                    Some(c) if c.starts_with("23") => Error::IntegrityViolation(e.message().to_string()),
                    _ => Error::DbError(sqlx::Error::Database(e)),
                }
            }
            sqlx::Error::RowNotFound => Error::NotFound,
            _ => Error::DbError(e),
        }
    }
}

impl From<garde::Report> for Error {
    fn from(report: garde::Report) -> Self {
        Error::InvalidRequest(report.to_string().trim().to_string())
    }
}

// map booking errors to http responses
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::HotelNotFound(_)
            | Error::RoomTypeNotFound(_)
            | Error::CountryNotFound(_)
            | Error::ReservationNotFound(_)
            | Error::NotFound => StatusCode::NOT_FOUND,
            Error::InvalidTime | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::MissingGuestProfile | Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::InsufficientAvailability { .. } | Error::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            Error::TransactionConflict => StatusCode::SERVICE_UNAVAILABLE,
            Error::DbError(_)
            | Error::IntegrityViolation(_)
            | Error::ConfigReadError
            | Error::ConfigParseError
            | Error::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let detail = match &self {
            Error::TransactionConflict => "The booking could not be completed, please try again".to_string(),
            _ if status.is_server_error() => {
                tracing::error!(error = %self, "internal error while serving request");
                "Something went wrong, please try again".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
