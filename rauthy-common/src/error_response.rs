use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy for the authorization core.
///
/// Every variant maps to exactly one HTTP status code. `AuthFailed`, `AuthBanned` and
/// `RateLimited` additionally carry meaning for the regulator: only `AuthFailed` increments
/// the failure counter, `AuthBanned` and `RateLimited` never touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorResponseType {
    BadRequest,
    Unauthorized,
    Forbidden,
    AuthFailed,
    AuthBanned,
    RateLimited,
    Unavailable,
    Internal,
    NotFound,
}

impl ErrorResponseType {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::AuthFailed => StatusCode::UNAUTHORIZED,
            Self::AuthBanned => StatusCode::TOO_MANY_REQUESTS,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorResponseType,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: ErrorResponseType, message: String) -> Self {
        Self { error, message }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.error, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

impl ResponseError for ErrorResponse {
    fn status_code(&self) -> StatusCode {
        self.error.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        // `Unavailable` and `Internal` never leak backend detail to the caller.
        let message = match self.error {
            ErrorResponseType::Unavailable => "Service temporarily unavailable".to_string(),
            ErrorResponseType::Internal => "Internal error".to_string(),
            _ => self.message.clone(),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.error,
            message,
        })
    }
}

impl From<sqlx::Error> for ErrorResponse {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => {
                Self::new(ErrorResponseType::NotFound, "Not found".to_string())
            }
            err => {
                tracing::error!("database error: {}", err);
                Self::new(
                    ErrorResponseType::Unavailable,
                    "Database unavailable".to_string(),
                )
            }
        }
    }
}

impl From<serde_json::Error> for ErrorResponse {
    fn from(value: serde_json::Error) -> Self {
        tracing::error!("serde_json error: {}", value);
        Self::new(ErrorResponseType::Internal, "Serialization error".to_string())
    }
}

impl From<bincode::Error> for ErrorResponse {
    fn from(value: bincode::Error) -> Self {
        tracing::error!("bincode error: {}", value);
        Self::new(ErrorResponseType::Internal, "Serialization error".to_string())
    }
}

impl From<std::io::Error> for ErrorResponse {
    fn from(value: std::io::Error) -> Self {
        tracing::error!("io error: {}", value);
        Self::new(ErrorResponseType::Internal, "I/O error".to_string())
    }
}

impl From<redhac::CacheError> for ErrorResponse {
    fn from(value: redhac::CacheError) -> Self {
        tracing::error!("cache error: {}", value);
        Self::new(
            ErrorResponseType::Unavailable,
            "Cache unavailable".to_string(),
        )
    }
}
