//! # API Error Type
//!
//! Every handler returns `Result<_, ApiError>`. The body is always
//!
//! ```json
//! { "code": "NOT_FOUND", "message": "Product not found: 7" }
//! ```
//!
//! with the HTTP status taken from the code:
//!
//! ```text
//! ┌──────────────────────┬────────┬──────────────────────────────────────┐
//! │ code                 │ status │ raised by                            │
//! ├──────────────────────┼────────┼──────────────────────────────────────┤
//! │ UNAUTHORIZED         │ 401    │ missing/expired session, bad secret  │
//! │ NOT_FOUND            │ 404    │ DbError/LedgerError::NotFound, key   │
//! │ VALIDATION_ERROR     │ 400    │ ValidationError, malformed body      │
//! │ CONFLICT             │ 409    │ duplicate identity token             │
//! │ INSUFFICIENT_FUNDS   │ 422    │ debit past the overdraft floor       │
//! │ DATABASE_ERROR       │ 503    │ busy store, connection failures      │
//! │ INTERNAL             │ 500    │ everything else (details logged)     │
//! └──────────────────────┴────────┴──────────────────────────────────────┘
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kasse_core::ValidationError;
use kasse_db::{AccessError, DbError, LedgerError};
use kasse_sync::SyncError;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    NotFound,
    ValidationError,
    Conflict,
    InsufficientFunds,
    DatabaseError,
    Internal,
}

impl ErrorCode {
    pub const fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::DatabaseError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: impl std::fmt::Display) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthorized, message)
    }

    /// Logs `detail` and returns a generic message.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "Internal error");
        ApiError::new(ErrorCode::Internal, "Internal error")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, id),
            DbError::UniqueViolation { field, value } => {
                ApiError::new(ErrorCode::Conflict, format!("{} '{}' already exists", field, value))
            }
            DbError::Invalid(e) => e.into(),
            DbError::ForeignKeyViolation { message } => {
                error!(%message, "Foreign key violation");
                ApiError::validation("Invalid reference")
            }
            DbError::Busy | DbError::PoolExhausted | DbError::ConnectionFailed(_) => {
                error!(error = %err, "Store unavailable");
                ApiError::new(ErrorCode::DatabaseError, "Store is busy, try again")
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound { entity, id } => ApiError::not_found(entity, id),
            LedgerError::InsufficientFunds { balance, .. } => ApiError::new(
                ErrorCode::InsufficientFunds,
                format!("Limit reached; balance is {}", balance),
            ),
            LedgerError::Invalid(e) => e.into(),
            LedgerError::Storage(e) => e.into(),
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::EmptySecret => ApiError::validation(err.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_map_to_status() {
        let cases = [
            (DbError::not_found("Account", 3), StatusCode::NOT_FOUND),
            (DbError::duplicate("token", "CARD1"), StatusCode::CONFLICT),
            (DbError::Busy, StatusCode::SERVICE_UNAVAILABLE),
            (DbError::QueryFailed("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).code.status(), status);
        }
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = ApiError::from(DbError::QueryFailed("no such column: secret".into()));
        assert_eq!(err.message, "Internal error");
    }
}
