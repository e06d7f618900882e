//! Error types for repository operations
//!
//! Every operation returns a [`RepositoryError`] whose [`ErrorCode`] drives
//! retry classification and the caller's user-facing mapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::validation::ValidationError;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classified failure kinds.
///
/// A resource owned by someone else is reported as [`ErrorCode::NotFound`],
/// exactly like a resource that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Conflict,
    SerializationFailure,
    Deadlock,
    ConnectionFailure,
    Validation,
    Timeout,
    Cancelled,
    TransactionInactive,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::SerializationFailure => "serialization_failure",
            ErrorCode::Deadlock => "deadlock",
            ErrorCode::ConnectionFailure => "connection_failure",
            ErrorCode::Validation => "validation",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::TransactionInactive => "transaction_inactive",
            ErrorCode::Internal => "internal",
        }
    }

    /// Codes retried by the default retry policy
    pub fn default_retryable() -> [ErrorCode; 3] {
        [
            ErrorCode::SerializationFailure,
            ErrorCode::Deadlock,
            ErrorCode::ConnectionFailure,
        ]
    }

    /// Map a PostgreSQL SQLSTATE to a code
    pub fn from_sqlstate(state: &str) -> ErrorCode {
        match state {
            "40001" => ErrorCode::SerializationFailure,
            "40P01" => ErrorCode::Deadlock,
            "57014" => ErrorCode::Timeout,
            // undefined_table: the collection does not exist (yet, or anymore)
            "42P01" => ErrorCode::NotFound,
            "25006" => ErrorCode::Validation,
            s if s.starts_with("23") => ErrorCode::Conflict,
            s if s.starts_with("08") => ErrorCode::ConnectionFailure,
            s if s.starts_with("22") => ErrorCode::Validation,
            _ => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the repository layer.
///
/// Immutable once constructed; the layer that raised it owns it.
#[derive(Error, Debug)]
#[error("{code}: {message}")]
pub struct RepositoryError {
    code: ErrorCode,
    message: String,
    #[source]
    cause: Option<BoxError>,
}

impl RepositoryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        code: ErrorCode,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// The single not-found error used for both missing and foreign-owned resources
    pub fn not_found(collection: &str) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("no matching resource in '{}'", collection),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, message)
    }

    pub fn transaction_inactive(action: &str, status: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::TransactionInactive,
            format!("cannot {} a transaction that is {}", action, status),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Classify a driver error, keeping it as the cause
    pub fn from_sqlx(operation: &str, error: sqlx::Error) -> Self {
        let code = classify_sqlx(&error);
        Self::with_cause(code, format!("{} failed: {}", operation, error), error)
    }
}

fn classify_sqlx(error: &sqlx::Error) -> ErrorCode {
    match error {
        sqlx::Error::RowNotFound => ErrorCode::NotFound,
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => ErrorCode::ConnectionFailure,
        sqlx::Error::Database(db) => db
            .code()
            .map(|state| ErrorCode::from_sqlstate(&state))
            .unwrap_or(ErrorCode::Internal),
        sqlx::Error::Configuration(_) => ErrorCode::Validation,
        _ => ErrorCode::Internal,
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        Self::from_sqlx("statement", error)
    }
}

impl From<ValidationError> for RepositoryError {
    fn from(error: ValidationError) -> Self {
        Self::with_cause(ErrorCode::Validation, error.to_string(), error)
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_cause(
            ErrorCode::Validation,
            format!("payload could not be (de)serialized: {}", error),
            error,
        )
    }
}
