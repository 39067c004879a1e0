use std::fmt::Display;

use goku_storage::migrator::MigrationError;
use sqlx::{error::DatabaseError, sqlite::SqliteError};
use thiserror::Error;
use tracing_error::SpanTrace;

#[derive(Error, Debug)]
pub enum ErrorType {
    #[error("Internal error")]
    Storage(sqlx::Error),
    #[error("Internal error")]
    Migration(#[from] MigrationError),
    #[error("Internal error")]
    BadData(String),
    #[error("invalid key")]
    InvalidKey,
    #[error("invalid value")]
    InvalidValue,
    #[error("key not found")]
    NotFound,
    #[error("conditional update failed")]
    Conditional,
    #[error("update failed due to data race")]
    UpdateRace,
    #[error("lease `{0}` not found")]
    LeaseNotFound(i64),
    #[error("stream reached head")]
    HeadReached,
    #[error("A resource with that identifier already exists")]
    UniqueConstraintViolation {
        #[source]
        error: sqlx::Error,
    },
}

#[derive(Error, Debug)]
pub struct Error {
    pub variant: ErrorType,
    pub span_trace: SpanTrace,
}

impl Error {
    /// Concurrent writers race on the version guards; retrying a racy update
    /// is always safe. Every other kind is a definite answer.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self.variant, ErrorType::UpdateRace)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}", self.variant, self.span_trace)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        #[allow(clippy::redundant_closure_for_method_calls)]
        if let Some(error_code) = err
            .as_database_error()
            .and_then(|db_err| db_err.try_downcast_ref::<SqliteError>())
        {
            if let Some(code) = error_code.code().map(|str| str.to_string()) {
                // UNIQUE / primary key constraint violation
                if code == "1555" || code == "2067" {
                    return Self {
                        variant: ErrorType::UniqueConstraintViolation { error: err },
                        span_trace: SpanTrace::capture(),
                    };
                }
            }
        }
        Self {
            variant: ErrorType::Storage(err),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<MigrationError> for Error {
    fn from(err: MigrationError) -> Self {
        Self {
            variant: err.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<ErrorType> for Error {
    fn from(err: ErrorType) -> Self {
        Self {
            variant: err,
            span_trace: SpanTrace::capture(),
        }
    }
}
