//! Error taxonomy shared by every component. Kinds are carried in payloads
//! (`error_kind` fields), never mapped to transport status codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminant used when serializing an error to a caller-visible payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorKind {
    BadRequest,
    MissingCredential,
    UpstreamTimeout,
    UpstreamUnavailable,
    ToolError,
    ToolTimeout,
    Forbidden,
    NotFound,
    ConstraintViolation,
    Internal,
}

#[derive(Debug, Error)]
pub enum GasableError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing credentials: {0:?}")]
    MissingCredential(Vec<String>),

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("tool error: {0}")]
    ToolError(String),

    #[error("tool timeout after {0}ms")]
    ToolTimeout(u64),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GasableError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GasableError::BadRequest(_) => ErrorKind::BadRequest,
            GasableError::MissingCredential(_) => ErrorKind::MissingCredential,
            GasableError::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
            GasableError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            GasableError::ToolError(_) => ErrorKind::ToolError,
            GasableError::ToolTimeout(_) => ErrorKind::ToolTimeout,
            GasableError::Forbidden(_) => ErrorKind::Forbidden,
            GasableError::NotFound(_) => ErrorKind::NotFound,
            GasableError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            GasableError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<sqlx::Error> for GasableError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => GasableError::NotFound(e.to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                GasableError::ConstraintViolation(e.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                GasableError::UpstreamUnavailable(e.to_string())
            }
            other => GasableError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GasableError>;
