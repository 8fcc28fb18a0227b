//! Service error taxonomy shared by the stores, managers and the HTTP layer.
//!
//! Synchronous user-facing operations surface one of these variants; the
//! server module maps them to status codes. Detached paths (audio synthesis,
//! recommender sync) never propagate errors to a caller, they only log.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    /// An external collaborator (LLM, TTS, object storage) failed or timed out.
    #[error("dependency failure: {0}")]
    Dependency(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::Dependency(msg.into())
    }

    /// Stable machine-readable kind, used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::Forbidden(_) => "forbidden",
            Self::Dependency(_) => "dependency_failure",
            Self::Internal(_) => "internal",
        }
    }
}

/// Translate a rusqlite error, turning uniqueness violations into `Conflict`.
///
/// Concurrent duplicate inserts lose the race at the constraint, not at an
/// application-level check; the loser must see a Conflict, never a raw 500.
pub fn map_constraint_violation(err: rusqlite::Error, conflict_msg: &str) -> ServiceError {
    if is_constraint_violation(&err) {
        ServiceError::conflict(conflict_msg)
    } else {
        ServiceError::Internal(err.into())
    }
}

pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                ..
            },
            _,
        )
    )
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        ServiceError::Internal(err.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
