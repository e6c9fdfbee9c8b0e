//! Domain errors returned by the paper, assembly and attempt engines.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A user, paper, examination or question pool is missing.
    #[error("{0}")]
    NotFound(String),

    /// The request clashes with the current state (resubmission,
    /// unpublished examination, referenced question).
    #[error("{0}")]
    Conflict(String),

    /// Caller input that cannot be accepted as-is.
    #[error("{0}")]
    Validation(String),

    /// A referential failure the caller may retry, e.g. a question that
    /// vanished while a random paper was being saved.
    #[error("{0}")]
    Retryable(String),

    /// An internal invariant was broken. Never expected in correct operation.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    /// Stable IPC error code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::Validation(_) => "bad_params",
            EngineError::Retryable(_) => "retryable",
            EngineError::Invariant(_) => "invariant_violation",
            EngineError::Storage(_) => "db_query_failed",
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        EngineError::Conflict(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// True when SQLite rejected a statement on a foreign key.
pub fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => {
            f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
        }
        _ => false,
    }
}
