use thiserror::Error;

use crate::roles::Role;

/// Postgres SQLSTATE raised by a unique constraint.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum AppError {
    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("This action requires the {required} role (current role: {actual})")]
    Forbidden { required: Role, actual: Role },

    /// Any other backend failure. The message stays generic; the source is logged.
    #[error("Failed to {action}")]
    Backend {
        action: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Why a public view refused to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublicAccessError {
    #[error("{0} was not found")]
    NotFound(&'static str),

    #[error("{0} has been revoked")]
    Revoked(&'static str),

    #[error("{0} has expired")]
    Expired(&'static str),
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

/// Name of the unique constraint behind a unique violation, if the driver reports one.
pub fn unique_constraint(err: &sqlx::Error) -> Option<&str> {
    let db = err.as_database_error()?;
    if db.code().as_deref() != Some(UNIQUE_VIOLATION) {
        return None;
    }
    db.constraint()
}

pub trait BackendResultExt<T> {
    /// Map any backend failure to a generic `Failed to <action>` error.
    fn or_fail(self, action: &'static str) -> Result<T, AppError>;

    /// Like [`or_fail`](Self::or_fail), but a unique violation becomes
    /// [`AppError::AlreadyExists`] carrying `duplicate`.
    fn or_duplicate(
        self,
        action: &'static str,
        duplicate: impl FnOnce() -> String,
    ) -> Result<T, AppError>;
}

impl<T> BackendResultExt<T> for Result<T, sqlx::Error> {
    fn or_fail(self, action: &'static str) -> Result<T, AppError> {
        self.map_err(|source| backend_failure(action, source))
    }

    fn or_duplicate(
        self,
        action: &'static str,
        duplicate: impl FnOnce() -> String,
    ) -> Result<T, AppError> {
        self.map_err(|source| {
            if is_unique_violation(&source) {
                AppError::AlreadyExists(duplicate())
            } else {
                backend_failure(action, source)
            }
        })
    }
}

pub fn backend_failure(action: &'static str, source: sqlx::Error) -> AppError {
    tracing::warn!(action, error = %source, "backend call failed");
    AppError::Backend { action, source }
}
