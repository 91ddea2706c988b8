//! Core error taxonomy shared across stores, dispatcher, and workers.

use thiserror::Error;

/// Errors observable by callers of the domain stores and API boundary.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized to access this resource")]
    Authorization,

    #[error("{0} not found")]
    NotFound(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }
}
