use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, AppError>;

/// Request-level errors. Only a missing user (or a catastrophic internal
/// failure) aborts a request; per-signal store failures are handled inside
/// the composer and degrade that signal to empty.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
