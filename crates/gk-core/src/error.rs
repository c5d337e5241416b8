//! Kernel-wide base error type.
//!
//! Sub-crates define their own error enums and wrap `CoreError` as one
//! variant via `#[from]`.

use thiserror::Error;

use crate::Timestamp;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid timestamp {0}")]
    InvalidTimestamp(Timestamp),
}

/// Shorthand result type for `gk-core`.
pub type CoreResult<T> = Result<T, CoreError>;
