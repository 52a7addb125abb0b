//! Error types for the break-glass core.

use thiserror::Error;

/// Errors from core type parsing and canonical encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid {kind} value: {value}")]
    InvalidEnum { kind: &'static str, value: String },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}
