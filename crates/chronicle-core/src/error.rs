//! Error types shared across the Chronicle engine.

use thiserror::Error;

/// Top-level error taxonomy for the Chronicle engine.
///
/// Lock conflicts, constraint violations, and deadline expiry are expected
/// outcomes returned as data, so they do not appear here.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {kind} {key}")]
    NotFound { kind: String, key: String },

    #[error("Consistency violation on {identity}: {reason}")]
    Consistency { identity: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }
}
