//! Error types for als-ops
//!
//! Every variant maps onto one of four wire codes so the HTTP layer never has
//! to guess: `VALIDATION_ERROR`, `NOT_FOUND`, `CONFLICT`, `INTERNAL_ERROR`.

use thiserror::Error;

use crate::registry::RunStatus;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// als-ops error types
#[derive(Error, Debug)]
pub enum Error {
    /// Bad request shape, invalid cron expression, out-of-range hyper-parameter
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown run, model version or other entity
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request collides with current state (e.g. a run is already active)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Run status transition that the lifecycle does not allow
    #[error("Run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Human-readable run id
        run_id: String,
        /// Current status
        from: RunStatus,
        /// Requested status
        to: RunStatus,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code used in the error envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) | Self::InvalidTransition { .. } => "CONFLICT",
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured details attached to the envelope, if the variant has any.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidTransition { run_id, from, to } => Some(serde_json::json!({
                "run_id": run_id,
                "from": from,
                "to": to,
            })),
            _ => None,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn run_not_found(key: &str) -> Self {
        Self::NotFound(format!("Run with id {key} not found"))
    }

    pub(crate) fn version_not_found(id: i64) -> Self {
        Self::NotFound(format!("Model version with id {id} not found"))
    }
}
