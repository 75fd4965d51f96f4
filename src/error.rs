use thiserror::Error;

/// Errors surfaced by the attack path and risk scoring engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed request, rejected before any search begins.
    #[error("invalid `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Caller-initiated cancellation or timeout. Partial results are discarded.
    #[error("analysis cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("invalid risk framework: {0}")]
    InvalidFramework(String),

    #[error("risk framework conflict: {0}")]
    FrameworkConflict(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound { kind, id: id.into() }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        EngineError::Cancelled { reason: reason.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
