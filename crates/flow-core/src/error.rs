use thiserror::Error;

use crate::generation::GenerationError;

pub type Result<T, E = FlowError> = std::result::Result<T, E>;

/// Request-scoped failure of a flow dispatch.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Flow '{0}' not found")]
    FlowNotFound(String),

    #[error("No provider configured for model '{model}'")]
    ProviderNotConfigured { model: String },

    #[error("Validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Model returned invalid output: {reason}")]
    InvalidModelOutput { raw: String, reason: String },
}

impl FlowError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Unknown flow or unroutable model: both are lookups that found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FlowError::FlowNotFound(_) | FlowError::ProviderNotConfigured { .. }
        )
    }

    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::FlowNotFound(_) => "NOT_FOUND",
            FlowError::ProviderNotConfigured { .. } => "NOT_FOUND",
            FlowError::Validation { .. } => "INVALID_ARGUMENT",
            FlowError::Generation(_) => "GENERATION_FAILED",
            FlowError::InvalidModelOutput { .. } => "INVALID_MODEL_OUTPUT",
        }
    }
}
