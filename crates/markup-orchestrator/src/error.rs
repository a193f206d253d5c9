// Error types for the agentic edit loop

use markup_abstraction::ModelError;
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The planning call failed; nothing was generated.
    #[error("Planning failed: {0}")]
    Planning(#[source] ModelError),

    /// The image collaborator failed on one attempt.
    #[error("Generation failed on attempt {iteration}: {source}")]
    Generation {
        /// 1-based attempt number
        iteration: u32,
        /// Underlying failure
        #[source]
        source: ModelError,
    },

    /// The loop ended without ever producing an image.
    #[error("No image generated")]
    NoResult,

    /// The request cannot be run as given.
    #[error("Invalid edit request: {0}")]
    InvalidRequest(String),

    /// Model error outside a specific phase
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl OrchestrationError {
    /// The provider failure behind this error, if any.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            Self::Planning(err) | Self::Generation { source: err, .. } | Self::Model(err) => {
                Some(err)
            }
            Self::NoResult | Self::InvalidRequest(_) => None,
        }
    }
}
