//! Error types for markup core.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use markup_abstraction::ModelError;
use markup_orchestrator::OrchestrationError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Startup errors for the server binary.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config file could not be parsed
    #[error("Invalid config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Address parsing errors
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for server startup.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors returned by HTTP handlers before or instead of a stream.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request body is malformed; no model call was attempted.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// A required credential is not configured.
    #[error("Server configuration error: {key} not set")]
    Configuration { key: String },

    /// The provider call failed.
    #[error("{context}: {source}")]
    Provider {
        context: &'static str,
        #[source]
        source: ModelError,
    },

    /// The agentic loop failed.
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

impl ApiError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation { field, reason: reason.into() }
    }

    pub fn configuration(key: impl Into<String>) -> Self {
        Self::Configuration { key: key.into() }
    }

    /// Wraps a provider failure, promoting missing credentials to a
    /// configuration error.
    pub fn provider(context: &'static str, source: ModelError) -> Self {
        match source {
            ModelError::MissingCredentials { key } => Self::Configuration { key },
            source => Self::Provider { context, source },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Configuration { .. } | Self::Provider { .. } | Self::Orchestration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), detail = %detail, "Request failed");
        } else {
            warn!(status = status.as_u16(), detail = %detail, "Request rejected");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
