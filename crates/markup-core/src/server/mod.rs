//! Server module for markup core.
//!
//! This module contains the HTTP router, shared state and endpoint handlers.

pub mod handlers;
mod images;
pub mod logging;
pub mod request;
pub mod sse;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use markup_abstraction::ModelProvider;
use markup_models::{GeminiModel, ModelAdapter, ProviderImageEditor};
use markup_orchestrator::{AgenticEditor, EditorConfig};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ApiError, Result};
use logging::RequestLoggerLayer;

/// Largest accepted request body; images travel inline as data URLs.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Name of the credential reported when no provider is configured.
pub const API_KEY_VARIABLE: &str = "GEMINI_API_KEY";

/// State shared by every handler.
pub struct AppState {
    pub config: Config,
    provider: Option<Arc<dyn ModelProvider>>,
    pub started: Instant,
}

impl AppState {
    pub fn new(config: Config, provider: Option<Arc<dyn ModelProvider>>) -> Self {
        Self { config, provider, started: Instant::now() }
    }

    /// Builds the Gemini provider when an API key is configured.
    pub fn from_config(config: Config) -> Self {
        let provider = config.api_key.as_ref().map(|key| {
            let model = GeminiModel::with_api_key(key.clone())
                .with_base_url(config.models.base_url.clone());
            Arc::new(model) as Arc<dyn ModelProvider>
        });
        Self::new(config, provider)
    }

    /// The configured provider.
    ///
    /// # Errors
    /// Returns a configuration error naming the API key when none is set.
    pub fn provider(&self) -> std::result::Result<Arc<dyn ModelProvider>, ApiError> {
        self.provider.clone().ok_or_else(|| ApiError::configuration(API_KEY_VARIABLE))
    }

    pub fn image_editor(&self) -> std::result::Result<ProviderImageEditor, ApiError> {
        Ok(ProviderImageEditor::new(self.provider()?, self.config.models.image_generation.clone()))
    }

    pub fn agentic_editor(&self) -> std::result::Result<AgenticEditor, ApiError> {
        let provider = self.provider()?;
        let config = EditorConfig {
            planning_model: self.config.models.planning.clone(),
            max_iterations: self.config.workflow.max_iterations,
            planning_budget: self.config.thinking.high,
            evaluation_budget: self.config.thinking.medium,
        };
        Ok(AgenticEditor::new(ModelAdapter::new(provider), Arc::new(self.image_editor()?), config))
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);
    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::root))
        .route("/api/ai/generate", post(handlers::generate_text))
        .route("/api/images/generate", post(handlers::generate_image))
        .route("/api/images/inpaint", post(handlers::inpaint))
        .route("/api/agentic/edit", post(handlers::agentic_edit))
        .layer(
            ServiceBuilder::new()
                .layer(RequestLoggerLayer)
                .layer(cors)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

/// Start the markup HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to bind to the configured address.
pub async fn run(config: Config) -> Result<()> {
    let addr = config.server.address;
    info!(
        api_key = if config.api_key.is_some() { "configured" } else { "MISSING" },
        planning_model = %config.models.planning,
        image_model = %config.models.image_generation,
        "Image Markup AI Server starting"
    );

    let app = router(Arc::new(AppState::from_config(config)));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server started");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("Image Markup AI Server shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_provider_is_configuration_error() {
        let state = AppState::new(Config::default(), None);
        let err = state.provider().err().unwrap();
        assert_eq!(err.to_string(), "Server configuration error: GEMINI_API_KEY not set");
        assert!(state.agentic_editor().is_err());
    }

    #[test]
    fn test_from_config_with_key() {
        let config = Config { api_key: Some("k".to_string()), ..Config::default() };
        let state = AppState::from_config(config);
        assert!(state.provider().is_ok());
        let editor = state.agentic_editor().unwrap();
        assert_eq!(editor.config().planning_budget, 8192);
        assert_eq!(editor.config().evaluation_budget, 4096);
    }
}
