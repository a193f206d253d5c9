//! Configuration module for markup core.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment overrides.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use markup_models::{models, thinking};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, ServerError};

/// Config file used when `MARKUP_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "markup.toml";

/// Bounds accepted for a request's `maxIterations`.
pub const MAX_ITERATIONS_RANGE: std::ops::RangeInclusive<u32> = 1..=5;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to bind the HTTP server to.
    pub address: SocketAddr,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    pub log_format: LogFormat,
}

fn default_address() -> SocketAddr {
    // This is a compile-time constant, so expect is safe
    "127.0.0.1:8000".parse().expect("valid default address")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3001".to_string(),
            ],
            log_format: LogFormat::Text,
        }
    }
}

/// Model selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model for planning and self-check.
    pub planning: String,
    /// Model for image generation and inpainting.
    pub image_generation: String,
    /// Provider REST base URL.
    pub base_url: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            planning: models::PLANNING.to_string(),
            image_generation: models::IMAGE_GENERATION.to_string(),
            base_url: markup_models::gemini::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Named deliberation budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThinkingConfig {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self { high: thinking::HIGH, medium: thinking::MEDIUM, low: thinking::LOW }
    }
}

/// Agentic loop defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_iterations: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { max_iterations: 3 }
    }
}

/// Root configuration for markup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub thinking: ThinkingConfig,
    pub workflow: WorkflowConfig,
    /// Provider API key. Only ever read from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Deployment environment name reported by `/health`.
    #[serde(skip)]
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            models: ModelsConfig::default(),
            thinking: ThinkingConfig::default(),
            workflow: WorkflowConfig::default(),
            api_key: None,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the config file and process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or an
    /// environment override is malformed.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` for environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = match lookup("MARKUP_CONFIG") {
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Missing sections take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading config file");
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|source| ServerError::ConfigParse { path: path.display().to_string(), source })
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            let ip: IpAddr = host.trim().parse()?;
            self.server.address.set_ip(ip);
        }
        if let Some(port) = lookup("PORT") {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|e| ServerError::Config(format!("Invalid PORT '{port}': {e}")))?;
            self.server.address.set_port(port);
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        self.api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("GOOGLE_API_KEY"))
            .filter(|key| !key.is_empty());
        if let Some(environment) = lookup("ENVIRONMENT") {
            self.environment = environment;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !MAX_ITERATIONS_RANGE.contains(&self.workflow.max_iterations) {
            return Err(ServerError::Config(format!(
                "workflow.max_iterations must be between {} and {}, got {}",
                MAX_ITERATIONS_RANGE.start(),
                MAX_ITERATIONS_RANGE.end(),
                self.workflow.max_iterations
            )));
        }
        Ok(())
    }
}
