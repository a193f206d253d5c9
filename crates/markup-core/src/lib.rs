//! Markup Core - HTTP server for AI-assisted image editing.
//!
//! This crate provides:
//! - The streaming protocol emitter used by every SSE endpoint
//! - The axum server, request validation and logging middleware
//! - Configuration management
//! - Error handling
//!
//! # Example
//!
//! ```rust,no_run
//! use markup_core::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> markup_core::error::Result<()> {
//!     let config = Config::load()?;
//!     server::run(config).await
//! }
//! ```

pub mod config;
pub mod emitter;
pub mod error;
pub mod server;

pub use config::Config;
pub use emitter::{Completion, ProgressChannel};
pub use error::{ApiError, Result, ServerError};
pub use server::{AppState, router};
