//! Model implementations for markup.
//!
//! # Contents
//!
//! - **Gemini**: Google's Gemini REST API (API key required)
//! - **Mock**: scripted provider for testing and development
//! - **ModelAdapter**: request/response and streaming calls with progress disclosure
//! - **ProviderImageEditor**: image generation and inpainting through an image-capable model

pub mod adapter;
pub mod gemini;
pub mod image;
pub mod mock;

pub use adapter::{ModelAdapter, SnapshotStream, extract};
pub use gemini::GeminiModel;
pub use image::{ProviderImageEditor, elide_inline_data, image_from_reply};
pub use mock::{MockProvider, MockResponse};

/// Model IDs used by default for each role.
pub mod models {
    /// Planning and self-check.
    pub const PLANNING: &str = "gemini-3-flash-preview";
    /// Image generation and inpainting.
    pub const IMAGE_GENERATION: &str = "gemini-3-pro-image-preview";
}

/// Named deliberation budgets, in tokens.
pub mod thinking {
    pub const HIGH: u32 = 8192;
    pub const MEDIUM: u32 = 4096;
    pub const LOW: u32 = 2048;
}
