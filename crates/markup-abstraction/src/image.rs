//! Image generation and inpainting collaborator contract.

use async_trait::async_trait;
use serde::Serialize;

use crate::{DataUrl, ModelError, RawReply};

/// Request for a whole-image edit.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateImageRequest {
    pub source_image: DataUrl,
    pub prompt: String,
    /// Overrides the editor's default image model.
    pub model: Option<String>,
}

/// Request for an edit restricted to a masked region.
#[derive(Debug, Clone, PartialEq)]
pub struct InpaintRequest {
    pub source_image: DataUrl,
    /// White marks the region to change.
    pub mask_image: DataUrl,
    pub prompt: String,
    pub thinking_budget: Option<u32>,
}

/// An image produced by an editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub image_data: DataUrl,
    /// Any accompanying text the model produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Provider reply with inline payloads elided.
    pub raw: RawReply,
}

/// Something that can produce edited images.
///
/// Implementations may fail; callers treat any failure as fatal for the
/// current attempt and do not retry.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Produces an edited version of the whole source image.
    async fn generate_image(
        &self,
        request: &GenerateImageRequest,
    ) -> Result<GeneratedImage, ModelError>;

    /// Produces an edited version of the masked region of the source image.
    async fn inpaint(&self, request: &InpaintRequest) -> Result<GeneratedImage, ModelError>;
}
