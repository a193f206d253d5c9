//! Image editing backed by an image-capable model provider.

use std::sync::Arc;

use async_trait::async_trait;
use markup_abstraction::{
    CallOptions, DataUrl, GenerateImageRequest, GeneratedImage, ImageEditor, InpaintRequest,
    ModelError, ModelProvider, ProviderReply, RawReply, ReplyPart,
};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// Placeholder substituted for inline payloads in forwarded raw replies.
pub const ELIDED: &str = "...";

/// `ImageEditor` that asks a provider for image output.
#[derive(Clone)]
pub struct ProviderImageEditor {
    provider: Arc<dyn ModelProvider>,
    model: String,
}

impl ProviderImageEditor {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self { provider, model: model.into() }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn base_options(&self, model: Option<&str>) -> CallOptions {
        CallOptions::new(model.unwrap_or(&self.model))
            .with_generation_config(json!({ "responseModalities": ["IMAGE", "TEXT"] }))
    }

    async fn produce(&self, options: CallOptions) -> Result<GeneratedImage, ModelError> {
        debug!(
            model_id = %options.model,
            label = options.label.as_deref().unwrap_or("-"),
            images = options.image_count(),
            "Requesting image output"
        );
        let reply = self.provider.generate(&options).await?;
        let image = image_from_reply(&reply)?;
        info!(
            model_id = %options.model,
            mime_type = image.image_data.mime_type(),
            bytes = image.image_data.decoded_len(),
            "Image generated"
        );
        Ok(image)
    }
}

#[async_trait]
impl ImageEditor for ProviderImageEditor {
    async fn generate_image(
        &self,
        request: &GenerateImageRequest,
    ) -> Result<GeneratedImage, ModelError> {
        let options = self
            .base_options(request.model.as_deref())
            .with_text("SOURCE IMAGE:")
            .with_image(&request.source_image)
            .with_text(request.prompt.clone())
            .with_label("generate_image");
        self.produce(options).await
    }

    async fn inpaint(&self, request: &InpaintRequest) -> Result<GeneratedImage, ModelError> {
        let mut options = self
            .base_options(None)
            .with_image(&request.source_image)
            .with_image(&request.mask_image)
            .with_text(request.prompt.clone())
            .with_label("inpaint");
        if let Some(budget) = request.thinking_budget {
            options = options.with_thinking_budget(budget);
        }
        self.produce(options).await
    }
}

/// Pulls the first inline image out of a reply.
///
/// # Errors
/// Returns `ModelError::ModelResponseError("No image data returned")` if the
/// reply carries no inline data.
pub fn image_from_reply(reply: &ProviderReply) -> Result<GeneratedImage, ModelError> {
    let mut image = None;
    let mut text = String::new();
    for part in &reply.parts {
        match part {
            ReplyPart::InlineData { mime_type, data } if image.is_none() => {
                image = Some(DataUrl::from_base64(mime_type.clone(), data.clone()));
            }
            ReplyPart::Text(t) => text.push_str(t),
            _ => {}
        }
    }

    let Some(image_data) = image else {
        warn!(text_len = text.len(), "Reply contained no image");
        return Err(ModelError::ModelResponseError("No image data returned".to_string()));
    };

    let raw = serde_json::to_value(&reply.raw).unwrap_or(Value::Null);
    Ok(GeneratedImage {
        image_data,
        text: (!text.is_empty()).then_some(text),
        raw: RawReply::new(elide_inline_data(&raw)),
    })
}

/// Copies a native reply, replacing every inline payload with `ELIDED`.
pub fn elide_inline_data(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let is_inline = key == "inlineData" || key == "inline_data";
                    let v = if is_inline { elide_payload(v) } else { elide_inline_data(v) };
                    (key.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(elide_inline_data).collect()),
        other => other.clone(),
    }
}

fn elide_payload(inline: &Value) -> Value {
    let mut inline = inline.clone();
    if let Some(data) = inline.get_mut("data") {
        *data = Value::String(ELIDED.to_string());
    }
    inline
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_image_from_reply_takes_first_image() {
        let reply = ProviderReply {
            parts: vec![
                ReplyPart::Text("here you go".to_string()),
                ReplyPart::InlineData {
                    mime_type: "image/png".to_string(),
                    data: "AAAA".to_string(),
                },
                ReplyPart::InlineData {
                    mime_type: "image/jpeg".to_string(),
                    data: "BBBB".to_string(),
                },
            ],
            ..ProviderReply::default()
        };
        let image = image_from_reply(&reply).unwrap();
        assert_eq!(image.image_data.to_string(), "data:image/png;base64,AAAA");
        assert_eq!(image.text.as_deref(), Some("here you go"));
    }

    #[test]
    fn test_image_from_reply_without_image() {
        let reply = ProviderReply {
            parts: vec![ReplyPart::Text("sorry".to_string())],
            ..ProviderReply::default()
        };
        assert_eq!(
            image_from_reply(&reply).unwrap_err(),
            ModelError::ModelResponseError("No image data returned".to_string())
        );
    }

    #[test]
    fn test_elide_inline_data() {
        let raw = json!({"candidates": [{"content": {"parts": [
            {"text": "t"},
            {"inlineData": {"mimeType": "image/png", "data": "AAAABBBB"}}
        ]}}]});
        assert_eq!(
            elide_inline_data(&raw),
            json!({"candidates": [{"content": {"parts": [
                {"text": "t"},
                {"inlineData": {"mimeType": "image/png", "data": "..."}}
            ]}}]})
        );
    }
}
