//! Model abstraction layer for markup.
//!
//! This crate defines the provider-neutral types shared by the model adapter,
//! the agentic orchestrator, the streaming protocol emitter and the client-side
//! log aggregator.

pub mod data_url;
pub mod image;
pub mod progress;
pub mod wire;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use data_url::{DataUrl, DataUrlError};
pub use image::{GenerateImageRequest, GeneratedImage, ImageEditor, InpaintRequest};
pub use progress::{ErrorInfo, InputImage, IterationInfo, ProgressReporter, ProgressUpdate, Step};
pub use wire::{CompletePayload, ErrorPayload, WireError, WireEvent, find_event_boundary};

/// Represents an error that can occur when interacting with an AI model.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// An error occurred during the API request (e.g., network issues, invalid request).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The model returned an error (e.g., invalid input, server failure).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// A required credential is not configured.
    #[error("Server configuration error: {key} not set")]
    MissingCredentials {
        /// The configuration key that is missing (e.g., "GEMINI_API_KEY").
        key: String,
    },

    /// The provider rejected the configured credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Provider quota exceeded or rate limit hit (hard stop error).
    #[error(
        "Provider '{provider}' quota exceeded{}",
        message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default()
    )]
    QuotaExceeded {
        /// The provider name (e.g., "gemini").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// An image payload was not a usable data URL.
    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

impl From<DataUrlError> for ModelError {
    fn from(err: DataUrlError) -> Self {
        Self::InvalidDataUrl(err.to_string())
    }
}

/// One piece of request content sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// An inline binary image, base64-encoded.
    InlineImage {
        /// MIME type of the image (e.g., "image/png").
        mime_type: String,
        /// Base64 payload without the data URL prefix.
        data: String,
    },
}

impl ContentPart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates an inline image part from a parsed data URL.
    pub fn image(image: &DataUrl) -> Self {
        Self::InlineImage {
            mime_type: image.mime_type().to_string(),
            data: image.data().to_string(),
        }
    }
}

/// A tool the model may call, in JSON-schema form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name the model uses to invoke it.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// A structured function invocation returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the invoked function.
    pub name: String,
    /// Argument map.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl FunctionCall {
    /// Returns a string argument by key, if present and a string.
    pub fn string_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, Value::Object(self.args.clone()))
    }
}

/// Options for a single model invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Provider model ID (e.g., "gemini-3-flash-preview").
    pub model: String,
    /// Content parts, sent as one user turn.
    pub parts: Vec<ContentPart>,
    /// Tools the model may call.
    #[serde(default)]
    pub tools: Vec<FunctionDeclaration>,
    /// Provider-native generation config merged into the request.
    #[serde(default)]
    pub generation_config: Option<Value>,
    /// Upper bound on internal deliberation tokens.
    #[serde(default)]
    pub thinking_budget: Option<u32>,
    /// Whether deliberation text should be returned alongside the answer.
    #[serde(default)]
    pub include_thoughts: bool,
    /// Label used in operator logs for this call.
    #[serde(default)]
    pub label: Option<String>,
}

impl CallOptions {
    /// Creates options for the given model with no content.
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), ..Self::default() }
    }

    /// Appends a text part.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(ContentPart::text(text));
        self
    }

    /// Appends an inline image part.
    #[must_use]
    pub fn with_image(mut self, image: &DataUrl) -> Self {
        self.parts.push(ContentPart::image(image));
        self
    }

    /// Declares a tool.
    #[must_use]
    pub fn with_tool(mut self, tool: FunctionDeclaration) -> Self {
        self.tools.push(tool);
        self
    }

    /// Sets the deliberation budget and asks for thoughts to be returned.
    #[must_use]
    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = Some(budget);
        self.include_thoughts = true;
        self
    }

    /// Sets provider-native generation config.
    #[must_use]
    pub fn with_generation_config(mut self, config: Value) -> Self {
        self.generation_config = Some(config);
        self
    }

    /// Sets the operator log label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns all text parts joined, as shown to observers as "the prompt".
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::InlineImage { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Number of inline images in the request.
    pub fn image_count(&self) -> usize {
        self.parts.iter().filter(|part| matches!(part, ContentPart::InlineImage { .. })).count()
    }
}

/// The provider's native reply, carried verbatim and never inspected by callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawReply(Value);

impl RawReply {
    /// Wraps a provider-native value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }
}

/// One part of a provider reply, already classified.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPart {
    /// Internal deliberation text.
    Thought(String),
    /// User-facing text.
    Text(String),
    /// A structured function invocation.
    FunctionCall(FunctionCall),
    /// Inline binary output (e.g., a generated image).
    InlineData {
        /// MIME type of the payload.
        mime_type: String,
        /// Base64 payload.
        data: String,
    },
}

/// A complete reply (or one streamed chunk of a reply) from a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderReply {
    /// Classified parts in provider order.
    pub parts: Vec<ReplyPart>,
    /// Top-level convenience text, when the provider supplies one.
    pub text: Option<String>,
    /// The native reply.
    pub raw: RawReply,
}

/// The normalized single-shot outcome of one model invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallResult {
    /// The provider's native reply.
    pub raw: RawReply,
    /// Concatenated answer text.
    pub text: String,
    /// Concatenated deliberation text.
    pub thinking: String,
    /// The last function invocation seen, if any.
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

/// A cumulative snapshot yielded by a streaming call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSnapshot {
    /// Answer text accumulated so far.
    pub text: String,
    /// Deliberation text accumulated so far.
    pub thinking: String,
    /// The last function invocation seen so far.
    pub function_call: Option<FunctionCall>,
    /// Set on the final snapshot only.
    pub done: bool,
}

impl From<StreamSnapshot> for CallResult {
    fn from(snapshot: StreamSnapshot) -> Self {
        Self {
            raw: RawReply::default(),
            text: snapshot.text,
            thinking: snapshot.thinking,
            function_call: snapshot.function_call,
        }
    }
}

/// Lifecycle events emitted by the model adapter for every call.
///
/// `thinking` and `text` are cumulative snapshots, never deltas.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The request is about to be sent.
    Request {
        /// Text of the request.
        prompt: String,
    },
    /// A streamed chunk arrived.
    Streaming {
        /// Deliberation text so far.
        thinking: String,
        /// Answer text so far.
        text: String,
        /// Function invocation so far.
        #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
        function_call: Option<FunctionCall>,
    },
    /// The reply is complete.
    Response {
        /// Full deliberation text.
        thinking: String,
        /// Full answer text.
        text: String,
        /// Final function invocation.
        #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
        function_call: Option<FunctionCall>,
    },
    /// The call failed.
    Error {
        /// What went wrong.
        error: ModelError,
    },
}

/// Receives adapter lifecycle events.
pub trait ProgressCallback: Send + Sync {
    /// Called for every lifecycle event, in order.
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressCallback for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event);
    }
}

/// A stream of reply chunks from a provider.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<ProviderReply, ModelError>> + Send>>;

/// A trait for talking to a generative model provider.
///
/// All providers must be `Send + Sync`; credentials are read-only per instance.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Sends one request and waits for the full reply.
    ///
    /// # Errors
    /// Returns a `ModelError` if the request fails.
    async fn generate(&self, options: &CallOptions) -> Result<ProviderReply, ModelError>;

    /// Sends one request and returns the reply as a stream of chunks.
    ///
    /// # Errors
    /// Returns a `ModelError` if the request cannot be started.
    async fn generate_stream(&self, options: &CallOptions) -> Result<ReplyStream, ModelError>;

    /// Returns the provider name used in logs and errors.
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_text_skips_images() {
        let image = DataUrl::from_bytes("image/png", b"png");
        let options =
            CallOptions::new("m").with_text("first").with_image(&image).with_text("second");
        assert_eq!(options.prompt_text(), "first\n\nsecond");
        assert_eq!(options.image_count(), 1);
    }

    #[test]
    fn test_thinking_budget_enables_thoughts() {
        let options = CallOptions::new("m").with_thinking_budget(4096);
        assert_eq!(options.thinking_budget, Some(4096));
        assert!(options.include_thoughts);
    }

    #[test]
    fn test_function_call_display() {
        let mut args = Map::new();
        args.insert("prompt".to_string(), json!("a red hat"));
        let call = FunctionCall { name: "image_painter".to_string(), args };
        assert_eq!(call.to_string(), r#"image_painter({"prompt":"a red hat"})"#);
        assert_eq!(call.string_arg("prompt"), Some("a red hat"));
        assert_eq!(call.string_arg("missing"), None);
    }

    #[test]
    fn test_missing_credentials_message_names_key() {
        let err = ModelError::MissingCredentials { key: "GEMINI_API_KEY".to_string() };
        assert_eq!(err.to_string(), "Server configuration error: GEMINI_API_KEY not set");
    }

    #[test]
    fn test_quota_exceeded_display() {
        let err = ModelError::QuotaExceeded { provider: "gemini".to_string(), message: None };
        assert_eq!(err.to_string(), "Provider 'gemini' quota exceeded");
        let err = ModelError::QuotaExceeded {
            provider: "gemini".to_string(),
            message: Some("RESOURCE_EXHAUSTED".to_string()),
        };
        assert_eq!(err.to_string(), "Provider 'gemini' quota exceeded: RESOURCE_EXHAUSTED");
    }

    #[test]
    fn test_closure_is_progress_callback() {
        use std::sync::Mutex;
        let seen = Mutex::new(Vec::new());
        let callback = |event: &ProgressEvent| seen.lock().unwrap().push(event.clone());
        callback.on_progress(&ProgressEvent::Request { prompt: "hi".to_string() });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
