//! Google Gemini provider.
//!
//! Talks to the Gemini REST API (`generateContent` and
//! `streamGenerateContent?alt=sse`) and classifies reply parts into thoughts,
//! text, function calls and inline data.

mod stream;

use async_trait::async_trait;
use markup_abstraction::{
    CallOptions, ContentPart, FunctionCall, ModelError, ModelProvider, ProviderReply, RawReply,
    ReplyPart, ReplyStream,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error};

pub use stream::GeminiSseStream;

/// Default REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "gemini";

/// Google Gemini provider.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the Gemini API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl GeminiModel {
    /// Creates a provider from an env lookup, trying `GEMINI_API_KEY` then
    /// `GOOGLE_API_KEY`.
    ///
    /// # Errors
    /// Returns `ModelError::MissingCredentials` naming `GEMINI_API_KEY` if neither is set.
    pub fn from_env<F>(lookup: F) -> Result<Self, ModelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("GOOGLE_API_KEY"))
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ModelError::MissingCredentials { key: "GEMINI_API_KEY".to_string() })?;
        Ok(Self::with_api_key(api_key))
    }

    /// Creates a provider with an explicit API key.
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Points the provider at a different endpoint (e.g. a proxy or a test server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, model: &str, streaming: bool) -> String {
        if streaming {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse&key={}",
                self.base_url, model, self.api_key
            )
        } else {
            format!("{}/models/{}:generateContent?key={}", self.base_url, model, self.api_key)
        }
    }

    async fn send(
        &self,
        options: &CallOptions,
        streaming: bool,
    ) -> Result<reqwest::Response, ModelError> {
        let request_body = GeminiRequest::from_options(options);
        debug!(
            model_id = %options.model,
            label = options.label.as_deref().unwrap_or("-"),
            parts = options.parts.len(),
            images = options.image_count(),
            tools = options.tools.len(),
            thinking_budget = ?options.thinking_budget,
            streaming,
            "GeminiModel sending request"
        );

        let url = self.endpoint(&options.model, streaming);
        let response = self.client.post(&url).json(&request_body).send().await.map_err(|e| {
            error!(error = %e, "Failed to send request to Gemini API");
            ModelError::RequestError(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini API returned error status");
            return Err(map_status_error(status, error_text));
        }
        Ok(response)
    }
}

/// Maps a non-success HTTP status to a `ModelError`.
pub(crate) fn map_status_error(status: StatusCode, error_text: String) -> ModelError {
    match status.as_u16() {
        402 | 429 => ModelError::QuotaExceeded {
            provider: PROVIDER.to_string(),
            message: Some(error_text),
        },
        401 | 403 => ModelError::Authentication(format!("({}): {}", status, error_text)),
        400 if error_text.contains("API_KEY_INVALID") => {
            ModelError::Authentication(format!("({}): {}", status, error_text))
        }
        500..=599 => {
            ModelError::ModelResponseError(format!("Server error ({}): {}", status, error_text))
        }
        _ => ModelError::ModelResponseError(format!("API error ({}): {}", status, error_text)),
    }
}

#[async_trait]
impl ModelProvider for GeminiModel {
    async fn generate(&self, options: &CallOptions) -> Result<ProviderReply, ModelError> {
        let response = self.send(options, false).await?;
        let raw: Value = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini API response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;
        parse_reply(raw)
    }

    async fn generate_stream(&self, options: &CallOptions) -> Result<ReplyStream, ModelError> {
        let response = self.send(options, true).await?;
        Ok(Box::pin(GeminiSseStream::new(response)))
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}

/// Classifies the parts of the first candidate of a native reply.
///
/// # Errors
/// Returns `ModelError::ModelResponseError` if the reply carries an `error` object,
/// or `SerializationError` if it does not match the response schema.
pub fn parse_reply(raw: Value) -> Result<ProviderReply, ModelError> {
    if let Some(err) = raw.get("error") {
        let message = err.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(ModelError::ModelResponseError(format!("Provider error: {}", message)));
    }

    let response: GeminiResponse = serde_json::from_value(raw.clone()).map_err(|e| {
        ModelError::SerializationError(format!("Failed to parse response: {}", e))
    })?;

    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(GeminiPart::into_reply_part).collect())
        .unwrap_or_default();

    Ok(ProviderReply { parts, text: response.text, raw: RawReply::new(raw) })
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

impl GeminiRequest {
    fn from_options(options: &CallOptions) -> Self {
        let parts = options
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => GeminiPart::text(text.clone()),
                ContentPart::InlineImage { mime_type, data } => GeminiPart {
                    inline_data: Some(GeminiInlineData {
                        mime_type: mime_type.clone(),
                        data: data.clone(),
                    }),
                    ..GeminiPart::default()
                },
            })
            .collect();

        let tools = if options.tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTool { function_declarations: options.tools.clone() }]
        };

        Self {
            contents: vec![GeminiContent { role: Some("user".to_string()), parts }],
            tools,
            generation_config: Self::generation_config(options),
        }
    }

    fn generation_config(options: &CallOptions) -> Option<Value> {
        let mut config = match &options.generation_config {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        if let Some(budget) = options.thinking_budget {
            config.insert(
                "thinkingConfig".to_string(),
                json!({ "thinkingBudget": budget, "includeThoughts": options.include_thoughts }),
            );
        }
        if config.is_empty() { None } else { Some(Value::Object(config)) }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<markup_abstraction::FunctionDeclaration>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self { text: Some(text), ..Self::default() }
    }

    fn into_reply_part(self) -> Option<ReplyPart> {
        if let Some(call) = self.function_call {
            return Some(ReplyPart::FunctionCall(FunctionCall { name: call.name, args: call.args }));
        }
        if let Some(inline) = self.inline_data {
            return Some(ReplyPart::InlineData { mime_type: inline.mime_type, data: inline.data });
        }
        let text = self.text?;
        if self.thought.unwrap_or(false) {
            Some(ReplyPart::Thought(text))
        } else if text.is_empty() {
            None
        } else {
            Some(ReplyPart::Text(text))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    #[serde(default = "default_mime_type")]
    mime_type: String,
    data: String,
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    /// Convenience text supplied by some gateways.
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}
