//! Request bodies and their validation.
//!
//! Bodies deserialize leniently (every field optional) so that a missing
//! field is reported as a 400 naming it, the same way as a malformed one.

use axum::extract::rejection::JsonRejection;
use markup_abstraction::{CallOptions, ContentPart, DataUrl, FunctionDeclaration};
use markup_orchestrator::{EditRequest, ReferencePoint};
use serde::Deserialize;
use serde_json::Value;

use crate::config::MAX_ITERATIONS_RANGE;
use crate::error::ApiError;

/// Instruction appended to single-shot generation prompts.
pub const EDIT_SUFFIX: &str = "\n\nMake SIGNIFICANT, VISIBLE changes to create the requested \
                               modification. The result should look clearly different from \
                               the original.";

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("body", rejection.body_text())
    }
}

fn required_text(field: &'static str, value: Option<String>) -> Result<String, ApiError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(ApiError::validation(field, "must not be empty")),
        None => Err(ApiError::validation(field, "is required")),
    }
}

fn required_image(field: &'static str, value: Option<String>) -> Result<DataUrl, ApiError> {
    let value = value.ok_or_else(|| ApiError::validation(field, "is required"))?;
    DataUrl::parse_image(&value).map_err(|err| ApiError::validation(field, err.to_string()))
}

fn optional_image(field: &'static str, value: Option<String>) -> Result<Option<DataUrl>, ApiError> {
    value.map(|v| required_image(field, Some(v))).transpose()
}

/// One content part of a text generation request, provider-style.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RequestPart {
    Text { text: String },
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestContent {
    #[serde(default)]
    pub parts: Vec<RequestPart>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTool {
    #[serde(default)]
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// `POST /api/ai/generate`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTextBody {
    pub model: Option<String>,
    pub contents: Option<Vec<RequestContent>>,
    pub tools: Option<Vec<RequestTool>>,
    pub generation_config: Option<Value>,
    pub thinking_budget: Option<u32>,
    pub include_thoughts: Option<bool>,
    pub log_label: Option<String>,
}

impl GenerateTextBody {
    /// Validates the body into adapter call options.
    ///
    /// All content turns are folded into one user turn, so roles are not
    /// read. Inline images follow the same rules as the image endpoints.
    /// `default_budget`
    /// applies when thoughts are requested without a budget.
    pub fn into_options(self, default_budget: u32) -> Result<CallOptions, ApiError> {
        let model = required_text("model", self.model)?;
        let contents = self.contents.filter(|c| !c.is_empty()).ok_or_else(|| {
            ApiError::validation("contents", "must contain at least one item")
        })?;

        let mut options = CallOptions::new(model);
        for content in contents {
            for part in content.parts {
                match part {
                    RequestPart::Text { text } => options = options.with_text(text),
                    RequestPart::InlineData { inline_data } => {
                        let InlineData { mime_type, data } = inline_data;
                        let url = format!("data:{mime_type};base64,{data}");
                        let image = DataUrl::parse_image(&url)
                            .map_err(|err| ApiError::validation("inlineData", err.to_string()))?;
                        options.parts.push(ContentPart::image(&image));
                    }
                }
            }
        }
        if options.parts.is_empty() {
            return Err(ApiError::validation("contents", "must contain at least one part"));
        }

        for tool in self.tools.unwrap_or_default() {
            for declaration in tool.function_declarations {
                options = options.with_tool(declaration);
            }
        }
        if let Some(config) = self.generation_config {
            options = options.with_generation_config(config);
        }
        if self.include_thoughts.unwrap_or(true) {
            options = options.with_thinking_budget(self.thinking_budget.unwrap_or(default_budget));
        }
        if let Some(label) = self.log_label {
            options = options.with_label(label);
        }
        Ok(options)
    }
}

/// `POST /api/images/generate`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageBody {
    pub model: Option<String>,
    pub source_image: Option<String>,
    pub prompt: Option<String>,
    pub log_label: Option<String>,
}

/// A validated single-shot generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeneration {
    pub model: String,
    pub source_image: DataUrl,
    /// The user prompt with [`EDIT_SUFFIX`] appended.
    pub prompt: String,
    pub log_label: Option<String>,
}

impl GenerateImageBody {
    pub fn validate(self) -> Result<ImageGeneration, ApiError> {
        let model = required_text("model", self.model)?;
        let source_image = required_image("sourceImage", self.source_image)?;
        let prompt = required_text("prompt", self.prompt)?;
        Ok(ImageGeneration {
            model,
            source_image,
            prompt: format!("{prompt}{EDIT_SUFFIX}"),
            log_label: self.log_label,
        })
    }
}

/// `POST /api/images/inpaint`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InpaintBody {
    pub source_image: Option<String>,
    pub mask_image: Option<String>,
    pub prompt: Option<String>,
    pub thinking_budget: Option<u32>,
}

impl InpaintBody {
    /// Inpainting always runs the full loop with `max_iterations` attempts.
    pub fn validate(self, max_iterations: u32) -> Result<EditRequest, ApiError> {
        let source_image = required_image("sourceImage", self.source_image)?;
        let mask_image = required_image("maskImage", self.mask_image)?;
        let prompt = required_text("prompt", self.prompt)?;
        let mut request = EditRequest::new(source_image, prompt)
            .with_mask(mask_image)
            .with_max_iterations(max_iterations);
        request.planning_budget = self.thinking_budget;
        Ok(request)
    }
}

/// `POST /api/agentic/edit`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenticEditBody {
    pub source_image: Option<String>,
    pub prompt: Option<String>,
    pub mask_image: Option<String>,
    pub reference_points: Option<Vec<ReferencePoint>>,
    pub max_iterations: Option<u32>,
}

impl AgenticEditBody {
    pub fn validate(self, default_iterations: u32) -> Result<EditRequest, ApiError> {
        let source_image = required_image("sourceImage", self.source_image)?;
        let prompt = required_text("prompt", self.prompt)?;
        let mask_image = optional_image("maskImage", self.mask_image)?;
        let max_iterations = self.max_iterations.unwrap_or(default_iterations);
        if !MAX_ITERATIONS_RANGE.contains(&max_iterations) {
            let (min, max) = (MAX_ITERATIONS_RANGE.start(), MAX_ITERATIONS_RANGE.end());
            return Err(ApiError::validation(
                "maxIterations",
                format!("must be between {min} and {max}"),
            ));
        }

        let mut request = EditRequest::new(source_image, prompt)
            .with_max_iterations(max_iterations)
            .with_reference_points(self.reference_points.unwrap_or_default());
        if let Some(mask) = mask_image {
            request = request.with_mask(mask);
        }
        Ok(request)
    }
}
