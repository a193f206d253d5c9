//! HTTP handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use chrono::Utc;
use markup_abstraction::{
    CallResult, CompletePayload, ErrorPayload, GenerateImageRequest, GeneratedImage, ImageEditor,
    IterationInfo,
};
use markup_models::ModelAdapter;
use markup_orchestrator::{EditOutcome, EditRequest, OrchestrationError};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use super::AppState;
use super::images::{log_content_images, log_image_inputs};
use super::request::{AgenticEditBody, GenerateImageBody, GenerateTextBody, InpaintBody};
use super::sse::stream_response;
use crate::emitter::{Completion, ProgressChannel};
use crate::error::ApiError;

/// Server version reported by `/` and `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Attempts made by the inpaint endpoint.
const INPAINT_ITERATIONS: u32 = 3;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_seconds: f64,
    pub environment: String,
    pub version: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = (state.started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        uptime_seconds: uptime,
        environment: state.config.environment.clone(),
        version: VERSION,
    })
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "Image Markup AI Server",
        "version": VERSION,
        "status": "running",
        "endpoints": {
            "health": "GET /health",
            "generate": "POST /api/ai/generate",
            "images_generate": "POST /api/images/generate",
            "images_inpaint": "POST /api/images/inpaint",
            "agentic_edit": "POST /api/agentic/edit",
        },
    }))
}

/// `POST /api/ai/generate`: one adapter call, returned as JSON.
pub async fn generate_text(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateTextBody>, JsonRejection>,
) -> Result<Json<CallResult>, ApiError> {
    let Json(body) = body?;
    let options = body.into_options(state.config.thinking.medium)?;
    let provider = state.provider()?;

    info!(
        model_id = %options.model,
        label = options.label.as_deref().unwrap_or("-"),
        parts = options.parts.len(),
        tools = options.tools.len(),
        "Text generation request"
    );
    log_content_images(&options);

    let result = ModelAdapter::new(provider)
        .call(&options, None)
        .await
        .map_err(|err| ApiError::provider("Gemini API call failed", err))?;
    Ok(Json(result))
}

/// `POST /api/images/generate`: one image-output call, returned as JSON.
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateImageBody>, JsonRejection>,
) -> Result<Json<GeneratedImage>, ApiError> {
    let Json(body) = body?;
    let request = body.validate()?;
    let editor = state.image_editor()?;

    info!(
        model_id = %request.model,
        prompt_len = request.prompt.len(),
        label = request.log_label.as_deref().unwrap_or("-"),
        "Image generation request"
    );
    log_image_inputs(&[("sourceImage", &request.source_image)]);

    let image = editor
        .generate_image(&GenerateImageRequest {
            source_image: request.source_image,
            prompt: request.prompt,
            model: Some(request.model),
        })
        .await
        .map_err(|err| ApiError::provider("Image generation failed", err))?;
    Ok(Json(image))
}

/// `POST /api/agentic/edit`: the full loop, streamed.
pub async fn agentic_edit(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AgenticEditBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let request = body.validate(state.config.workflow.max_iterations)?;
    stream_edit(&state, request, "Edit completed successfully!")
}

/// `POST /api/images/inpaint`: the full loop over a masked region, streamed.
pub async fn inpaint(
    State(state): State<Arc<AppState>>,
    body: Result<Json<InpaintBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let request = body.validate(INPAINT_ITERATIONS)?;
    stream_edit(&state, request, "Inpaint completed successfully!")
}

fn stream_edit(
    state: &AppState,
    request: EditRequest,
    done_message: &'static str,
) -> Result<Response, ApiError> {
    let editor = state.agentic_editor()?;

    let mut images = vec![("sourceImage", &request.source_image)];
    if let Some(mask) = &request.mask_image {
        images.push(("maskImage", mask));
    }
    log_image_inputs(&images);
    info!(
        prompt_len = request.prompt.len(),
        has_mask = request.mask_image.is_some(),
        reference_points = request.reference_points.len(),
        "Agentic edit request"
    );

    let (channel, rx) = ProgressChannel::open();
    let initial = editor.initial_update(&request);
    let max = request.max_iterations.unwrap_or(editor.config().max_iterations);

    tokio::spawn(channel.run(initial, move |reporter| async move {
        editor
            .run(&request, reporter)
            .await
            .map(|outcome| completion(done_message, outcome, max))
            .map_err(|err| error_payload(&err))
    }));

    Ok(stream_response(rx))
}

fn completion(message: &str, outcome: EditOutcome, max: u32) -> Completion {
    let payload = CompletePayload {
        image_data: outcome.image_data.to_string(),
        thinking: Some(outcome.thinking),
        refined_prompt: Some(outcome.refined_prompt),
        final_prompt: Some(outcome.final_prompt),
        iterations: Some(outcome.iterations),
    };
    Completion::new(message, payload).with_iteration(IterationInfo::new(outcome.iterations, max))
}

fn error_payload(err: &OrchestrationError) -> ErrorPayload {
    match err {
        OrchestrationError::NoResult => ErrorPayload {
            message: err.to_string(),
            details: Some("The workflow completed but did not produce an image".to_string()),
        },
        other => ErrorPayload {
            message: other.to_string(),
            details: other.model_error().map(ToString::to_string),
        },
    }
}
