// Agentic edit loop: plan -> generate -> self-check, repeated until the
// result is accepted or the attempt budget runs out.
//
// One request runs strictly in sequence. Nothing here is shared between
// requests except the adapter and image editor, which are read-only.

use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use markup_abstraction::{
    CallOptions, DataUrl, ErrorInfo, GenerateImageRequest, GeneratedImage, ImageEditor,
    InpaintRequest, InputImage, IterationInfo, ModelError, ProgressCallback, ProgressEvent,
    ProgressReporter, ProgressUpdate, Step, StreamSnapshot,
};
use markup_models::{ModelAdapter, SnapshotStream, models, thinking};
use tracing::{debug, info, warn};

use crate::error::{OrchestrationError, Result};
use crate::prompts::{
    ReferencePoint, build_evaluation_prompt, build_planning_prompt, image_painter_tool,
};
use crate::verdict::{parse_verdict, refine_prompt};

/// Configuration for the agentic editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorConfig {
    /// Model used for planning and self-check
    pub planning_model: String,
    /// Attempts per request when the request does not say
    pub max_iterations: u32,
    /// Deliberation budget for planning
    pub planning_budget: u32,
    /// Deliberation budget for self-check
    pub evaluation_budget: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            planning_model: models::PLANNING.to_string(),
            max_iterations: 3,
            planning_budget: thinking::HIGH,
            evaluation_budget: thinking::MEDIUM,
        }
    }
}

/// One edit request.
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub source_image: DataUrl,
    /// White marks the region to edit. Absent means the whole image.
    pub mask_image: Option<DataUrl>,
    pub prompt: String,
    pub reference_points: Vec<ReferencePoint>,
    /// Overrides `EditorConfig::max_iterations`.
    pub max_iterations: Option<u32>,
    /// Overrides `EditorConfig::planning_budget`.
    pub planning_budget: Option<u32>,
}

impl EditRequest {
    pub fn new(source_image: DataUrl, prompt: impl Into<String>) -> Self {
        Self {
            source_image,
            mask_image: None,
            prompt: prompt.into(),
            reference_points: Vec::new(),
            max_iterations: None,
            planning_budget: None,
        }
    }

    #[must_use]
    pub fn with_mask(mut self, mask: DataUrl) -> Self {
        self.mask_image = Some(mask);
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }

    #[must_use]
    pub fn with_reference_points(mut self, points: Vec<ReferencePoint>) -> Self {
        self.reference_points = points;
        self
    }
}

/// Terminal output of a successful edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub image_data: DataUrl,
    /// Generation attempts actually made.
    pub iterations: u32,
    /// Prompt that produced `image_data`.
    pub final_prompt: String,
    /// Prompt produced by the planning phase.
    pub refined_prompt: String,
    /// Planning deliberation text.
    pub thinking: String,
}

/// Runs the plan -> generate -> self-check loop.
pub struct AgenticEditor {
    adapter: ModelAdapter,
    images: Arc<dyn ImageEditor>,
    config: EditorConfig,
}

impl AgenticEditor {
    pub fn new(adapter: ModelAdapter, images: Arc<dyn ImageEditor>, config: EditorConfig) -> Self {
        Self { adapter, images, config }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    fn max_iterations(&self, request: &EditRequest) -> u32 {
        request.max_iterations.unwrap_or(self.config.max_iterations)
    }

    fn planning_prompt(request: &EditRequest) -> String {
        build_planning_prompt(
            &request.prompt,
            request.mask_image.is_some(),
            &request.reference_points,
        )
    }

    /// The update that opens an edit's log entry, disclosing its inputs.
    pub fn initial_update(&self, request: &EditRequest) -> ProgressUpdate {
        let source = request.source_image.to_string();
        let mut images = vec![InputImage::new("Original Image", source.clone())];
        let mut update = ProgressUpdate::new(Step::Planning, "Sending planning request to AI...")
            .with_prompt(Self::planning_prompt(request))
            .with_iteration(IterationInfo::new(0, self.max_iterations(request)))
            .with_source_image(source);
        if let Some(mask) = &request.mask_image {
            let mask = mask.to_string();
            images.push(InputImage::new("Mask", mask.clone()));
            update = update.with_mask_image(mask);
        }
        update.with_input_images(images).as_new_entry()
    }

    /// Runs one edit to completion.
    ///
    /// # Errors
    /// - `Planning` if the planning call fails
    /// - `Generation` if the image collaborator fails on any attempt
    /// - `NoResult` if no attempt was made
    ///
    /// Self-check failures never surface here; the current candidate is accepted.
    pub async fn run(
        &self,
        request: &EditRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<EditOutcome> {
        let max = self.max_iterations(request);
        info!(
            prompt_len = request.prompt.len(),
            has_mask = request.mask_image.is_some(),
            max_iterations = max,
            "Planning: starting"
        );

        let plan = self.plan(request, max, &reporter).await?;
        let refined_prompt =
            refine_prompt(plan.function_call.as_ref(), &plan.text, &request.prompt);
        info!(refined_prompt = %truncate(&refined_prompt, 80), "Planning: refined prompt");
        reporter.report(
            ProgressUpdate::new(Step::Processing, "AI planned the edit")
                .with_raw_output(refined_prompt.clone())
                .with_iteration(IterationInfo::new(0, max)),
        );

        let mut current_prompt = refined_prompt.clone();
        let mut candidate: Option<DataUrl> = None;
        let mut attempts = 0;

        for attempt in 1..=max {
            let iteration = IterationInfo::new(attempt, max);
            let image = self.generate(request, &current_prompt, iteration, &reporter).await?;
            attempts = attempt;
            let image_data = candidate.insert(image.image_data);

            if attempt == max {
                info!(attempt, "Self-check: max iterations reached");
                reporter.report(
                    ProgressUpdate::new(
                        Step::Processing,
                        "Max iterations reached, using final result",
                    )
                    .with_iteration(iteration),
                );
                break;
            }

            let verdict =
                self.self_check(request, &current_prompt, image_data, iteration, &reporter).await;
            let Some(verdict) = verdict else {
                break;
            };
            info!(attempt, satisfied = verdict.satisfied, "Self-check: verdict");

            if verdict.satisfied {
                let message = format!("AI approved: {}", verdict.reasoning);
                reporter.report(
                    ProgressUpdate::new(Step::Processing, message).with_iteration(iteration),
                );
                break;
            }
            let Some(revised) = verdict.revised_prompt else {
                let message = format!(
                    "AI requested revision without a new prompt, using current result: {}",
                    verdict.reasoning
                );
                reporter.report(
                    ProgressUpdate::new(Step::Processing, message).with_iteration(iteration),
                );
                break;
            };
            let message = format!("AI requested revision: {}", verdict.reasoning);
            reporter.report(
                ProgressUpdate::new(Step::Iterating, message)
                    .with_raw_output(revised.clone())
                    .with_iteration(iteration),
            );
            current_prompt = revised;
        }

        let image_data = candidate.ok_or(OrchestrationError::NoResult)?;
        Ok(EditOutcome {
            image_data,
            iterations: attempts,
            final_prompt: current_prompt,
            refined_prompt,
            thinking: plan.thinking,
        })
    }

    async fn plan(
        &self,
        request: &EditRequest,
        max: u32,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> Result<StreamSnapshot> {
        let mut options = CallOptions::new(self.config.planning_model.clone())
            .with_text(Self::planning_prompt(request))
            .with_image(&request.source_image)
            .with_tool(image_painter_tool())
            .with_thinking_budget(request.planning_budget.unwrap_or(self.config.planning_budget))
            .with_label("planning");
        if let Some(mask) = &request.mask_image {
            options = options.with_text("Mask (white = selected area):").with_image(mask);
        }

        let observer = PhaseObserver::new(
            Arc::clone(reporter),
            Step::Planning,
            IterationInfo::new(0, max),
            "AI response received",
        );
        match drain(self.adapter.call_stream(options, Arc::new(observer))).await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                warn!(error = %err, "Planning: failed");
                reporter.report(
                    ProgressUpdate::new(Step::Error, format!("Planning failed: {}", err))
                        .with_error(ErrorInfo::new(err.to_string()))
                        .with_iteration(IterationInfo::new(0, max)),
                );
                Err(OrchestrationError::Planning(err))
            }
        }
    }

    async fn generate(
        &self,
        request: &EditRequest,
        prompt: &str,
        iteration: IterationInfo,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> Result<GeneratedImage> {
        info!(attempt = iteration.current, max = iteration.max, "Generate: starting");
        let mut inputs = vec![InputImage::new("Source Image", request.source_image.to_string())];
        if let Some(mask) = &request.mask_image {
            inputs.push(InputImage::new("Mask", mask.to_string()));
        }
        reporter.report(
            ProgressUpdate::new(
                Step::CallingApi,
                format!("Generating image (attempt {}/{})...", iteration.current, iteration.max),
            )
            .with_prompt(prompt)
            .with_input_images(inputs)
            .with_iteration(iteration),
        );

        let result = match &request.mask_image {
            Some(mask) => {
                self.images
                    .inpaint(&InpaintRequest {
                        source_image: request.source_image.clone(),
                        mask_image: mask.clone(),
                        prompt: prompt.to_string(),
                        thinking_budget: None,
                    })
                    .await
            }
            None => {
                self.images
                    .generate_image(&GenerateImageRequest {
                        source_image: request.source_image.clone(),
                        prompt: prompt.to_string(),
                        model: None,
                    })
                    .await
            }
        };

        match result {
            Ok(image) => {
                let mut update = ProgressUpdate::new(
                    Step::Processing,
                    format!("Image generated (attempt {}/{})", iteration.current, iteration.max),
                )
                .with_iteration_image(image.image_data.to_string())
                .with_iteration(iteration);
                if let Some(text) = &image.text {
                    update = update.with_raw_output(text.clone());
                }
                reporter.report(update);
                Ok(image)
            }
            Err(err) => {
                warn!(attempt = iteration.current, error = %err, "Generate: failed");
                reporter.report(
                    ProgressUpdate::new(Step::Error, format!("Generation failed: {}", err))
                        .with_error(ErrorInfo::new(err.to_string()))
                        .with_iteration(iteration),
                );
                Err(OrchestrationError::Generation { iteration: iteration.current, source: err })
            }
        }
    }

    /// Returns `None` when the check itself failed; the caller accepts the candidate.
    async fn self_check(
        &self,
        request: &EditRequest,
        edit_prompt: &str,
        candidate: &DataUrl,
        iteration: IterationInfo,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> Option<crate::verdict::Verdict> {
        let prompt = build_evaluation_prompt(&request.prompt, edit_prompt);
        reporter.report(
            ProgressUpdate::new(Step::SelfChecking, "AI is evaluating the result...")
                .with_prompt(prompt.clone())
                .with_input_images(vec![
                    InputImage::new("Original Image (BEFORE)", request.source_image.to_string()),
                    InputImage::new("Edited Image (AFTER)", candidate.to_string()),
                ])
                .with_iteration(iteration),
        );

        let options = CallOptions::new(self.config.planning_model.clone())
            .with_text("ORIGINAL IMAGE:")
            .with_image(&request.source_image)
            .with_text("EDITED IMAGE:")
            .with_image(candidate)
            .with_text(prompt)
            .with_thinking_budget(self.config.evaluation_budget)
            .with_label("self_check");

        let observer = PhaseObserver::new(
            Arc::clone(reporter),
            Step::SelfChecking,
            iteration,
            "AI evaluation received",
        );
        match drain(self.adapter.call_stream(options, Arc::new(observer))).await {
            Ok(snapshot) => Some(parse_verdict(&snapshot.thinking, &snapshot.text)),
            Err(err) => {
                warn!(
                    attempt = iteration.current,
                    error = %err,
                    "Self-check: failed, accepting current result"
                );
                let message = format!("Evaluation failed, using current result: {}", err);
                reporter.report(
                    ProgressUpdate::new(Step::Processing, message)
                        .with_error(ErrorInfo::new(err.to_string()))
                        .with_iteration(iteration),
                );
                None
            }
        }
    }
}

/// Consumes a snapshot stream, returning the final snapshot.
async fn drain(mut stream: SnapshotStream) -> std::result::Result<StreamSnapshot, ModelError> {
    let mut last = StreamSnapshot::default();
    while let Some(item) = stream.next().await {
        last = item?;
        if last.done {
            break;
        }
    }
    Ok(last)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Translates adapter events for one phase into progress updates.
///
/// Cumulative snapshots become `*_delta` fields so the receiver appends to
/// the open log entry.
struct PhaseObserver {
    reporter: Arc<dyn ProgressReporter>,
    step: Step,
    iteration: IterationInfo,
    received_message: &'static str,
    /// Byte lengths of thinking and text already forwarded.
    forwarded: Mutex<(usize, usize)>,
}

impl PhaseObserver {
    fn new(
        reporter: Arc<dyn ProgressReporter>,
        step: Step,
        iteration: IterationInfo,
        received_message: &'static str,
    ) -> Self {
        Self { reporter, step, iteration, received_message, forwarded: Mutex::new((0, 0)) }
    }
}

impl ProgressCallback for PhaseObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Streaming { thinking, text, .. } => {
                let update = {
                    let mut forwarded =
                        self.forwarded.lock().unwrap_or_else(PoisonError::into_inner);
                    let thinking_delta = thinking.get(forwarded.0..).unwrap_or_default();
                    let text_delta = text.get(forwarded.1..).unwrap_or_default();
                    if thinking_delta.is_empty() && text_delta.is_empty() {
                        return;
                    }
                    let message = if thinking_delta.is_empty() {
                        format!("AI is responding... ({} chars)", text.chars().count())
                    } else {
                        format!("AI is thinking... ({} chars)", thinking.chars().count())
                    };
                    let mut update =
                        ProgressUpdate::new(self.step, message).with_iteration(self.iteration);
                    if !thinking_delta.is_empty() {
                        update = update.with_thinking_delta(thinking_delta);
                    }
                    if !text_delta.is_empty() {
                        update = update.with_raw_output_delta(text_delta);
                    }
                    *forwarded = (thinking.len(), text.len());
                    update
                };
                self.reporter.report(update);
            }
            ProgressEvent::Response { thinking, text, function_call } => {
                debug!(
                    step = %self.step,
                    thinking_len = thinking.len(),
                    text_len = text.len(),
                    "Phase response received"
                );
                let raw_output = function_call
                    .as_ref()
                    .map_or_else(|| text.clone(), |call| format!("Function call: {call}"));
                self.reporter.report(
                    ProgressUpdate::new(self.step, self.received_message)
                        .with_raw_output(raw_output)
                        .with_thinking(thinking.clone())
                        .with_iteration(self.iteration),
                );
            }
            ProgressEvent::Request { .. } | ProgressEvent::Error { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 80), "short");
    }

    #[test]
    fn test_phase_observer_forwards_deltas() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter: Arc<dyn ProgressReporter> =
            Arc::new(move |u: ProgressUpdate| sink.lock().unwrap().push(u));
        let observer = PhaseObserver::new(
            reporter,
            Step::Planning,
            IterationInfo::new(0, 3),
            "AI response received",
        );

        let streaming = |thinking: &str, text: &str| ProgressEvent::Streaming {
            thinking: thinking.to_string(),
            text: text.to_string(),
            function_call: None,
        };
        observer.on_progress(&streaming("ab", ""));
        observer.on_progress(&streaming("abcd", ""));
        observer.on_progress(&streaming("abcd", "x"));
        observer.on_progress(&streaming("abcd", "x"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].thinking_text_delta.as_deref(), Some("ab"));
        assert_eq!(seen[0].message.as_deref(), Some("AI is thinking... (2 chars)"));
        assert_eq!(seen[1].thinking_text_delta.as_deref(), Some("cd"));
        assert_eq!(seen[1].message.as_deref(), Some("AI is thinking... (4 chars)"));
        assert_eq!(seen[2].raw_output_delta.as_deref(), Some("x"));
        assert_eq!(seen[2].thinking_text_delta, None);
        assert!(seen.iter().all(|u| !u.new_log_entry));
    }
}
