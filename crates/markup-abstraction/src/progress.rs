//! Operation-level progress updates shared by the orchestrator, the stream
//! emitter and the client log aggregator.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Where an operation currently is.
///
/// `Idle` is both the initial state and terminal for timing, alongside
/// `Complete` and `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Idle,
    Planning,
    CallingApi,
    Processing,
    SelfChecking,
    Iterating,
    Complete,
    Error,
}

impl Step {
    /// Parses a wire step name. Unknown names map to `Processing`.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "idle" => Self::Idle,
            "planning" => Self::Planning,
            "calling_api" => Self::CallingApi,
            "self_checking" => Self::SelfChecking,
            "iterating" => Self::Iterating,
            "complete" => Self::Complete,
            "error" => Self::Error,
            _ => Self::Processing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::CallingApi => "calling_api",
            Self::Processing => "processing",
            Self::SelfChecking => "self_checking",
            Self::Iterating => "iterating",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Stops the elapsed-time clock.
    pub fn is_timing_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Complete | Self::Error)
    }

    /// An operation is in flight.
    pub fn is_active(self) -> bool {
        !self.is_timing_terminal()
    }

    /// The operation has ended (successfully or not).
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&name))
    }
}

/// 1-based iteration counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationInfo {
    pub current: u32,
    pub max: u32,
}

impl IterationInfo {
    pub fn new(current: u32, max: u32) -> Self {
        Self { current, max }
    }
}

/// An image sent to the model, disclosed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputImage {
    /// e.g. "Original Image", "Mask", "Edited Result".
    pub label: String,
    pub data_url: String,
}

impl InputImage {
    pub fn new(label: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self { label: label.into(), data_url: data_url.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), details: None }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// One `progress` message.
///
/// Absent optional fields are omitted on the wire. `thinking_text` and
/// `raw_output` carry full text (replace semantics); the `*_delta` fields
/// carry fragments to append to the most recent log entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub step: Step,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_text_delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output_delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<IterationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_images: Option<Vec<InputImage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub new_log_entry: bool,
}

impl ProgressUpdate {
    pub fn new(step: Step, message: impl Into<String>) -> Self {
        Self { step, message: Some(message.into()), ..Self::default() }
    }

    #[must_use]
    pub fn with_thinking(mut self, text: impl Into<String>) -> Self {
        self.thinking_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_thinking_delta(mut self, delta: impl Into<String>) -> Self {
        self.thinking_text_delta = Some(delta.into());
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_raw_output(mut self, output: impl Into<String>) -> Self {
        self.raw_output = Some(output.into());
        self
    }

    #[must_use]
    pub fn with_raw_output_delta(mut self, delta: impl Into<String>) -> Self {
        self.raw_output_delta = Some(delta.into());
        self
    }

    #[must_use]
    pub fn with_iteration(mut self, iteration: IterationInfo) -> Self {
        self.iteration = Some(iteration);
        self
    }

    #[must_use]
    pub fn with_iteration_image(mut self, image: impl Into<String>) -> Self {
        self.iteration_image = Some(image.into());
        self
    }

    #[must_use]
    pub fn with_input_images(mut self, images: Vec<InputImage>) -> Self {
        self.input_images = Some(images);
        self
    }

    #[must_use]
    pub fn with_source_image(mut self, image: impl Into<String>) -> Self {
        self.source_image = Some(image.into());
        self
    }

    #[must_use]
    pub fn with_mask_image(mut self, image: impl Into<String>) -> Self {
        self.mask_image = Some(image.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// Forces the receiver to open a new log entry.
    #[must_use]
    pub fn as_new_entry(mut self) -> Self {
        self.new_log_entry = true;
        self
    }

    /// Whether the update carries an incremental fragment.
    pub fn has_delta(&self) -> bool {
        self.thinking_text_delta.is_some() || self.raw_output_delta.is_some()
    }
}

/// Receives operation progress. Implementations must not block.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressReporter for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_step_wire_names() {
        assert_eq!(serde_json::to_value(Step::CallingApi).unwrap(), json!("calling_api"));
        assert_eq!(serde_json::to_value(Step::SelfChecking).unwrap(), json!("self_checking"));
        let step: Step = serde_json::from_value(json!("iterating")).unwrap();
        assert_eq!(step, Step::Iterating);
    }

    #[test]
    fn test_unknown_step_is_processing() {
        let step: Step = serde_json::from_value(json!("uploading")).unwrap();
        assert_eq!(step, Step::Processing);
    }

    #[test]
    fn test_step_timing_classes() {
        assert!(Step::Idle.is_timing_terminal());
        assert!(!Step::Idle.is_finished());
        assert!(Step::Complete.is_finished());
        assert!(Step::Error.is_finished());
        let active = [
            Step::Planning,
            Step::CallingApi,
            Step::Processing,
            Step::SelfChecking,
            Step::Iterating,
        ];
        for step in active {
            assert!(step.is_active(), "{step} should be active");
        }
    }

    #[test]
    fn test_update_omits_absent_fields() {
        let update = ProgressUpdate::new(Step::Planning, "Planning").with_thinking_delta("abc");
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"step": "planning", "message": "Planning", "thinkingTextDelta": "abc"})
        );
        assert!(update.has_delta());
    }

    #[test]
    fn test_update_serializes_new_entry_and_iteration() {
        let update = ProgressUpdate::new(Step::CallingApi, "Generating image (attempt 1/3)...")
            .with_iteration(IterationInfo::new(1, 3))
            .with_input_images(vec![InputImage::new(
                "Original Image",
                "data:image/png;base64,AA==",
            )])
            .as_new_entry();
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({
                "step": "calling_api",
                "message": "Generating image (attempt 1/3)...",
                "iteration": {"current": 1, "max": 3},
                "inputImages": [
                    {"label": "Original Image", "dataUrl": "data:image/png;base64,AA=="}
                ],
                "newLogEntry": true
            })
        );
    }

    #[test]
    fn test_update_deserializes_minimal_message() {
        let update: ProgressUpdate = serde_json::from_value(json!({"step": "processing"})).unwrap();
        assert_eq!(update.step, Step::Processing);
        assert_eq!(update.message, None);
        assert!(!update.new_log_entry);
    }
}
