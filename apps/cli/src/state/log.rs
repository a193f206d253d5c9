//! Activity log entries and log merging.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use markup_abstraction::{ErrorInfo, InputImage, IterationInfo, Step};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of an operation as recorded by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub step: Step,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<IterationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_images: Option<Vec<InputImage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl LogEntry {
    pub fn new(step: Step, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            step,
            message: message.into(),
            thinking_text: None,
            prompt: None,
            raw_output: None,
            iteration: None,
            error: None,
            iteration_image: None,
            source_image: None,
            mask_image: None,
            input_images: None,
            duration_ms: None,
        }
    }

    /// Appends streamed text to the entry's thinking and raw output.
    pub fn extend(&mut self, thinking_delta: Option<&str>, raw_output_delta: Option<&str>) {
        if let Some(delta) = thinking_delta {
            self.thinking_text.get_or_insert_with(String::new).push_str(delta);
        }
        if let Some(delta) = raw_output_delta {
            self.raw_output.get_or_insert_with(String::new).push_str(delta);
        }
    }

    pub fn is_final(&self) -> bool {
        self.duration_ms.is_some()
    }
}

/// Merges two logs into one, ordered by timestamp.
///
/// Entries are keyed by id: an id present in both logs is kept once, from
/// `first`. Merging a log with itself, or merging the result again, changes
/// nothing.
pub fn merge_logs(first: &[LogEntry], second: &[LogEntry]) -> Vec<LogEntry> {
    let mut seen = HashSet::new();
    let mut merged: Vec<LogEntry> =
        first.iter().chain(second).filter(|entry| seen.insert(entry.id)).cloned().collect();
    merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    merged
}
