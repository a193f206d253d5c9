//! Client-side progress aggregation.
//!
//! [`ProgressState`] folds every [`WireEvent`] of an operation into a
//! last-known view plus an activity log. Producers may send cumulative text
//! (`thinkingText`) or increments (`thinkingTextDelta`); the reducer tells
//! them apart by which fields are present and never needs to be told the
//! mode up front.

mod log;

pub use log::{LogEntry, merge_logs};

use chrono::{DateTime, Utc};
use markup_abstraction::{
    CompletePayload, ErrorInfo, IterationInfo, ProgressUpdate, Step, WireEvent,
};
use serde::{Deserialize, Serialize};

/// Recorded when the channel closes while an operation is still running.
pub const CONNECTION_CLOSED: &str = "Connection closed before the operation finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingStatus {
    #[default]
    Idle,
    Thinking,
}

/// What one [`ProgressState::apply`] call did to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A new entry was appended at this index.
    Added(usize),
    /// The entry at this index received streamed text.
    Extended(usize),
    /// Nothing was logged.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub step: Step,
    pub message: String,
    pub thinking_text: String,
    pub iteration: Option<IterationInfo>,
    pub elapsed_ms: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub log: Vec<LogEntry>,
    pub thinking_image: Option<String>,
    pub thinking_status: ThinkingStatus,
    /// Terminal payload of the last successful operation.
    #[serde(skip)]
    pub result: Option<CompletePayload>,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one message into the state.
    pub fn apply(&mut self, event: &WireEvent, now: DateTime<Utc>) -> Change {
        match event {
            WireEvent::Progress(update) => self.apply_progress(update, now),
            WireEvent::Complete(payload) => {
                self.result = Some(payload.clone());
                if self.step == Step::Complete {
                    return Change::Unchanged;
                }
                let update = ProgressUpdate::new(Step::Complete, "Complete");
                self.apply_progress(&update, now)
            }
            WireEvent::Error(payload) => {
                self.error = Some(payload.message.clone());
                if self.step == Step::Error {
                    return Change::Unchanged;
                }
                let update = ProgressUpdate::new(Step::Error, payload.message.clone())
                    .with_error(ErrorInfo::from(payload.clone()));
                self.apply_progress(&update, now)
            }
            WireEvent::End => {
                if !self.step.is_active() {
                    return Change::Unchanged;
                }
                let update = ProgressUpdate::new(Step::Error, CONNECTION_CLOSED)
                    .with_error(ErrorInfo::new(CONNECTION_CLOSED));
                self.apply_progress(&update, now)
            }
        }
    }

    /// Empties the activity log. Nothing else truncates it.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Whether the last operation has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.step.is_finished()
    }

    fn apply_progress(&mut self, update: &ProgressUpdate, now: DateTime<Utc>) -> Change {
        let starting = self.step.is_timing_terminal() && update.step.is_active();
        if starting {
            self.start_time = Some(now);
            self.thinking_status = ThinkingStatus::Thinking;
            self.thinking_text.clear();
            self.iteration = None;
            self.error = None;
            self.result = None;
        }

        if update.new_log_entry && !starting {
            self.thinking_text.clear();
        }

        self.step = update.step;
        if let Some(message) = &update.message {
            self.message.clone_from(message);
        }
        if let Some(delta) = &update.thinking_text_delta {
            self.thinking_text.push_str(delta);
        } else if let Some(text) = &update.thinking_text {
            self.thinking_text.clone_from(text);
        }
        if let Some(iteration) = update.iteration {
            self.iteration = Some(iteration);
        }
        if let Some(image) = &update.iteration_image {
            self.thinking_image = Some(image.clone());
        }
        if let Some(start) = self.start_time {
            self.elapsed_ms = millis_between(start, now);
        }

        if update.step.is_finished() {
            self.thinking_status = ThinkingStatus::Idle;
            self.thinking_image = None;
            if update.step == Step::Error {
                let message = update
                    .error
                    .as_ref()
                    .map_or_else(|| self.message.clone(), |e| e.message.clone());
                self.error = Some(message);
            }
        }

        self.record(update, starting, now)
    }

    fn record(&mut self, update: &ProgressUpdate, starting: bool, now: DateTime<Utc>) -> Change {
        if update.has_delta() && !update.new_log_entry && !starting {
            if let Some(index) = self.log.len().checked_sub(1) {
                let entry = &mut self.log[index];
                entry.extend(
                    update.thinking_text_delta.as_deref(),
                    update.raw_output_delta.as_deref(),
                );
                if let Some(message) = &update.message {
                    entry.message.clone_from(message);
                }
                if update.step.is_finished() {
                    entry.duration_ms =
                        Some(self.start_time.map_or(0, |start| millis_between(start, now)));
                }
                return Change::Extended(index);
            }
        }

        let previous = self.log.last();
        let mut entry = LogEntry::new(update.step, update.message.clone().unwrap_or_default(), now);
        entry.thinking_text =
            update.thinking_text.clone().or_else(|| update.thinking_text_delta.clone());
        entry.prompt.clone_from(&update.prompt);
        entry.raw_output = update.raw_output.clone().or_else(|| update.raw_output_delta.clone());
        entry.iteration = update.iteration;
        entry.error.clone_from(&update.error);
        entry.iteration_image.clone_from(&update.iteration_image);
        entry.input_images.clone_from(&update.input_images);
        entry.source_image =
            update.source_image.clone().or_else(|| previous.and_then(|p| p.source_image.clone()));
        entry.mask_image =
            update.mask_image.clone().or_else(|| previous.and_then(|p| p.mask_image.clone()));
        if update.step.is_finished() {
            entry.duration_ms = Some(self.start_time.map_or(0, |start| millis_between(start, now)));
        }

        self.log.push(entry);
        Change::Added(self.log.len() - 1)
    }
}

fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}
