//! Wire messages sent over one operation's channel.
//!
//! A channel carries any number of `progress` messages followed by exactly one
//! `complete` or `error`, then closes (`End`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::progress::{ErrorInfo, ProgressUpdate};

#[derive(Error, Debug)]
pub enum WireError {
    #[error("unknown event type '{0}'")]
    UnknownEvent(String),

    #[error("malformed '{event}' payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Terminal result of a successful operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    pub image_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
}

impl CompletePayload {
    pub fn new(image_data: impl Into<String>) -> Self {
        Self { image_data: image_data.into(), ..Self::default() }
    }
}

/// Terminal payload of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<String> for ErrorPayload {
    fn from(message: String) -> Self {
        Self { message, details: None }
    }
}

impl From<&str> for ErrorPayload {
    fn from(message: &str) -> Self {
        Self::from(message.to_string())
    }
}

impl From<ErrorInfo> for ErrorPayload {
    fn from(info: ErrorInfo) -> Self {
        Self { message: info.message, details: info.details }
    }
}

impl From<ErrorPayload> for ErrorInfo {
    fn from(payload: ErrorPayload) -> Self {
        Self { message: payload.message, details: payload.details }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Progress(ProgressUpdate),
    Complete(CompletePayload),
    Error(ErrorPayload),
    /// Channel closed. Never serialized.
    End,
}

impl WireEvent {
    /// The SSE `event:` name, or `None` for `End`.
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            Self::Progress(_) => Some("progress"),
            Self::Complete(_) => Some("complete"),
            Self::Error(_) => Some("error"),
            Self::End => None,
        }
    }

    /// The JSON `data:` body, or `None` for `End`.
    ///
    /// # Errors
    /// Returns `WireError::Payload` if serialization fails.
    pub fn data_json(&self) -> Result<Option<String>, WireError> {
        let result = match self {
            Self::Progress(update) => serde_json::to_string(update),
            Self::Complete(payload) => serde_json::to_string(payload),
            Self::Error(payload) => serde_json::to_string(payload),
            Self::End => return Ok(None),
        };
        result.map(Some).map_err(|source| WireError::Payload {
            event: self.event_name().unwrap_or_default().to_string(),
            source,
        })
    }

    /// Rebuilds a message from an SSE event name and data body.
    ///
    /// # Errors
    /// Fails for unknown event names or payloads that do not match the schema.
    pub fn from_sse(event: &str, data: &str) -> Result<Self, WireError> {
        let payload_err =
            |source: serde_json::Error| WireError::Payload { event: event.to_string(), source };
        match event {
            "progress" => serde_json::from_str(data).map(Self::Progress).map_err(payload_err),
            "complete" => serde_json::from_str(data).map(Self::Complete).map_err(payload_err),
            "error" => serde_json::from_str(data).map(Self::Error).map_err(payload_err),
            "end" => Ok(Self::End),
            other => Err(WireError::UnknownEvent(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_) | Self::End)
    }
}

/// Finds the first SSE block separator (`\n\n` or `\r\n\r\n`) at or after
/// `from`, returning its start and length.
///
/// Decoders pass the length they already searched; the search backs off
/// three bytes so a separator split across chunks is still found.
pub fn find_event_boundary(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    let start = from.saturating_sub(3);
    let tail = buffer.get(start..)?;
    tail.iter().enumerate().find_map(|(offset, &byte)| {
        if byte != b'\n' && byte != b'\r' {
            return None;
        }
        let rest = &tail[offset..];
        if rest.starts_with(b"\n\n") {
            Some((start + offset, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((start + offset, 4))
        } else {
            None
        }
    })
}
