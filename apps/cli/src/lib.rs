//! Client for the image markup server.
//!
//! [`state::ProgressState`] is the log aggregator: a pure reducer over the
//! server's wire messages. [`client::MarkupClient`] posts requests and decodes
//! the event stream, and [`render`] turns log entries into terminal output.

pub mod client;
pub mod render;
pub mod state;

pub use client::{ClientError, MarkupClient};
pub use state::{Change, LogEntry, ProgressState, ThinkingStatus, merge_logs};
