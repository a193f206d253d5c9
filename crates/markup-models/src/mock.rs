//! Scripted provider for tests and offline development.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use markup_abstraction::{
    CallOptions, FunctionCall, ModelError, ModelProvider, ProviderReply, ReplyPart, ReplyStream,
};
use serde_json::{Map, Value};
use tracing::debug;

/// One scripted provider outcome.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A complete reply (streamed as a single chunk).
    Reply(ProviderReply),
    /// A reply delivered in several chunks.
    Chunks(Vec<ProviderReply>),
    /// Some chunks, then a mid-stream failure.
    ChunksThenError(Vec<ProviderReply>, ModelError),
    /// The call fails before any output.
    Error(ModelError),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Reply(reply(vec![ReplyPart::Text(text.into())]))
    }

    pub fn thinking_and_text(thinking: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Reply(reply(vec![ReplyPart::Thought(thinking.into()), ReplyPart::Text(text.into())]))
    }

    /// A reply carrying one function call with a single string argument.
    pub fn function_call(name: impl Into<String>, arg: &str, value: impl Into<String>) -> Self {
        let mut args = Map::new();
        args.insert(arg.to_string(), Value::String(value.into()));
        Self::Reply(reply(vec![ReplyPart::FunctionCall(FunctionCall { name: name.into(), args })]))
    }

    pub fn image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Reply(reply(vec![ReplyPart::InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        }]))
    }
}

/// Builds a reply from parts with an empty raw payload.
pub fn reply(parts: Vec<ReplyPart>) -> ProviderReply {
    ProviderReply { parts, ..ProviderReply::default() }
}

/// A provider that replays a fixed script and records every request.
#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<MockResponse>>,
    calls: Mutex<Vec<CallOptions>>,
}

impl MockProvider {
    pub fn new(script: impl IntoIterator<Item = MockResponse>) -> Self {
        Self { script: Mutex::new(script.into_iter().collect()), calls: Mutex::new(Vec::new()) }
    }

    /// Appends a response to the end of the script.
    pub fn push(&self, response: MockResponse) {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).push_back(response);
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<CallOptions> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn next(&self, options: &CallOptions) -> Result<MockResponse, ModelError> {
        debug!(
            model_id = %options.model,
            parts = options.parts.len(),
            "MockProvider received request"
        );
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(options.clone());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ModelError::Other("MockProvider script exhausted".to_string()))
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn generate(&self, options: &CallOptions) -> Result<ProviderReply, ModelError> {
        match self.next(options)? {
            MockResponse::Reply(reply) => Ok(reply),
            MockResponse::Chunks(chunks) => {
                Ok(reply(chunks.into_iter().flat_map(|chunk| chunk.parts).collect()))
            }
            MockResponse::ChunksThenError(_, err) | MockResponse::Error(err) => Err(err),
        }
    }

    async fn generate_stream(&self, options: &CallOptions) -> Result<ReplyStream, ModelError> {
        let items: Vec<Result<ProviderReply, ModelError>> = match self.next(options)? {
            MockResponse::Reply(reply) => vec![Ok(reply)],
            MockResponse::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            MockResponse::ChunksThenError(chunks, err) => {
                chunks.into_iter().map(Ok).chain(std::iter::once(Err(err))).collect()
            }
            MockResponse::Error(err) => return Err(err),
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}
