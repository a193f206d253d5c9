//! Model Call Adapter.
//!
//! Wraps one provider interaction and discloses it through `ProgressEvent`s:
//! a `Request` before the call and exactly one terminal `Response` or `Error`
//! after it. The streaming variant takes its callback by value, so a caller
//! cannot stream without observing.

use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use markup_abstraction::{
    CallOptions, CallResult, FunctionCall, ModelError, ModelProvider, ProgressCallback,
    ProgressEvent, ProviderReply, ReplyPart, StreamSnapshot,
};
use tracing::{debug, warn};

/// Lazy sequence of cumulative snapshots produced by `ModelAdapter::call_stream`.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<StreamSnapshot, ModelError>> + Send>>;

/// Runs calls against a provider with mandatory progress disclosure.
#[derive(Clone)]
pub struct ModelAdapter {
    provider: Arc<dyn ModelProvider>,
}

impl ModelAdapter {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Single request/response call.
    ///
    /// # Errors
    /// Re-raises the provider failure after emitting `ProgressEvent::Error`.
    pub async fn call(
        &self,
        options: &CallOptions,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<CallResult, ModelError> {
        let emit = |event: ProgressEvent| {
            if let Some(callback) = progress {
                callback.on_progress(&event);
            }
        };

        emit(ProgressEvent::Request { prompt: options.prompt_text() });
        debug!(
            provider = self.provider.provider_name(),
            model_id = %options.model,
            label = options.label.as_deref().unwrap_or("-"),
            "Model call started"
        );

        match self.provider.generate(options).await {
            Ok(reply) => {
                let result = extract(&reply);
                debug!(
                    model_id = %options.model,
                    text_len = result.text.len(),
                    thinking_len = result.thinking.len(),
                    function_call = result.function_call.as_ref().map(|c| c.name.as_str()),
                    "Model call finished"
                );
                emit(ProgressEvent::Response {
                    thinking: result.thinking.clone(),
                    text: result.text.clone(),
                    function_call: result.function_call.clone(),
                });
                Ok(result)
            }
            Err(err) => {
                warn!(model_id = %options.model, error = %err, "Model call failed");
                emit(ProgressEvent::Error { error: err.clone() });
                Err(err)
            }
        }
    }

    /// Streaming call yielding cumulative snapshots.
    ///
    /// Every yielded snapshot with `done == false` is mirrored by a
    /// `Streaming` event. `Response` is emitted once after the provider stream
    /// ends, immediately before the single `done == true` snapshot. A failure
    /// emits `Error` and is yielded as the last item.
    pub fn call_stream(
        &self,
        options: CallOptions,
        progress: Arc<dyn ProgressCallback>,
    ) -> SnapshotStream {
        let provider = Arc::clone(&self.provider);
        Box::pin(async_stream::stream! {
            progress.on_progress(&ProgressEvent::Request { prompt: options.prompt_text() });
            debug!(
                provider = provider.provider_name(),
                model_id = %options.model,
                label = options.label.as_deref().unwrap_or("-"),
                "Streaming model call started"
            );

            let mut chunks = match provider.generate_stream(&options).await {
                Ok(chunks) => chunks,
                Err(err) => {
                    warn!(
                        model_id = %options.model,
                        error = %err,
                        "Streaming model call failed to start"
                    );
                    progress.on_progress(&ProgressEvent::Error { error: err.clone() });
                    yield Err(err);
                    return;
                }
            };

            let mut acc = ReplyAccumulator::default();
            let mut chunk_count = 0_usize;
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(reply) => {
                        chunk_count += 1;
                        if acc.absorb(&reply) {
                            let snapshot = acc.snapshot(false);
                            progress.on_progress(&ProgressEvent::Streaming {
                                thinking: snapshot.thinking.clone(),
                                text: snapshot.text.clone(),
                                function_call: snapshot.function_call.clone(),
                            });
                            yield Ok(snapshot);
                        }
                    }
                    Err(err) => {
                        warn!(
                            model_id = %options.model,
                            error = %err,
                            chunk_count,
                            "Streaming model call failed"
                        );
                        progress.on_progress(&ProgressEvent::Error { error: err.clone() });
                        yield Err(err);
                        return;
                    }
                }
            }

            acc.finish();
            debug!(
                model_id = %options.model,
                chunk_count,
                text_len = acc.text.len(),
                thinking_len = acc.thinking.len(),
                "Streaming model call finished"
            );
            let snapshot = acc.snapshot(true);
            progress.on_progress(&ProgressEvent::Response {
                thinking: snapshot.thinking.clone(),
                text: snapshot.text.clone(),
                function_call: snapshot.function_call.clone(),
            });
            yield Ok(snapshot);
        })
    }
}

/// Normalizes a complete provider reply.
pub fn extract(reply: &ProviderReply) -> CallResult {
    let mut acc = ReplyAccumulator::default();
    acc.absorb(reply);
    acc.finish();
    CallResult {
        raw: reply.raw.clone(),
        text: acc.text,
        thinking: acc.thinking,
        function_call: acc.function_call,
    }
}

/// Running totals across reply chunks.
#[derive(Debug, Default)]
struct ReplyAccumulator {
    text: String,
    thinking: String,
    function_call: Option<FunctionCall>,
    convenience_text: Option<String>,
}

impl ReplyAccumulator {
    /// Folds one chunk in. Returns whether anything observable changed.
    fn absorb(&mut self, reply: &ProviderReply) -> bool {
        let mut changed = false;
        for part in &reply.parts {
            match part {
                ReplyPart::Thought(text) if !text.is_empty() => {
                    self.thinking.push_str(text);
                    changed = true;
                }
                ReplyPart::Text(text) if !text.is_empty() => {
                    self.text.push_str(text);
                    changed = true;
                }
                ReplyPart::FunctionCall(call) => {
                    self.function_call = Some(call.clone());
                    changed = true;
                }
                _ => {}
            }
        }
        if let Some(text) = reply.text.as_ref().filter(|t| !t.is_empty()) {
            self.convenience_text.get_or_insert_with(String::new).push_str(text);
        }
        changed
    }

    /// Applies the convenience-text fallback.
    fn finish(&mut self) {
        if self.text.is_empty() {
            if let Some(text) = self.convenience_text.take() {
                self.text = text;
            }
        }
    }

    fn snapshot(&self, done: bool) -> StreamSnapshot {
        StreamSnapshot {
            text: self.text.clone(),
            thinking: self.thinking.clone(),
            function_call: self.function_call.clone(),
            done,
        }
    }
}
