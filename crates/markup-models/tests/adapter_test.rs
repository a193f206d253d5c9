//! Model Call Adapter behavior against the scripted provider.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use markup_abstraction::{CallOptions, ModelError, ProgressCallback, ProgressEvent, ReplyPart};
use markup_models::mock::reply;
use markup_models::{ModelAdapter, MockProvider, MockResponse};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressCallback for Recorder {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl Recorder {
    fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                ProgressEvent::Request { .. } => "request",
                ProgressEvent::Streaming { .. } => "streaming",
                ProgressEvent::Response { .. } => "response",
                ProgressEvent::Error { .. } => "error",
            })
            .collect()
    }
}

fn adapter(script: Vec<MockResponse>) -> (ModelAdapter, Arc<MockProvider>) {
    let provider = Arc::new(MockProvider::new(script));
    (ModelAdapter::new(provider.clone()), provider)
}

#[tokio::test]
async fn test_call_emits_request_then_response() {
    let (adapter, provider) = adapter(vec![MockResponse::thinking_and_text("hmm", "done")]);
    let recorder = Recorder::default();
    let options = CallOptions::new("m").with_text("hello");

    let result = adapter.call(&options, Some(&recorder)).await.unwrap();

    assert_eq!(result.text, "done");
    assert_eq!(result.thinking, "hmm");
    assert_eq!(recorder.kinds(), vec!["request", "response"]);
    assert_eq!(
        recorder.events.lock().unwrap()[0],
        ProgressEvent::Request { prompt: "hello".to_string() }
    );
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_call_without_callback() {
    let (adapter, _) = adapter(vec![MockResponse::text("ok")]);
    let result = adapter.call(&CallOptions::new("m").with_text("x"), None).await.unwrap();
    assert_eq!(result.text, "ok");
}

#[tokio::test]
async fn test_call_failure_emits_error_and_reraises() {
    let failure = ModelError::RequestError("Network error: refused".to_string());
    let (adapter, _) = adapter(vec![MockResponse::Error(failure.clone())]);
    let recorder = Recorder::default();

    let options = CallOptions::new("m").with_text("x");
    let err = adapter.call(&options, Some(&recorder)).await.unwrap_err();

    assert_eq!(err, failure);
    assert_eq!(recorder.kinds(), vec!["request", "error"]);
}

#[tokio::test]
async fn test_stream_snapshots_are_cumulative() {
    let (adapter, _) = adapter(vec![MockResponse::Chunks(vec![
        reply(vec![ReplyPart::Thought("Let me ".to_string())]),
        reply(vec![ReplyPart::Thought("think".to_string())]),
        reply(vec![]),
        reply(vec![ReplyPart::Text("Answer".to_string())]),
        reply(vec![ReplyPart::Text("!".to_string())]),
    ])]);
    let recorder = Arc::new(Recorder::default());

    let snapshots: Vec<_> = adapter
        .call_stream(CallOptions::new("m").with_text("x"), recorder.clone())
        .map(Result::unwrap)
        .collect()
        .await;

    for pair in snapshots.windows(2) {
        assert!(pair[1].text.starts_with(&pair[0].text));
        assert!(pair[1].thinking.starts_with(&pair[0].thinking));
    }
    assert_eq!(snapshots.iter().filter(|s| s.done).count(), 1);
    let last = snapshots.last().unwrap();
    assert!(last.done);
    assert_eq!(last.thinking, "Let me think");
    assert_eq!(last.text, "Answer!");

    // The empty chunk produces no snapshot.
    assert_eq!(snapshots.len(), 5);
    assert_eq!(
        recorder.kinds(),
        vec!["request", "streaming", "streaming", "streaming", "streaming", "response"]
    );
}

#[tokio::test]
async fn test_stream_response_precedes_final_snapshot() {
    let (adapter, _) = adapter(vec![MockResponse::text("hi")]);
    let recorder = Arc::new(Recorder::default());
    let mut stream = adapter.call_stream(CallOptions::new("m").with_text("x"), recorder.clone());

    let first = stream.next().await.unwrap().unwrap();
    assert!(!first.done);
    assert_eq!(recorder.kinds(), vec!["request", "streaming"]);

    let last = stream.next().await.unwrap().unwrap();
    assert!(last.done);
    assert_eq!(recorder.kinds(), vec!["request", "streaming", "response"]);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_is_lazy() {
    let (adapter, provider) = adapter(vec![MockResponse::text("hi")]);
    let recorder = Arc::new(Recorder::default());
    let stream = adapter.call_stream(CallOptions::new("m").with_text("x"), recorder.clone());

    assert_eq!(provider.call_count(), 0);
    assert!(recorder.kinds().is_empty());
    drop(stream);
}

#[tokio::test]
async fn test_stream_mid_failure_stops_with_error() {
    let failure = ModelError::RequestError("Stream error: reset".to_string());
    let (adapter, _) = adapter(vec![MockResponse::ChunksThenError(
        vec![reply(vec![ReplyPart::Thought("partial".to_string())])],
        failure.clone(),
    )]);
    let recorder = Arc::new(Recorder::default());

    let options = CallOptions::new("m").with_text("x");
    let items: Vec<_> = adapter.call_stream(options, recorder.clone()).collect().await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert_eq!(items[1].as_ref().unwrap_err(), &failure);
    assert_eq!(recorder.kinds(), vec!["request", "streaming", "error"]);
}

#[tokio::test]
async fn test_stream_start_failure() {
    let failure = ModelError::Authentication("(401): bad key".to_string());
    let (adapter, _) = adapter(vec![MockResponse::Error(failure.clone())]);
    let recorder = Arc::new(Recorder::default());

    let options = CallOptions::new("m").with_text("x");
    let items: Vec<_> = adapter.call_stream(options, recorder.clone()).collect().await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_ref().unwrap_err(), &failure);
    assert_eq!(recorder.kinds(), vec!["request", "error"]);
}

#[tokio::test]
async fn test_stream_keeps_last_function_call() {
    let (adapter, _) = adapter(vec![MockResponse::Chunks(vec![
        match MockResponse::function_call("image_painter", "prompt", "first") {
            MockResponse::Reply(r) => r,
            _ => unreachable!(),
        },
        match MockResponse::function_call("image_painter", "prompt", "second") {
            MockResponse::Reply(r) => r,
            _ => unreachable!(),
        },
    ])]);
    let recorder = Arc::new(Recorder::default());
    let snapshots: Vec<_> =
        adapter.call_stream(CallOptions::new("m"), recorder).map(Result::unwrap).collect().await;

    let call = snapshots.last().unwrap().function_call.clone().unwrap();
    assert_eq!(call.string_arg("prompt"), Some("second"));
}
