//! Streaming protocol emitter.
//!
//! Every streaming endpoint pushes its operation through a
//! [`ProgressChannel`]: one opening `progress` message, any number of updates,
//! then exactly one `complete` or `error` before the channel closes.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use markup_abstraction::{
    CompletePayload, ErrorPayload, IterationInfo, ProgressReporter, ProgressUpdate, Step, WireEvent,
};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// What a successful operation hands to [`ProgressChannel::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Message of the final `complete` progress update.
    pub message: String,
    pub iteration: Option<IterationInfo>,
    pub payload: CompletePayload,
}

impl Completion {
    pub fn new(message: impl Into<String>, payload: CompletePayload) -> Self {
        Self { message: message.into(), iteration: None, payload }
    }

    #[must_use]
    pub fn with_iteration(mut self, iteration: IterationInfo) -> Self {
        self.iteration = Some(iteration);
        self
    }
}

/// Sending half of one operation's channel.
///
/// Cloning shares the channel. Once `complete` or `error` has been emitted
/// every further send is dropped.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<WireEvent>>>>,
}

impl ProgressChannel {
    /// Opens a channel, returning the sender and the receiving half.
    pub fn open() -> (Self, mpsc::UnboundedReceiver<WireEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Arc::new(Mutex::new(Some(tx))) }, rx)
    }

    /// Whether `complete` or `error` has already closed the channel.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    fn send(&self, event: WireEvent) {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                // A dropped receiver means the observer went away; keep going.
                if tx.send(event).is_err() {
                    trace!("Progress receiver dropped");
                }
            }
            None => debug!(event = ?event.event_name(), "Dropping message sent after close"),
        }
    }

    fn close(&self) {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Emits the opening update. Always opens a new log entry.
    pub fn start(&self, initial: ProgressUpdate) {
        self.send(WireEvent::Progress(initial.as_new_entry()));
    }

    /// Emits a progress update as given.
    pub fn update(&self, patch: ProgressUpdate) {
        self.send(WireEvent::Progress(patch));
    }

    /// Emits the final `complete` progress update and the result, then closes.
    pub fn complete(&self, completion: Completion) {
        let mut update = ProgressUpdate::new(Step::Complete, completion.message);
        update.iteration = completion.iteration;
        self.send(WireEvent::Progress(update));
        self.send(WireEvent::Complete(completion.payload));
        self.close();
    }

    /// Emits an error payload, then closes.
    pub fn error(&self, err: impl Into<ErrorPayload>) {
        let payload = err.into();
        error!(message = %payload.message, "Operation failed");
        self.send(WireEvent::Error(payload));
        self.close();
    }

    /// Runs `operation` to completion on this channel.
    ///
    /// `start` is emitted first; the operation receives a reporter bound to
    /// the channel. A returned error or a panic becomes an `error` message and
    /// `complete` is never emitted afterwards.
    pub async fn run<F, Fut, E>(self, initial: ProgressUpdate, operation: F)
    where
        F: FnOnce(Arc<dyn ProgressReporter>) -> Fut,
        Fut: Future<Output = Result<Completion, E>>,
        E: Into<ErrorPayload>,
    {
        self.start(initial);
        let reporter: Arc<dyn ProgressReporter> = Arc::new(self.clone());
        match AssertUnwindSafe(operation(reporter)).catch_unwind().await {
            Ok(Ok(completion)) if !self.is_closed() => self.complete(completion),
            Ok(Ok(_)) => debug!("Operation finished after its channel closed"),
            Ok(Err(err)) => self.error(err),
            Err(panic) => self.error(panic_message(panic.as_ref())),
        }
    }
}

impl ProgressReporter for ProgressChannel {
    fn report(&self, update: ProgressUpdate) {
        self.update(update);
    }
}

/// Panic payloads are passed through as-is when they are strings.
fn panic_message(panic: &(dyn Any + Send)) -> ErrorPayload {
    if let Some(message) = panic.downcast_ref::<&str>() {
        ErrorPayload::from(*message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        ErrorPayload::from(message.clone())
    } else {
        ErrorPayload { message: "Operation panicked".to_string(), details: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drain(rx: &mut mpsc::UnboundedReceiver<WireEvent>) -> Vec<WireEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn names(events: &[WireEvent]) -> Vec<&'static str> {
        events.iter().filter_map(WireEvent::event_name).collect()
    }

    #[tokio::test]
    async fn test_run_success_order() {
        let (channel, mut rx) = ProgressChannel::open();
        channel
            .run(ProgressUpdate::new(Step::Planning, "start"), |reporter| async move {
                reporter.report(ProgressUpdate::new(Step::Processing, "working"));
                let payload = CompletePayload::new("data:x");
                Ok::<_, ErrorPayload>(Completion::new("Edit completed successfully!", payload))
            })
            .await;

        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["progress", "progress", "progress", "complete"]);
        let WireEvent::Progress(first) = &events[0] else { panic!("expected progress") };
        assert!(first.new_log_entry);
        let WireEvent::Progress(second) = &events[1] else { panic!("expected progress") };
        assert!(!second.new_log_entry);
        let WireEvent::Progress(last) = &events[2] else { panic!("expected progress") };
        assert_eq!(last.step, Step::Complete);
        assert_eq!(last.message.as_deref(), Some("Edit completed successfully!"));
        // Closed: the receiver sees end of stream.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_error_never_completes() {
        let (channel, mut rx) = ProgressChannel::open();
        channel
            .run(ProgressUpdate::new(Step::Planning, "start"), |_| async move {
                Err::<Completion, _>("Generation failed")
            })
            .await;

        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["progress", "error"]);
        assert_eq!(events[1], WireEvent::Error(ErrorPayload::from("Generation failed")));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_panic_message_passes_through() {
        let (channel, mut rx) = ProgressChannel::open();
        channel
            .run(ProgressUpdate::new(Step::Planning, "start"), |_| async move {
                if true {
                    panic!("something odd");
                }
                Ok::<Completion, ErrorPayload>(Completion::new("done", CompletePayload::default()))
            })
            .await;

        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&WireEvent::Error(ErrorPayload::from("something odd"))));
    }

    #[tokio::test]
    async fn test_nothing_sent_after_error() {
        let (channel, mut rx) = ProgressChannel::open();
        channel.error(ErrorPayload {
            message: "bad".to_string(),
            details: Some("trace".to_string()),
        });
        channel.update(ProgressUpdate::new(Step::Processing, "late"));
        channel.complete(Completion::new("done", CompletePayload::default()));

        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["error"]);
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_operation_closing_its_own_channel() {
        let (channel, mut rx) = ProgressChannel::open();
        let inner = channel.clone();
        channel
            .run(ProgressUpdate::new(Step::Planning, "start"), move |_| async move {
                inner.error("reported inside");
                Ok::<_, ErrorPayload>(Completion::new("done", CompletePayload::default()))
            })
            .await;

        assert_eq!(names(&drain(&mut rx)), vec!["progress", "error"]);
    }

    #[tokio::test]
    async fn test_complete_carries_iteration() {
        let (channel, mut rx) = ProgressChannel::open();
        channel.complete(
            Completion::new("Inpaint completed successfully!", CompletePayload::new("data:y"))
                .with_iteration(IterationInfo::new(2, 3)),
        );
        let events = drain(&mut rx);
        let WireEvent::Progress(update) = &events[0] else { panic!("expected progress") };
        assert_eq!(update.iteration, Some(IterationInfo::new(2, 3)));
        assert_eq!(events[1], WireEvent::Complete(CompletePayload::new("data:y")));
    }
}
