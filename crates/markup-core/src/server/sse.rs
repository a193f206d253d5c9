//! Server-Sent Events transport for a [`ProgressChannel`](crate::emitter::ProgressChannel).

use std::convert::Infallible;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::http::header::CACHE_CONTROL;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use markup_abstraction::WireEvent;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, trace};

/// Interval between keep-alive comments.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Encodes one wire message, or `None` for `End` and unserializable payloads.
pub fn encode(event: &WireEvent) -> Option<Event> {
    let name = event.event_name()?;
    match event.data_json() {
        Ok(Some(data)) => {
            trace!(event = name, bytes = data.len(), "SSE event");
            Some(Event::default().event(name).data(data))
        }
        Ok(None) => None,
        Err(err) => {
            error!(event = name, error = %err, "Failed to serialize SSE event; dropping");
            None
        }
    }
}

/// Streams the channel's messages until it closes.
pub fn stream_response(rx: UnboundedReceiver<WireEvent>) -> Response {
    let stream = UnboundedReceiverStream::new(rx)
        .filter_map(|event| encode(&event))
        .map(Ok::<_, Infallible>);

    let keep_alive = KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("keepalive");
    let mut response = Sse::new(stream).keep_alive(keep_alive).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
