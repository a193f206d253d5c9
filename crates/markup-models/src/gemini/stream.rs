// SSE stream parser for Gemini `streamGenerateContent?alt=sse`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use markup_abstraction::{ModelError, ProviderReply, find_event_boundary};
use serde_json::Value;
use tracing::debug;

use super::parse_reply;

type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

/// Yields one `ProviderReply` per SSE `data:` event. Chunks are not
/// accumulated here.
pub struct GeminiSseStream {
    stream: ByteStream,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for an event boundary.
    scanned: usize,
    pending: VecDeque<Result<ProviderReply, ModelError>>,
    done: bool,
}

impl GeminiSseStream {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self::from_bytes_stream(Box::pin(response.bytes_stream()))
    }

    pub(crate) fn from_bytes_stream(stream: ByteStream) -> Self {
        Self { stream, buffer: Vec::new(), scanned: 0, pending: VecDeque::new(), done: false }
    }

    /// Moves every complete event out of the buffer.
    fn drain_events(&mut self, flush: bool) {
        while let Some((end_idx, sep_len)) = find_event_boundary(&self.buffer, self.scanned) {
            let event: Vec<u8> = self.buffer.drain(..end_idx + sep_len).take(end_idx).collect();
            self.scanned = 0;
            self.handle_event(&event);
            if self.done {
                return;
            }
        }
        self.scanned = self.buffer.len();
        if flush && !self.buffer.is_empty() {
            let event = std::mem::take(&mut self.buffer);
            self.scanned = 0;
            self.handle_event(&event);
        }
    }

    fn handle_event(&mut self, event: &[u8]) {
        let event = match std::str::from_utf8(event) {
            Ok(event) => event,
            Err(e) => {
                self.pending.push_back(Err(ModelError::SerializationError(format!(
                    "Failed to decode SSE chunk: {}",
                    e
                ))));
                return;
            }
        };

        let data = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|line| line.strip_prefix(' ').unwrap_or(line))
            .collect::<Vec<_>>()
            .join("\n");

        if data.trim() == "[DONE]" {
            self.done = true;
            return;
        }
        if data.trim().is_empty() {
            return;
        }

        match serde_json::from_str::<Value>(&data) {
            Ok(value) => self.pending.push_back(parse_reply(value)),
            Err(e) => {
                // Some gateways interleave non-JSON keep-alive payloads.
                debug!(error = %e, "Skipping malformed SSE chunk");
            }
        }
    }
}

impl Stream for GeminiSseStream {
    type Item = Result<ProviderReply, ModelError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.drain_events(false);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    let err = ModelError::RequestError(format!("Stream error: {}", e));
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    self.drain_events(true);
                    self.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use markup_abstraction::ReplyPart;

    fn stream_of(chunks: &[&str]) -> GeminiSseStream {
        let items: Vec<Result<bytes::Bytes, reqwest::Error>> =
            chunks.iter().map(|c| Ok(bytes::Bytes::copy_from_slice(c.as_bytes()))).collect();
        GeminiSseStream::from_bytes_stream(Box::pin(futures::stream::iter(items)))
    }

    /// A reply body holding one candidate part.
    fn reply_json(part: &str) -> String {
        format!(r#"{{"candidates":[{{"content":{{"parts":[{part}]}}}}]}}"#)
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let body = format!(
            "data: {}\n\ndata: {}\n\n",
            reply_json(r#"{"text":"Hello"}"#),
            reply_json(r#"{"text":" world"}"#)
        );
        let (head, tail) = body.split_at(body.find("Hel").unwrap() + 3);
        let replies: Vec<_> = stream_of(&[head, tail]).map(Result::unwrap).collect().await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].parts, vec![ReplyPart::Text("Hello".to_string())]);
        assert_eq!(replies[1].parts, vec![ReplyPart::Text(" world".to_string())]);
    }

    #[tokio::test]
    async fn test_crlf_separators_and_trailing_event() {
        let first = format!("data: {}\r\n\r\n", reply_json(r#"{"text":"a","thought":true}"#));
        let trailing = format!("data: {}", reply_json(r#"{"text":"b"}"#));
        let replies: Vec<_> = stream_of(&[&first, &trailing]).map(Result::unwrap).collect().await;
        assert_eq!(replies[0].parts, vec![ReplyPart::Thought("a".to_string())]);
        assert_eq!(replies[1].parts, vec![ReplyPart::Text("b".to_string())]);
    }

    #[tokio::test]
    async fn test_done_marker_stops_stream() {
        let first = format!("data: {}\n\ndata: [DONE]\n\n", reply_json(r#"{"text":"x"}"#));
        let ignored = format!("data: {}\n\n", reply_json(r#"{"text":"ignored"}"#));
        let replies: Vec<_> = stream_of(&[&first, &ignored]).collect().await;
        assert_eq!(replies.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_skipped() {
        let ok = format!("data: {}\n\n", reply_json(r#"{"text":"ok"}"#));
        let stream = stream_of(&["data: not json\n\n", ": keep-alive\n\n", &ok]);
        let replies: Vec<_> = stream.map(Result::unwrap).collect().await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parts, vec![ReplyPart::Text("ok".to_string())]);
    }

    #[tokio::test]
    async fn test_error_payload_mid_stream() {
        let first = format!("data: {}\n\n", reply_json(r#"{"text":"x"}"#));
        let stream = stream_of(&[&first, "data: {\"error\":{\"message\":\"overloaded\"}}\n\n"]);
        let replies: Vec<_> = stream.collect().await;
        assert!(replies[0].is_ok());
        assert_eq!(
            replies[1].as_ref().unwrap_err(),
            &ModelError::ModelResponseError("Provider error: overloaded".to_string())
        );
    }

    #[tokio::test]
    async fn test_large_event_in_small_chunks() {
        let text = "x".repeat(1024 * 1024);
        let body = format!("data: {}\r\n\r\n", reply_json(&format!(r#"{{"text":"{text}"}}"#)));
        let chunks: Vec<&str> =
            body.as_bytes().chunks(512).map(|c| std::str::from_utf8(c).unwrap()).collect();
        let replies: Vec<_> = stream_of(&chunks).map(Result::unwrap).collect().await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parts, vec![ReplyPart::Text(text)]);
    }
}
