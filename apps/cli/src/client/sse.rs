//! Incremental decoder for the server's `text/event-stream` responses.

use markup_abstraction::{WireError, WireEvent, find_event_boundary};
use tracing::{debug, warn};

/// Buffers raw bytes and yields one [`WireEvent`] per complete SSE block.
///
/// Comment lines (keep-alives) and blocks without an `event:` name are
/// skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a block separator.
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of the response body.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Decodes the next complete event, or `None` until more bytes arrive.
    pub fn next_event(&mut self) -> Result<Option<WireEvent>, WireError> {
        while let Some((end, separator)) = find_event_boundary(&self.buffer, self.scanned) {
            let block: Vec<u8> = self.buffer.drain(..end + separator).take(end).collect();
            self.scanned = 0;
            if let Some(event) = decode_block(&block)? {
                return Ok(Some(event));
            }
        }
        self.scanned = self.buffer.len();
        Ok(None)
    }

    /// Decodes whatever remains once the body has ended.
    pub fn finish(&mut self) -> Result<Option<WireEvent>, WireError> {
        if let Some(event) = self.next_event()? {
            return Ok(Some(event));
        }
        self.scanned = 0;
        let block = std::mem::take(&mut self.buffer);
        decode_block(&block)
    }
}

fn decode_block(block: &[u8]) -> Result<Option<WireEvent>, WireError> {
    let text = String::from_utf8_lossy(block);
    let mut name = None;
    let mut data: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            name = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    let Some(name) = name else {
        if !data.is_empty() {
            debug!("Skipping SSE block without an event name");
        }
        return Ok(None);
    };
    match WireEvent::from_sse(name, &data.join("\n")) {
        Ok(event) => Ok(Some(event)),
        Err(WireError::UnknownEvent(other)) => {
            warn!(event = %other, "Ignoring unknown SSE event");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markup_abstraction::{ProgressUpdate, Step};
    use pretty_assertions::assert_eq;

    fn drain(decoder: &mut SseDecoder) -> Vec<WireEvent> {
        std::iter::from_fn(|| decoder.next_event().unwrap()).collect()
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"event: progress\ndata: {\"step\":\"plan");
        assert_eq!(decoder.next_event().unwrap(), None);
        decoder.push(b"ning\",\"message\":\"Planning\"}\n");
        assert_eq!(decoder.next_event().unwrap(), None);
        decoder.push(b"\n");
        assert_eq!(
            drain(&mut decoder),
            vec![WireEvent::Progress(ProgressUpdate::new(Step::Planning, "Planning"))]
        );
    }

    #[test]
    fn test_keepalive_comments_skipped() {
        let mut decoder = SseDecoder::new();
        decoder.push(b":keepalive\n\nevent: complete\r\ndata: {\"imageData\":\"x\"}\r\n\r\n");
        let events = drain(&mut decoder);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], WireEvent::Complete(payload) if payload.image_data == "x"));
    }

    #[test]
    fn test_trailing_block_on_finish() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"event: error\ndata: {\"message\":\"boom\"}");
        assert_eq!(decoder.next_event().unwrap(), None);
        let event = decoder.finish().unwrap();
        assert!(matches!(event, Some(WireEvent::Error(payload)) if payload.message == "boom"));
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn test_unknown_event_ignored_but_bad_payload_fails() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"event: ping\ndata: {}\n\nevent: progress\ndata: not json\n\n");
        assert!(decoder.next_event().is_err());
    }

    #[test]
    fn test_events_before_bad_payload_are_kept() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"event: error\ndata: {\"message\":\"a\"}\n\nevent: complete\ndata: nope\n\n");
        assert!(matches!(decoder.next_event().unwrap(), Some(WireEvent::Error(_))));
        assert!(decoder.next_event().is_err());
    }

    #[test]
    fn test_large_event_in_small_chunks() {
        let image = format!("data:image/png;base64,{}", "A".repeat(2 * 1024 * 1024));
        let body = format!("event: complete\ndata: {{\"imageData\":\"{image}\"}}\n\n");
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in body.as_bytes().chunks(1024) {
            decoder.push(chunk);
            events.extend(drain(&mut decoder));
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], WireEvent::Complete(payload) if payload.image_data == image));
        assert_eq!(decoder.scanned, 0);
        assert!(decoder.buffer.is_empty());
    }
}
