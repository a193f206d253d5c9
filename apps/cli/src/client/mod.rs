//! HTTP client for the markup server.

pub mod files;
pub mod sse;

pub use sse::SseDecoder;

use futures::StreamExt;
use markup_abstraction::{WireError, WireEvent};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Server used when neither `--server` nor `MARKUP_SERVER` is given.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server returned {status}: {detail}")]
    Server { status: StatusCode, detail: String },

    #[error("Invalid event stream: {0}")]
    Stream(#[from] WireError),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: String,
    pub timestamp: String,
    pub uptime_seconds: f64,
    pub environment: String,
    pub version: String,
}

/// Reply of `POST /api/images/generate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub image_data: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MarkupClient {
    http: reqwest::Client,
    base_url: String,
}

impl MarkupClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http: reqwest::Client::new(), base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<Health> {
        let response = self.http.get(self.url("/health")).send().await?;
        decode_json(response).await
    }

    pub async fn generate_image(&self, body: &Value) -> Result<GeneratedImage> {
        let response = self.http.post(self.url("/api/images/generate")).json(body).send().await?;
        decode_json(response).await
    }

    /// Posts `body` to a streaming endpoint and hands every decoded message
    /// to `on_event`.
    ///
    /// Once the server has accepted the request, [`WireEvent::End`] is always
    /// the last message delivered, even when the body breaks off or carries
    /// a malformed event; that failure is then returned.
    pub async fn stream<F>(&self, path: &str, body: &Value, mut on_event: F) -> Result<()>
    where
        F: FnMut(WireEvent),
    {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        let response = check_status(response).await?;

        let mut decoder = SseDecoder::new();
        let mut chunks = response.bytes_stream();
        let outcome = loop {
            let decoded = match chunks.next().await {
                Some(Ok(chunk)) => {
                    debug!(bytes = chunk.len(), "SSE chunk");
                    decoder.push(&chunk);
                    drain_events(&mut decoder, &mut on_event)
                }
                Some(Err(err)) => break Err(ClientError::from(err)),
                None => {
                    break drain_events(&mut decoder, &mut on_event).and_then(|()| {
                        let last = decoder.finish()?;
                        last.into_iter().for_each(&mut on_event);
                        Ok(())
                    });
                }
            };
            if let Err(err) = decoded {
                break Err(err);
            }
        };
        if let Err(err) = &outcome {
            warn!(error = %err, "Event stream ended abnormally");
        }
        on_event(WireEvent::End);
        outcome
    }
}

fn drain_events<F: FnMut(WireEvent)>(decoder: &mut SseDecoder, on_event: &mut F) -> Result<()> {
    while let Some(event) = decoder.next_event()? {
        on_event(event);
    }
    Ok(())
}

/// Turns a non-success response into [`ClientError::Server`], using the
/// `detail` field of the JSON body when present.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| body.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text);
    Err(ClientError::Server { status, detail })
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_server_detail_surfaces_in_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/images/generate")
            .with_status(400)
            .with_body(r#"{"detail":"Invalid prompt: is required"}"#)
            .create_async()
            .await;

        let client = MarkupClient::new(server.url());
        let err = client.generate_image(&json!({})).await.unwrap_err();
        mock.assert_async().await;
        assert_eq!(err.to_string(), "Server returned 400 Bad Request: Invalid prompt: is required");
    }

    #[tokio::test]
    async fn test_stream_decodes_events_and_ends() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "event: progress\n",
            "data: {\"step\":\"planning\",\"message\":\"Planning\",\"newLogEntry\":true}\n\n",
            ":keepalive\n\n",
            "event: complete\n",
            "data: {\"imageData\":\"data:image/png;base64,AA==\",\"iterations\":1}\n\n",
        );
        server
            .mock("POST", "/api/agentic/edit")
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let client = MarkupClient::new(format!("{}/", server.url()));
        let mut names = Vec::new();
        client
            .stream("/api/agentic/edit", &json!({"prompt": "x"}), |event| {
                names.push(event.event_name().unwrap_or("end"));
            })
            .await
            .unwrap();
        assert_eq!(names, vec!["progress", "complete", "end"]);
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_body(concat!(
                r#"{"status":"healthy","timestamp":"t","uptimeSeconds":1.5,"#,
                r#""environment":"development","version":"0.4.0"}"#,
            ))
            .create_async()
            .await;

        let health = MarkupClient::new(server.url()).health().await.unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.uptime_seconds, 1.5);
    }

    /// Serves one response that promises more body than it sends, then
    /// closes the connection.
    async fn serve_truncated(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut request).await;
            let head = concat!(
                "HTTP/1.1 200 OK\r\n",
                "content-type: text/event-stream\r\n",
                "content-length: 100000\r\n\r\n",
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_broken_connection_still_ends_stream() {
        let url = serve_truncated(
            "event: progress\ndata: {\"step\":\"calling_api\",\"message\":\"Generating\"}\n\n",
        )
        .await;

        let mut events = Vec::new();
        let result = MarkupClient::new(url)
            .stream("/api/agentic/edit", &json!({}), |event| events.push(event))
            .await;

        assert!(matches!(result, Err(ClientError::Request(_))));
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            WireEvent::Progress(update) if update.message.as_deref() == Some("Generating")
        ));
        assert_eq!(events[1], WireEvent::End);
    }

    #[tokio::test]
    async fn test_malformed_event_still_ends_stream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/agentic/edit")
            .with_header("content-type", "text/event-stream")
            .with_body(concat!(
                "event: progress\ndata: {\"step\":\"planning\",\"message\":\"Planning\"}\n\n",
                "event: complete\ndata: {oops\n\n",
                "event: complete\ndata: {\"imageData\":\"never\"}\n\n",
            ))
            .create_async()
            .await;

        let mut names = Vec::new();
        let result = MarkupClient::new(server.url())
            .stream("/api/agentic/edit", &json!({}), |event| {
                names.push(event.event_name().unwrap_or("end"));
            })
            .await;

        assert!(matches!(result, Err(ClientError::Stream(_))));
        assert_eq!(names, vec!["progress", "end"]);
    }
}
