use async_trait::async_trait;
use pipeflow_stream::{parse_sse_stream, SseStream};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{PipelineError, Result};

pub const EVENT_STREAM: &str = "text/event-stream";

/// An opened execution stream
pub struct Connection {
    pub status: u16,
    pub messages: SseStream,
}

/// Opens the SSE channel of one run
///
/// Implementations fail `open` for anything but a successful
/// `text/event-stream` response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, pipeline_id: &str, body: Value) -> Result<Connection>;
}

/// reqwest-backed [`Transport`]
pub struct HttpTransport {
    http_client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        if let Some(token) = config.auth_token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| PipelineError::Validation("Invalid auth token format".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, pipeline_id: &str, body: Value) -> Result<Connection> {
        let url = self.config.endpoint(pipeline_id);
        tracing::debug!(%url, "Opening execution stream");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Transport(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with(EVENT_STREAM) {
            return Err(PipelineError::ContentType(content_type));
        }

        Ok(Connection {
            status: status.as_u16(),
            messages: parse_sse_stream(response.bytes_stream()),
        })
    }
}
