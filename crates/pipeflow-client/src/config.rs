use pipeflow_stream::ToolCallMerge;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of one [`crate::ConnectionController`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root of the execution API, e.g. `https://api.example.com/v1`
    pub base_url: String,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    /// Sent as `Authorization: Bearer <token>`; never serialized back out
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
    /// Maximum silence between two wire messages before the run fails
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Abort once this many malformed messages were skipped
    #[serde(default)]
    pub max_parse_errors: Option<usize>,
    #[serde(default)]
    pub tool_call_merge: ToolCallMerge,
}

fn default_batch_window_ms() -> u64 {
    50
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            pipeline_id: None,
            auth_token: None,
            batch_window_ms: default_batch_window_ms(),
            idle_timeout_ms: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            max_parse_errors: None,
            tool_call_merge: ToolCallMerge::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_pipeline_id(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window_ms = window.as_millis() as u64;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_max_parse_errors(mut self, max: usize) -> Self {
        self.max_parse_errors = Some(max);
        self
    }

    pub fn with_tool_call_merge(mut self, merge: ToolCallMerge) -> Self {
        self.tool_call_merge = merge;
        self
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Execution endpoint of a pipeline
    pub fn endpoint(&self, pipeline_id: &str) -> String {
        format!(
            "{}/pipelines/{}/execute",
            self.base_url.trim_end_matches('/'),
            pipeline_id
        )
    }
}
