use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{FinalResponseEvent, NodeId, ToolCallChunk};
use crate::flow::{strip_typename, FlowData};

/// Body POSTed to the pipeline execution endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub flow_data: FlowData,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl ExecutionRequest {
    pub fn new(flow_data: FlowData, content: impl Into<String>) -> Self {
        Self {
            flow_data,
            content: content.into(),
            thread_id: None,
        }
    }

    pub fn with_thread_id(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// JSON body with every `__typename` removed
    pub fn to_body(&self) -> Result<Value, serde_json::Error> {
        let mut body = serde_json::to_value(self)?;
        strip_typename(&mut body);
        Ok(body)
    }
}

/// Result of a completed run as surfaced to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub status_code: u16,
    pub message: String,
    pub response: String,
    pub last_node_id: NodeId,
    /// Not aggregated at this layer; always empty
    pub tool_calls: Vec<ToolCallChunk>,
    /// Milliseconds from send to final response
    pub time_taken: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResponse {
    pub fn from_final(status_code: u16, event: FinalResponseEvent, time_taken: u64) -> Self {
        Self {
            status_code,
            message: "success".to_string(),
            response: event.content,
            last_node_id: event.last_node_id,
            tool_calls: Vec::new(),
            time_taken,
            thread_id: event.thread_id,
            error: None,
        }
    }
}
