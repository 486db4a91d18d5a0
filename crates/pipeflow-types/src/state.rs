use serde::{Deserialize, Serialize};

use crate::events::{Metadata, NodeId, TokenEvent, ToolCallChunk};

/// Accumulated output of one contiguous stretch of tokens from a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub node: NodeId,
    pub content: String,
    pub tool_call: Vec<ToolCallChunk>,
    pub metadata: Metadata,
}

impl From<TokenEvent> for TranscriptEntry {
    fn from(event: TokenEvent) -> Self {
        Self {
            node: event.node,
            content: event.content,
            tool_call: event.tool_call,
            metadata: event.metadata,
        }
    }
}

/// State of the run currently in flight
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub transcript: Vec<TranscriptEntry>,
    pub active_node_id: Option<NodeId>,
    /// Survives [`RunState::reset`]; set by the first successful run
    pub thread_id: Option<String>,
    pub events_seen: usize,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread_id(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    /// Discard the run's output, keeping the conversation thread
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.active_node_id = None;
        self.events_seen = 0;
    }

    pub fn last_entry(&self) -> Option<&TranscriptEntry> {
        self.transcript.last()
    }

    /// Most recent entry produced by `node`
    pub fn latest_for(&self, node: &str) -> Option<&TranscriptEntry> {
        self.transcript.iter().rev().find(|e| e.node == node)
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_thread() {
        let mut state = RunState::with_thread_id("thread-9");
        state.transcript.push(TokenEvent::new("agent-1", "hi").into());
        state.active_node_id = Some("agent-1".to_string());
        state.events_seen = 1;

        state.reset();

        assert!(state.is_empty());
        assert_eq!(state.active_node_id, None);
        assert_eq!(state.events_seen, 0);
        assert_eq!(state.thread_id.as_deref(), Some("thread-9"));
    }
}
