use chrono::Utc;
use pipeflow_types::{FlowNode, NodeStreamState, RunState, TranscriptEntry};
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::CanvasStore;

/// Writes run progress onto the nodes of a [`CanvasStore`]
///
/// At most one node carries `streaming: true` after any projection: the node
/// of the transcript's last entry. Start nodes are sources, never compute
/// steps, and are always shown as not streaming.
pub struct CanvasProjector {
    store: Arc<dyn CanvasStore>,
}

impl CanvasProjector {
    pub fn new(store: Arc<dyn CanvasStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CanvasStore> {
        &self.store
    }

    /// Prepare the canvas for a fresh run
    pub fn begin(&self) {
        self.store.update_nodes(&mut |node| {
            if node.is_start() {
                mark_idle(node);
            } else if let Some(stream) = node.stream_state.as_mut() {
                stream.streaming = false;
            }
        });
    }

    /// Mirror `state` onto the canvas; returns how many nodes were annotated
    pub fn project(&self, state: &RunState) -> usize {
        let latest: HashMap<&str, &TranscriptEntry> = state
            .transcript
            .iter()
            .map(|entry| (entry.node.as_str(), entry))
            .collect();
        let active = state.active_node_id.as_deref();
        let now = Utc::now();
        let mut annotated = 0;

        self.store.update_nodes(&mut |node| {
            if let Some(entry) = latest.get(node.id.as_str()) {
                node.stream_state = Some(NodeStreamState {
                    content: entry.content.clone(),
                    tool_call: entry.tool_call.clone(),
                    metadata: entry.metadata.clone(),
                    streaming: !node.is_start() && active == Some(node.id.as_str()),
                    last_update: now,
                });
                annotated += 1;
            } else if node.is_start() {
                mark_idle(node);
            } else if let Some(stream) = node.stream_state.as_mut() {
                stream.streaming = false;
            }
        });

        tracing::debug!(
            annotated,
            active = active.unwrap_or("-"),
            "Projected run state onto canvas"
        );
        annotated
    }

    /// Run is over: drop every streaming flag, keep the content
    pub fn finish(&self) -> usize {
        let mut cleared = 0;
        self.store.update_nodes(&mut |node| {
            if let Some(stream) = node.stream_state.as_mut() {
                if stream.streaming {
                    stream.streaming = false;
                    stream.last_update = Utc::now();
                    cleared += 1;
                }
            }
        });
        cleared
    }
}

fn mark_idle(node: &mut FlowNode) {
    match node.stream_state.as_mut() {
        Some(stream) => stream.streaming = false,
        None => node.stream_state = Some(NodeStreamState::idle()),
    }
}
