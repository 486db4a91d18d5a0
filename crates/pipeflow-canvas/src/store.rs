use pipeflow_types::{FlowData, FlowEdge, FlowNode};
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;

/// Externally-owned node/edge collection
///
/// The streaming client reads it to build request bodies and annotates its
/// nodes while a run is live. `update_nodes` hands out one node at a time, so
/// an annotation can never add or remove nodes.
pub trait CanvasStore: Send + Sync {
    /// Current graph, nodes and edges
    fn snapshot(&self) -> FlowData;

    fn nodes(&self) -> Vec<FlowNode> {
        self.snapshot().nodes
    }

    fn edges(&self) -> Vec<FlowEdge> {
        self.snapshot().edges
    }

    /// Visit every node mutably
    fn update_nodes(&self, visit: &mut dyn FnMut(&mut FlowNode));
}

/// In-memory [`CanvasStore`] with change notification
///
/// Every mutation bumps a revision published on a `watch` channel so a UI
/// can redraw without polling.
pub struct MemoryCanvas {
    flow: RwLock<FlowData>,
    revision: watch::Sender<u64>,
}

impl MemoryCanvas {
    pub fn new(flow: FlowData) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            flow: RwLock::new(flow),
            revision,
        }
    }

    /// Swap in a whole new graph (e.g. after the user edits the pipeline)
    pub fn replace(&self, flow: FlowData) {
        *self.flow.write().unwrap_or_else(PoisonError::into_inner) = flow;
        self.bump();
    }

    /// Receiver that changes whenever the graph or its annotations change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn node(&self, id: &str) -> Option<FlowNode> {
        self.flow
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .node(id)
            .cloned()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

impl Default for MemoryCanvas {
    fn default() -> Self {
        Self::new(FlowData::default())
    }
}

impl CanvasStore for MemoryCanvas {
    fn snapshot(&self) -> FlowData {
        self.flow.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update_nodes(&self, visit: &mut dyn FnMut(&mut FlowNode)) {
        {
            let mut flow = self.flow.write().unwrap_or_else(PoisonError::into_inner);
            for node in flow.nodes.iter_mut() {
                visit(node);
            }
        }
        self.bump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeflow_types::{AgentForm, NodeForm};

    #[test]
    fn test_updates_bump_revision() {
        let canvas = MemoryCanvas::new(FlowData::new(
            vec![FlowNode::new("agent-1", "Agent", NodeForm::Agent(AgentForm::default()))],
            Vec::new(),
        ));
        let rx = canvas.subscribe();
        assert_eq!(canvas.revision(), 0);

        canvas.update_nodes(&mut |node| node.selected = Some(true));

        assert_eq!(canvas.revision(), 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(canvas.node("agent-1").unwrap().selected, Some(true));
    }
}
