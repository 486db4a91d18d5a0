use pipeflow_types::{RunState, TokenEvent, ToolCallChunk, TranscriptEntry};
use serde::{Deserialize, Serialize};

/// How tool-call chunks of consecutive tokens from one node are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallMerge {
    /// Append incoming chunks as-is
    #[default]
    Concat,
    /// Fold a chunk into the earlier chunk with the same `id` (or `index`)
    ByIndex,
}

/// Folds batches of token events into the run's transcript
///
/// Only *adjacent* tokens from the same node are concatenated: a node that
/// speaks again after another node gets a fresh transcript entry.
#[derive(Debug, Default)]
pub struct Reconciler {
    state: RunState,
    log: Vec<TokenEvent>,
    merge: ToolCallMerge,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merge(mut self, merge: ToolCallMerge) -> Self {
        self.merge = merge;
        self
    }

    /// Start a new run; the thread id is carried over
    pub fn begin_run(&mut self) {
        self.state.reset();
        self.log.clear();
    }

    pub fn set_thread_id(&mut self, thread_id: Option<String>) {
        self.state.thread_id = thread_id;
    }

    /// Apply a flushed batch in order
    pub fn apply(&mut self, batch: Vec<TokenEvent>) -> &RunState {
        for event in batch {
            self.apply_event(event);
        }
        &self.state
    }

    pub fn apply_event(&mut self, event: TokenEvent) {
        self.log.push(event.clone());
        self.state.events_seen += 1;

        match self.state.transcript.last_mut() {
            Some(last) if last.node == event.node => {
                last.content.push_str(&event.content);
                merge_tool_calls(&mut last.tool_call, event.tool_call, self.merge);
                last.metadata = event.metadata;
            }
            _ => self.state.transcript.push(TranscriptEntry::from(event)),
        }

        self.state.active_node_id = self.state.transcript.last().map(|e| e.node.clone());
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Every token event of the current run, in arrival order
    pub fn log(&self) -> &[TokenEvent] {
        &self.log
    }

    pub fn merge(&self) -> ToolCallMerge {
        self.merge
    }
}

/// Combine `incoming` tool-call chunks into `existing` per `strategy`
pub fn merge_tool_calls(
    existing: &mut Vec<ToolCallChunk>,
    incoming: Vec<ToolCallChunk>,
    strategy: ToolCallMerge,
) {
    match strategy {
        ToolCallMerge::Concat => existing.extend(incoming),
        ToolCallMerge::ByIndex => {
            for chunk in incoming {
                let slot = existing.iter_mut().find(|c| same_call(c, &chunk));
                match slot {
                    Some(target) => absorb(target, chunk),
                    None => existing.push(chunk),
                }
            }
        }
    }
}

fn same_call(current: &ToolCallChunk, chunk: &ToolCallChunk) -> bool {
    match (&chunk.id, chunk.index) {
        (Some(id), _) if current.id.as_ref() == Some(id) => true,
        (Some(_), _) if current.id.is_some() => false,
        (_, Some(index)) => current.index == Some(index),
        _ => false,
    }
}

fn absorb(target: &mut ToolCallChunk, chunk: ToolCallChunk) {
    if let Some(args) = chunk.args {
        target.args.get_or_insert_with(String::new).push_str(&args);
    }
    if target.name.is_none() {
        target.name = chunk.name;
    }
    if target.call_type.is_none() {
        target.call_type = chunk.call_type;
    }
    if target.id.is_none() {
        target.id = chunk.id;
    }
    if target.index.is_none() {
        target.index = chunk.index;
    }
}
