//! # Pipeflow
//!
//! Client for streaming pipeline executions. A pipeline is a graph of nodes
//! (agents, routers, API calls, retrievers) drawn on a canvas; running it
//! streams each node's output back over Server-Sent Events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipeflow::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let flow = FlowData::new(
//!         vec![
//!             FlowNode::new("start-1", "Start", NodeForm::Start(StartForm::default())),
//!             FlowNode::new("agent-1", "Agent", NodeForm::Agent(AgentForm::default())),
//!         ],
//!         vec![FlowEdge::new("start-1", "agent-1")],
//!     );
//!     let canvas = Arc::new(MemoryCanvas::new(flow));
//!
//!     let controller = ConnectionController::builder()
//!         .config(ClientConfig::new("http://localhost:8000").with_pipeline_id("pipe-1"))
//!         .canvas(canvas.clone())
//!         .build()?;
//!
//!     let response = controller.send_message("What is diabetes?").await?;
//!     println!("{} (from {})", response.response, response.last_node_id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`pipeflow-types`**: wire events, the flow graph and run state
//! - **`pipeflow-stream`**: SSE decoding, time-window batching, reconciliation
//! - **`pipeflow-canvas`**: canvas store and the projector that marks node progress
//! - **`pipeflow-client`**: HTTP transport and the connection controller
//!
//! ## License
//!
//! MIT

pub mod prelude;

pub use pipeflow_types::{
    AgentForm, ApiForm, EndForm, ExecutionRequest, FinalResponseEvent, FlowData, FlowEdge,
    FlowNode, FormData, GraphRetrieverForm, NodeData, NodeForm, NodeKind, NodeStreamState, ParseError,
    PipelineResponse, RouterForm, RunState, StartForm, StreamEvent, TokenEvent, ToolCallChunk,
    TranscriptEntry, VectorRetrieverForm,
};

pub use pipeflow_stream::{
    parse_sse_stream, Debouncer, EventBatcher, Reconciler, SseMessage, SseStream, ToolCallMerge,
};

pub use pipeflow_canvas::{CanvasProjector, CanvasStore, MemoryCanvas};

pub use pipeflow_client::{
    ClientConfig, Connection, ConnectionController, ControllerBuilder, HttpTransport, LogNotifier,
    Notice, Notifier, Phase, PipelineError, Severity, Transport,
};
