//! Prelude module for convenient imports
//!
//! ```rust
//! use pipeflow::prelude::*;
//! ```

pub use crate::{
    AgentForm, CanvasStore, ClientConfig, ConnectionController, EndForm, FlowData, FlowEdge,
    FlowNode, MemoryCanvas, NodeForm, Phase, PipelineError, PipelineResponse, RouterForm,
    StartForm, StreamEvent, TokenEvent,
};
