pub mod events;
pub mod flow;
pub mod state;
pub mod response;

pub use events::{
    FinalResponseEvent, Metadata, NodeId, ParseError, StreamEvent, TokenEvent, ToolCallChunk,
};
pub use flow::{
    strip_typename, AgentForm, ApiForm, Dimensions, EndForm, FlowData, FlowEdge, FlowNode, FormData,
    GraphRetrieverForm, NodeData, NodeForm, NodeKind, NodeStreamState, Position, RouteRule,
    RouterForm, StartForm, VectorRetrieverForm, TYPENAME_KEY,
};
pub use state::{RunState, TranscriptEntry};
pub use response::{ExecutionRequest, PipelineResponse};
