use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Identifier of a node in the pipeline graph
pub type NodeId = String;

/// Free-form metadata attached to a token chunk by the execution engine
pub type Metadata = Map<String, Value>;

/// Partial, streamed representation of a tool invocation.
///
/// Every field is optional: the engine sends fragments that only make sense
/// once merged with their siblings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Incremental chunk of output attributed to one workflow node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub node: NodeId,
    pub content: String,
    #[serde(default)]
    pub tool_call: Vec<ToolCallChunk>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl TokenEvent {
    pub fn new(node: impl Into<NodeId>, content: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            content: content.into(),
            tool_call: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_tool_calls(mut self, chunks: Vec<ToolCallChunk>) -> Self {
        self.tool_call = chunks;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Terminal event signaling pipeline completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponseEvent {
    pub content: String,
    pub last_node_id: NodeId,
    #[serde(default, alias = "threadId", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Event delivered over the execution SSE channel
///
/// Discriminated by the `event` field of each wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial output of one node (streamed token-by-token)
    Token(TokenEvent),

    /// Whole-pipeline answer; closes the run
    FinalResponse(FinalResponseEvent),
}

/// A wire message that could not be classified as a [`StreamEvent`]
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Payload has no string `event` discriminant")]
    MissingDiscriminant,

    #[error("Unknown event kind: {0}")]
    UnknownEvent(String),

    #[error("Malformed `{event}` event: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StreamEvent {
    pub const TOKEN: &'static str = "token";
    pub const FINAL_RESPONSE: &'static str = "final_response";

    /// Decode the `data` field of one SSE message
    pub fn from_json(data: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(data).map_err(ParseError::InvalidJson)?;
        Self::from_value(value)
    }

    /// Classify an already-decoded JSON payload
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let kind = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingDiscriminant)?
            .to_string();

        if kind != Self::TOKEN && kind != Self::FINAL_RESPONSE {
            return Err(ParseError::UnknownEvent(kind));
        }

        serde_json::from_value(value).map_err(|source| ParseError::Malformed { event: kind, source })
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Self::Token(_))
    }

    pub fn is_final_response(&self) -> bool {
        matches!(self, Self::FinalResponse(_))
    }

    pub fn as_token(&self) -> Option<&TokenEvent> {
        match self {
            Self::Token(token) => Some(token),
            _ => None,
        }
    }

    pub fn as_final_response(&self) -> Option<&FinalResponseEvent> {
        match self {
            Self::FinalResponse(response) => Some(response),
            _ => None,
        }
    }

    /// Wire name of this event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token(_) => Self::TOKEN,
            Self::FinalResponse(_) => Self::FINAL_RESPONSE,
        }
    }
}

impl From<TokenEvent> for StreamEvent {
    fn from(event: TokenEvent) -> Self {
        Self::Token(event)
    }
}

impl From<FinalResponseEvent> for StreamEvent {
    fn from(event: FinalResponseEvent) -> Self {
        Self::FinalResponse(event)
    }
}
