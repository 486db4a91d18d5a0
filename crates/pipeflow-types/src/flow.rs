//! Pipeline graph model as exchanged with the execution engine.
//!
//! Node configuration is a sum type keyed by node kind: the wire shape keeps
//! `type` and `formData` side by side inside `data`, and [`NodeForm`] ties the
//! two together so a form is always read through the accessors of its own kind.
//! Forms keep the raw `formData` value, so a decoded graph serializes back to
//! exactly what was loaded (minus `__typename`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::events::{Metadata, NodeId, ToolCallChunk};

/// Key injected by GraphQL caches that the execution engine must never see
pub const TYPENAME_KEY: &str = "__typename";

/// Remove every `__typename` key from `value`, at any depth
pub fn strip_typename(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove(TYPENAME_KEY);
            for child in map.values_mut() {
                strip_typename(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_typename(item);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Agent,
    Router,
    Api,
    VectorRetriever,
    GraphRetriever,
    End,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Agent => "agent",
            Self::Router => "router",
            Self::Api => "api",
            Self::VectorRetriever => "vector_retriever",
            Self::GraphRetriever => "graph_retriever",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// Raw-JSON access shared by every form type
///
/// A form keeps the exact `formData` value it was decoded from, so keys the
/// typed accessors do not know about, explicit `null`s and number formatting
/// all reach the engine unchanged.
pub trait FormData {
    fn as_value(&self) -> &Value;

    fn as_value_mut(&mut self) -> &mut Value;

    fn get(&self, key: &str) -> Option<&Value> {
        self.as_value().get(key)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Set `key` without touching any other entry; a `null` form becomes an object
    fn set(&mut self, key: &str, value: Value) {
        let raw = self.as_value_mut();
        if !raw.is_object() {
            *raw = Value::Object(Map::new());
        }
        if let Value::Object(map) = raw {
            map.insert(key.to_string(), value);
        }
    }

    fn is_empty(&self) -> bool {
        match self.as_value() {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

/// Declares a form type over the raw `formData` value.
///
/// The shape struct lists the known keys; decoding checks their types and
/// tolerates `null` or absence, then keeps the original value as-is.
macro_rules! form_type {
    ($(#[$meta:meta])* $name:ident => $shape:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        #[allow(dead_code)]
        struct $shape {
            $($field: Option<$ty>,)*
        }

        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Deserialize)]
        #[serde(try_from = "Value")]
        pub struct $name(Value);

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self(Value::Object(Map::new()))
            }
        }

        impl TryFrom<Value> for $name {
            type Error = serde_json::Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                if !value.is_null() {
                    $shape::deserialize(&value)?;
                }
                Ok(Self(value))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }

        impl FormData for $name {
            fn as_value(&self) -> &Value {
                &self.0
            }

            fn as_value_mut(&mut self) -> &mut Value {
                &mut self.0
            }
        }
    };
}

form_type!(StartForm => StartShape { greeting: String });

impl StartForm {
    pub fn greeting(&self) -> Option<&str> {
        self.get_str("greeting")
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.set("greeting", Value::String(greeting.into()));
        self
    }
}

form_type!(AgentForm => AgentShape {
    model: String,
    system_prompt: String,
    temperature: f64,
    tools: Vec<String>,
});

impl AgentForm {
    pub fn model(&self) -> Option<&str> {
        self.get_str("model")
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.get_str("systemPrompt")
    }

    pub fn temperature(&self) -> Option<f64> {
        self.get("temperature").and_then(Value::as_f64)
    }

    pub fn tools(&self) -> Vec<&str> {
        self.get("tools")
            .and_then(Value::as_array)
            .map(|tools| tools.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.set("model", Value::String(model.into()));
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.set("systemPrompt", Value::String(prompt.into()));
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.set("temperature", Value::from(temperature));
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.set("tools", Value::from(tools));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

form_type!(RouterForm => RouterShape {
    routes: Vec<RouteRule>,
    default_target: NodeId,
});

impl RouterForm {
    pub fn routes(&self) -> Vec<RouteRule> {
        self.get("routes")
            .and_then(|routes| Vec::<RouteRule>::deserialize(routes).ok())
            .unwrap_or_default()
    }

    pub fn default_target(&self) -> Option<&str> {
        self.get_str("defaultTarget")
    }

    pub fn with_routes(mut self, routes: Vec<RouteRule>) -> Self {
        let routes = routes
            .into_iter()
            .map(|rule| {
                let mut entry = Map::new();
                entry.insert("target".to_string(), Value::String(rule.target));
                if let Some(condition) = rule.condition {
                    entry.insert("condition".to_string(), Value::String(condition));
                }
                Value::Object(entry)
            })
            .collect();
        self.set("routes", Value::Array(routes));
        self
    }

    pub fn with_default_target(mut self, target: impl Into<NodeId>) -> Self {
        self.set("defaultTarget", Value::String(target.into()));
        self
    }
}

form_type!(ApiForm => ApiShape {
    url: String,
    method: String,
    headers: Map<String, Value>,
    body_template: String,
});

impl ApiForm {
    pub fn url(&self) -> Option<&str> {
        self.get_str("url")
    }

    /// HTTP method, `GET` when the form leaves it unset
    pub fn method(&self) -> &str {
        self.get_str("method").unwrap_or("GET")
    }

    pub fn headers(&self) -> Option<&Map<String, Value>> {
        self.get("headers").and_then(Value::as_object)
    }

    pub fn body_template(&self) -> Option<&str> {
        self.get_str("bodyTemplate")
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.set("url", Value::String(url.into()));
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.set("method", Value::String(method.into()));
        self
    }
}

form_type!(VectorRetrieverForm => VectorRetrieverShape {
    collection: String,
    embedding_model: String,
    top_k: u64,
});

impl VectorRetrieverForm {
    pub fn collection(&self) -> Option<&str> {
        self.get_str("collection")
    }

    pub fn embedding_model(&self) -> Option<&str> {
        self.get_str("embeddingModel")
    }

    pub fn top_k(&self) -> Option<u64> {
        self.get("topK").and_then(Value::as_u64)
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.set("collection", Value::String(collection.into()));
        self
    }

    pub fn with_top_k(mut self, top_k: u64) -> Self {
        self.set("topK", Value::from(top_k));
        self
    }
}

form_type!(GraphRetrieverForm => GraphRetrieverShape {
    database: String,
    query_template: String,
    max_hops: u64,
});

impl GraphRetrieverForm {
    pub fn database(&self) -> Option<&str> {
        self.get_str("database")
    }

    pub fn query_template(&self) -> Option<&str> {
        self.get_str("queryTemplate")
    }

    pub fn max_hops(&self) -> Option<u64> {
        self.get("maxHops").and_then(Value::as_u64)
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.set("database", Value::String(database.into()));
        self
    }
}

form_type!(EndForm => EndShape { output_variable: String });

impl EndForm {
    pub fn output_variable(&self) -> Option<&str> {
        self.get_str("outputVariable")
    }

    pub fn with_output_variable(mut self, variable: impl Into<String>) -> Self {
        self.set("outputVariable", Value::String(variable.into()));
        self
    }
}

/// Type-specific configuration of a node (`data.formData` on the wire)
#[derive(Debug, Clone, PartialEq)]
pub enum NodeForm {
    Start(StartForm),
    Agent(AgentForm),
    Router(RouterForm),
    Api(ApiForm),
    VectorRetriever(VectorRetrieverForm),
    GraphRetriever(GraphRetrieverForm),
    End(EndForm),
}

impl NodeForm {
    /// Empty form for a given kind
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Start => Self::Start(StartForm::default()),
            NodeKind::Agent => Self::Agent(AgentForm::default()),
            NodeKind::Router => Self::Router(RouterForm::default()),
            NodeKind::Api => Self::Api(ApiForm::default()),
            NodeKind::VectorRetriever => Self::VectorRetriever(VectorRetrieverForm::default()),
            NodeKind::GraphRetriever => Self::GraphRetriever(GraphRetrieverForm::default()),
            NodeKind::End => Self::End(EndForm::default()),
        }
    }

    /// Decode `formData` according to the sibling `type`
    ///
    /// The value is kept verbatim, `null` included; only the types of known
    /// keys are checked.
    pub fn from_parts(kind: NodeKind, form_data: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            NodeKind::Start => Self::Start(StartForm::try_from(form_data)?),
            NodeKind::Agent => Self::Agent(AgentForm::try_from(form_data)?),
            NodeKind::Router => Self::Router(RouterForm::try_from(form_data)?),
            NodeKind::Api => Self::Api(ApiForm::try_from(form_data)?),
            NodeKind::VectorRetriever => Self::VectorRetriever(VectorRetrieverForm::try_from(form_data)?),
            NodeKind::GraphRetriever => Self::GraphRetriever(GraphRetrieverForm::try_from(form_data)?),
            NodeKind::End => Self::End(EndForm::try_from(form_data)?),
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Start(_) => NodeKind::Start,
            Self::Agent(_) => NodeKind::Agent,
            Self::Router(_) => NodeKind::Router,
            Self::Api(_) => NodeKind::Api,
            Self::VectorRetriever(_) => NodeKind::VectorRetriever,
            Self::GraphRetriever(_) => NodeKind::GraphRetriever,
            Self::End(_) => NodeKind::End,
        }
    }

    pub fn as_form_data(&self) -> &dyn FormData {
        match self {
            Self::Start(form) => form,
            Self::Agent(form) => form,
            Self::Router(form) => form,
            Self::Api(form) => form,
            Self::VectorRetriever(form) => form,
            Self::GraphRetriever(form) => form,
            Self::End(form) => form,
        }
    }

    pub fn to_value(&self) -> Value {
        self.as_form_data().as_value().clone()
    }
}

/// `data` payload of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNodeData", into = "RawNodeData")]
pub struct NodeData {
    pub id: NodeId,
    pub name: String,
    pub description: String,
    pub color: Option<String>,
    pub is_editing_name: bool,
    pub is_editing_description: bool,
    pub form: NodeForm,
    pub additional_data: Value,
    pub input_variables: Value,
}

impl NodeData {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, form: NodeForm) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            color: None,
            is_editing_name: false,
            is_editing_description: false,
            form,
            additional_data: Value::Null,
            input_variables: Value::Array(Vec::new()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.form.kind()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNodeData {
    id: NodeId,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    is_editing_name: bool,
    #[serde(default)]
    is_editing_description: bool,
    #[serde(default)]
    form_data: Value,
    #[serde(default)]
    additional_data: Value,
    #[serde(default, rename = "input_variables")]
    input_variables: Value,
}

impl TryFrom<RawNodeData> for NodeData {
    type Error = serde_json::Error;

    fn try_from(raw: RawNodeData) -> Result<Self, Self::Error> {
        Ok(Self {
            form: NodeForm::from_parts(raw.kind, raw.form_data)?,
            id: raw.id,
            name: raw.name,
            description: raw.description,
            color: raw.color,
            is_editing_name: raw.is_editing_name,
            is_editing_description: raw.is_editing_description,
            additional_data: raw.additional_data,
            input_variables: raw.input_variables,
        })
    }
}

impl From<NodeData> for RawNodeData {
    fn from(data: NodeData) -> Self {
        let form_data = data.form.to_value();
        Self {
            id: data.id,
            kind: data.form.kind(),
            name: data.name,
            description: data.description,
            color: data.color,
            is_editing_name: data.is_editing_name,
            is_editing_description: data.is_editing_description,
            form_data,
            additional_data: data.additional_data,
            input_variables: data.input_variables,
        }
    }
}

/// Streaming annotation written onto a node by the canvas projector
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStreamState {
    pub content: String,
    pub tool_call: Vec<ToolCallChunk>,
    pub metadata: Metadata,
    pub streaming: bool,
    pub last_update: DateTime<Utc>,
}

impl NodeStreamState {
    /// Annotation for a node that takes part in the run but produces no output
    pub fn idle() -> Self {
        Self {
            content: String::new(),
            tool_call: Vec::new(),
            metadata: Metadata::new(),
            streaming: false,
            last_update: Utc::now(),
        }
    }
}

/// A node of the graph
///
/// Decoding rejects a node whose `type` disagrees with `data.type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFlowNode")]
pub struct FlowNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub position: Position,
    pub data: NodeData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measured: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dragging: Option<bool>,
    /// UI-only; never sent to the engine
    #[serde(skip)]
    pub stream_state: Option<NodeStreamState>,
}

#[derive(Deserialize)]
struct RawFlowNode {
    id: NodeId,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    position: Position,
    data: NodeData,
    #[serde(default)]
    measured: Option<Dimensions>,
    #[serde(default)]
    selected: Option<bool>,
    #[serde(default)]
    dragging: Option<bool>,
}

impl TryFrom<RawFlowNode> for FlowNode {
    type Error = String;

    fn try_from(raw: RawFlowNode) -> Result<Self, Self::Error> {
        if raw.kind != raw.data.kind() {
            return Err(format!(
                "node `{}` has type `{}` but its data has type `{}`",
                raw.id,
                raw.kind,
                raw.data.kind()
            ));
        }
        Ok(Self {
            id: raw.id,
            kind: raw.kind,
            position: raw.position,
            data: raw.data,
            measured: raw.measured,
            selected: raw.selected,
            dragging: raw.dragging,
            stream_state: None,
        })
    }
}

impl FlowNode {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, form: NodeForm) -> Self {
        let id = id.into();
        Self {
            kind: form.kind(),
            data: NodeData::new(id.clone(), name, form),
            id,
            position: Position::default(),
            measured: None,
            selected: None,
            dragging: None,
            stream_state: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn is_start(&self) -> bool {
        self.kind == NodeKind::Start
    }

    pub fn is_streaming(&self) -> bool {
        self.stream_state.as_ref().is_some_and(|s| s.streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

impl FlowEdge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            source_handle: None,
            target_handle: None,
            style: None,
            animated: None,
            selected: None,
        }
    }
}

/// Nodes and edges of one pipeline (`flowData` on the wire)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowData {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

impl FlowData {
    pub fn new(nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> Self {
        Self { nodes, edges }
    }

    /// Decode a graph that may still carry cache tags
    pub fn from_value(mut value: Value) -> Result<Self, serde_json::Error> {
        strip_typename(&mut value);
        serde_json::from_value(value)
    }

    /// Wire form of the graph, normalized for the execution engine
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        strip_typename(&mut value);
        Ok(value)
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn start_node(&self) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.is_start())
    }
}
