use async_trait::async_trait;
use pipeflow_canvas::{CanvasStore, MemoryCanvas};
use pipeflow_client::{
    ClientConfig, Connection, ConnectionController, Notice, Notifier, Phase, PipelineError, Result,
    Severity, Transport,
};
use pipeflow_stream::SseMessage;
use pipeflow_types::{AgentForm, FlowData, FlowEdge, FlowNode, NodeForm, StartForm};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Wire = anyhow::Result<SseMessage>;

/// Transport replaying one scripted channel per opened run
#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<VecDeque<mpsc::UnboundedReceiver<Wire>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    fn script(&self) -> mpsc::UnboundedSender<Wire> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(rx);
        tx
    }

    fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, pipeline_id: &str, body: Value) -> Result<Connection> {
        self.requests
            .lock()
            .unwrap()
            .push((pipeline_id.to_string(), body));
        let rx = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PipelineError::Transport("no scripted stream".to_string()))?;

        Ok(Connection {
            status: 200,
            messages: Box::pin(UnboundedReceiverStream::new(rx)),
        })
    }
}

/// Transport whose connection never opens
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    async fn open(&self, _pipeline_id: &str, _body: Value) -> Result<Connection> {
        std::future::pending().await
    }
}

/// Canvas that calls `stop()` on every update after the run's first one
///
/// With no tokens streamed, the only later update is the final clean-up,
/// which runs after the final response has claimed the run.
struct StopDuringCleanup {
    canvas: MemoryCanvas,
    controller: OnceLock<Weak<ConnectionController>>,
    updates: AtomicUsize,
    stops: Mutex<Vec<bool>>,
}

impl CanvasStore for StopDuringCleanup {
    fn snapshot(&self) -> FlowData {
        self.canvas.snapshot()
    }

    fn update_nodes(&self, visit: &mut dyn FnMut(&mut FlowNode)) {
        self.canvas.update_nodes(visit);
        if self.updates.fetch_add(1, Ordering::SeqCst) == 0 {
            return;
        }
        if let Some(controller) = self.controller.get().and_then(Weak::upgrade) {
            self.stops.lock().unwrap().push(controller.stop());
        }
    }
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<Notice>>);

impl RecordingNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.0.lock().unwrap().push(notice);
    }
}

struct Harness {
    canvas: Arc<MemoryCanvas>,
    transport: Arc<ScriptedTransport>,
    notices: Arc<RecordingNotifier>,
    controller: Arc<ConnectionController>,
}

fn flow() -> FlowData {
    FlowData::new(
        vec![
            FlowNode::new("start-1", "Start", NodeForm::Start(StartForm::default())),
            FlowNode::new("agent-1", "Agent", NodeForm::Agent(AgentForm::default())).at(250.0, 0.0),
        ],
        vec![FlowEdge::new("start-1", "agent-1")],
    )
}

fn config() -> ClientConfig {
    ClientConfig::new("http://engine.test").with_pipeline_id("pipe-1")
}

fn harness(config: ClientConfig) -> Harness {
    let canvas = Arc::new(MemoryCanvas::new(flow()));
    let transport = Arc::new(ScriptedTransport::default());
    let notices = Arc::new(RecordingNotifier::default());
    let controller = ConnectionController::builder()
        .config(config)
        .canvas(canvas.clone())
        .transport(transport.clone())
        .notifier(notices.clone())
        .build()
        .unwrap();

    Harness {
        canvas,
        transport,
        notices,
        controller: Arc::new(controller),
    }
}

fn wire(data: Value) -> Wire {
    Ok(SseMessage {
        data: data.to_string(),
        ..Default::default()
    })
}

fn token(node: &str, content: &str) -> Wire {
    wire(json!({"event": "token", "node": node, "content": content}))
}

fn final_response(content: &str, last_node: &str) -> Wire {
    wire(json!({"event": "final_response", "content": content, "last_node_id": last_node}))
}

fn raw(data: &str) -> Wire {
    Ok(SseMessage {
        data: data.to_string(),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_run_completes_and_projects_onto_canvas() {
    let h = harness(config());
    let tx = h.transport.script();
    tx.send(token("agent-1", "Diabetes ")).unwrap();
    tx.send(token("agent-1", "is a disease.")).unwrap();
    tx.send(final_response("Diabetes is a disease.", "agent-1")).unwrap();

    let response = h.controller.send_message("What is diabetes?").await.unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.message, "success");
    assert_eq!(response.response, "Diabetes is a disease.");
    assert_eq!(response.last_node_id, "agent-1");
    assert!(response.tool_calls.is_empty());
    assert_eq!(h.controller.phase(), Phase::Completed);

    let agent = h.canvas.node("agent-1").unwrap();
    assert!(!agent.is_streaming());
    assert_eq!(agent.stream_state.unwrap().content, "Diabetes is a disease.");

    let state = h.controller.run_state().unwrap();
    assert_eq!(state.transcript.len(), 1);
    assert_eq!(state.events_seen, 2);

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "pipe-1");
    assert_eq!(requests[0].1["content"], "What is diabetes?");
    assert_eq!(requests[0].1["flowData"]["nodes"].as_array().unwrap().len(), 2);
    assert!(h.notices.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_and_flushes_pending_tokens() {
    let h = harness(config());
    let tx = h.transport.script();

    let task = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.send_message("hi").await }
    });

    tx.send(token("agent-1", "partial")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.controller.phase(), Phase::Streaming);
    assert!(h.canvas.node("agent-1").unwrap().is_streaming());

    // Buffered, but its batch window has not elapsed yet
    tx.send(token("agent-1", " more")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.controller.stop());
    assert_eq!(h.controller.phase(), Phase::Idle);

    let outcome = task.await.unwrap();
    assert!(matches!(outcome, Err(PipelineError::Cancelled)));

    let agent = h.canvas.node("agent-1").unwrap();
    assert!(!agent.is_streaming());
    assert_eq!(agent.stream_state.unwrap().content, "partial more");
    assert_eq!(h.controller.phase(), Phase::Idle);
    assert!(!h.controller.stop());

    let notices = h.notices.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, Severity::Info);
}

#[tokio::test(start_paused = true)]
async fn test_second_send_while_running_is_busy() {
    let h = harness(config());
    let _tx = h.transport.script();

    let task = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.send_message("first").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = h.controller.send_message("second").await;
    assert!(matches!(second, Err(PipelineError::Busy)));
    assert!(h.controller.is_running());
    assert_eq!(h.transport.requests().len(), 1);

    assert!(h.controller.stop());
    assert!(matches!(task.await.unwrap(), Err(PipelineError::Cancelled)));
}

#[tokio::test]
async fn test_validation_rejects_before_any_request() {
    let h = harness(ClientConfig::new("http://engine.test"));
    let outcome = h.controller.send_message("hello").await;
    assert!(matches!(outcome, Err(PipelineError::Validation(_))));

    let h2 = harness(config());
    let outcome = h2.controller.send_message("   ").await;
    assert!(matches!(outcome, Err(PipelineError::Validation(_))));

    assert!(h.transport.requests().is_empty());
    assert!(h2.transport.requests().is_empty());
    assert_eq!(h2.controller.phase(), Phase::Idle);
    assert_eq!(h2.notices.notices()[0].severity, Severity::Error);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_fails_run() {
    let h = harness(config().with_idle_timeout(Duration::from_secs(1)));
    let _tx = h.transport.script();

    let outcome = h.controller.send_message("hello").await;

    assert!(matches!(outcome, Err(PipelineError::Timeout(d)) if d == Duration::from_secs(1)));
    assert_eq!(h.controller.phase(), Phase::Failed);
    assert!(!h.controller.is_running());
}

#[tokio::test]
async fn test_malformed_messages_are_skipped() {
    let h = harness(config());
    let tx = h.transport.script();
    tx.send(raw("not json at all")).unwrap();
    tx.send(raw(r#"{"event":"heartbeat"}"#)).unwrap();
    tx.send(raw(r#"{"node":"agent-1"}"#)).unwrap();
    tx.send(token("agent-1", "ok")).unwrap();
    tx.send(final_response("ok", "agent-1")).unwrap();

    let response = h.controller.send_message("hello").await.unwrap();

    assert_eq!(response.response, "ok");
    assert_eq!(h.controller.run_state().unwrap().transcript.len(), 1);
}

#[tokio::test]
async fn test_parse_error_ceiling_aborts() {
    let h = harness(config().with_max_parse_errors(2));
    let tx = h.transport.script();
    tx.send(token("agent-1", "before")).unwrap();
    tx.send(raw("{")).unwrap();
    tx.send(raw("}")).unwrap();

    let outcome = h.controller.send_message("hello").await;

    assert!(matches!(outcome, Err(PipelineError::Parse(_))));
    assert_eq!(h.controller.phase(), Phase::Failed);
    let agent = h.canvas.node("agent-1").unwrap();
    assert!(!agent.is_streaming());
    assert_eq!(agent.stream_state.unwrap().content, "before");
}

#[tokio::test]
async fn test_stream_closed_without_final_response() {
    let h = harness(config());
    let tx = h.transport.script();
    tx.send(token("agent-1", "half")).unwrap();
    drop(tx);

    let outcome = h.controller.send_message("hello").await;

    let error = outcome.unwrap_err();
    assert!(error.is_transport());
    assert_eq!(h.controller.phase(), Phase::Failed);
    assert!(!h.canvas.node("agent-1").unwrap().is_streaming());
}

#[tokio::test]
async fn test_thread_id_carried_into_next_request() {
    let h = harness(config());

    let tx = h.transport.script();
    tx.send(token("agent-1", "first")).unwrap();
    tx.send(wire(json!({
        "event": "final_response",
        "content": "first",
        "last_node_id": "agent-1",
        "threadId": "thread-42"
    })))
    .unwrap();
    let first = h.controller.send_message("one").await.unwrap();
    assert_eq!(first.thread_id.as_deref(), Some("thread-42"));
    assert_eq!(h.controller.thread_id().as_deref(), Some("thread-42"));

    let tx = h.transport.script();
    tx.send(final_response("second", "agent-1")).unwrap();
    let second = h.controller.send_message("two").await.unwrap();
    assert_eq!(second.thread_id.as_deref(), Some("thread-42"));

    let requests = h.transport.requests();
    assert!(requests[0].1.get("threadId").is_none());
    assert_eq!(requests[1].1["threadId"], "thread-42");
}

#[tokio::test]
async fn test_new_run_resets_transcript() {
    let h = harness(config());

    let tx = h.transport.script();
    tx.send(token("agent-1", "old")).unwrap();
    tx.send(final_response("old", "agent-1")).unwrap();
    h.controller.send_message("one").await.unwrap();

    let tx = h.transport.script();
    tx.send(final_response("nothing streamed", "agent-1")).unwrap();
    h.controller.send_message("two").await.unwrap();

    assert!(h.controller.run_state().unwrap().is_empty());
    // Content of a node from the previous run stays on the canvas
    assert_eq!(
        h.canvas.node("agent-1").unwrap().stream_state.unwrap().content,
        "old"
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropped_send_releases_run() {
    let h = harness(config());
    let tx = h.transport.script();
    tx.send(token("agent-1", "partial")).unwrap();

    let dropped = tokio::time::timeout(
        Duration::from_millis(100),
        h.controller.send_message("hi"),
    )
    .await;
    assert!(dropped.is_err());

    assert!(!h.controller.is_running());
    assert_eq!(h.controller.phase(), Phase::Idle);
    assert!(h.canvas.nodes().iter().all(|n| !n.is_streaming()));
    assert_eq!(
        h.canvas.node("agent-1").unwrap().stream_state.unwrap().content,
        "partial"
    );

    let tx = h.transport.script();
    tx.send(final_response("again", "agent-1")).unwrap();
    let response = h.controller.send_message("hi again").await.unwrap();
    assert_eq!(response.response, "again");
    assert_eq!(h.controller.phase(), Phase::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_send_while_connecting_is_not_busy() {
    let controller = ConnectionController::builder()
        .config(config())
        .canvas(Arc::new(MemoryCanvas::new(flow())))
        .transport(Arc::new(StalledTransport))
        .build()
        .unwrap();

    let first = tokio::time::timeout(Duration::from_millis(50), controller.send_message("one")).await;
    assert!(first.is_err());
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(!controller.is_running());

    // Stalls again instead of failing with Busy
    let second = tokio::time::timeout(Duration::from_millis(50), controller.send_message("two")).await;
    assert!(second.is_err());
}

#[tokio::test]
async fn test_stop_after_final_response_claimed_is_refused() {
    let canvas = Arc::new(StopDuringCleanup {
        canvas: MemoryCanvas::new(flow()),
        controller: OnceLock::new(),
        updates: AtomicUsize::new(0),
        stops: Mutex::new(Vec::new()),
    });
    let transport = Arc::new(ScriptedTransport::default());
    let controller = Arc::new(
        ConnectionController::builder()
            .config(config())
            .canvas(canvas.clone())
            .transport(transport.clone())
            .build()
            .unwrap(),
    );
    canvas.controller.set(Arc::downgrade(&controller)).unwrap();

    let tx = transport.script();
    tx.send(final_response("done", "agent-1")).unwrap();

    let response = controller.send_message("hi").await.unwrap();

    assert_eq!(response.response, "done");
    assert_eq!(*canvas.stops.lock().unwrap(), vec![false]);
    assert_eq!(controller.phase(), Phase::Completed);
    assert!(!controller.is_running());
}
