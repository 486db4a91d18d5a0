use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use pipeflow_canvas::{CanvasProjector, CanvasStore};
use pipeflow_stream::{until_due, EventBatcher, Reconciler, SseMessage, SseStream};
use pipeflow_types::{ExecutionRequest, PipelineResponse, RunState, StreamEvent, TokenEvent};
use serde_json::Value;
use tokio::time::error::Elapsed;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::builder::ControllerBuilder;
use crate::config::ClientConfig;
use crate::error::{PipelineError, Result};
use crate::notify::{LogNotifier, Notice, Notifier};
use crate::transport::{Connection, Transport};

/// Connection state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_running(&self) -> bool {
        matches!(self, Phase::Connecting | Phase::Streaming)
    }
}

struct RunHandle {
    id: String,
    cancel: CancellationToken,
    terminated: AtomicBool,
}

impl RunHandle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            terminated: AtomicBool::new(false),
        }
    }

    /// Claim the run's outcome; only the first caller succeeds
    fn try_terminate(&self) -> bool {
        self.terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct Inner {
    phase: Phase,
    thread_id: Option<String>,
    current: Option<Arc<RunHandle>>,
}

impl Inner {
    fn owns(&self, run: &RunHandle) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), run))
    }
}

struct Session {
    batcher: EventBatcher<TokenEvent>,
    reconciler: Reconciler,
}

/// Drives pipeline runs: sends the request, consumes the SSE response and
/// mirrors progress onto the canvas
///
/// At most one run is in flight per controller. A second `send_message`
/// while a run is active fails with [`PipelineError::Busy`].
pub struct ConnectionController {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    projector: CanvasProjector,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<Inner>,
    session: tokio::sync::Mutex<Session>,
}

impl ConnectionController {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        canvas: Arc<dyn CanvasStore>,
    ) -> Self {
        let session = Session {
            batcher: EventBatcher::new(config.batch_window()),
            reconciler: Reconciler::new().with_merge(config.tool_call_merge),
        };

        Self {
            config,
            transport,
            projector: CanvasProjector::new(canvas),
            notifier: Arc::new(LogNotifier),
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                thread_id: None,
                current: None,
            }),
            session: tokio::sync::Mutex::new(session),
        }
    }

    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_thread_id(mut self, thread_id: Option<String>) -> Self {
        self.inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .thread_id = thread_id;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn canvas(&self) -> &Arc<dyn CanvasStore> {
        self.projector.store()
    }

    pub fn phase(&self) -> Phase {
        self.lock_inner().phase
    }

    pub fn is_running(&self) -> bool {
        self.lock_inner().current.is_some()
    }

    /// Conversation thread carried into the next request
    pub fn thread_id(&self) -> Option<String> {
        self.lock_inner().thread_id.clone()
    }

    /// Transcript of the latest run, unless a run currently holds it
    pub fn run_state(&self) -> Option<RunState> {
        self.session
            .try_lock()
            .ok()
            .map(|session| session.reconciler.state().clone())
    }

    /// Execute the pipeline with `content` as the user message
    ///
    /// Resolves once the final response arrives, the stream fails, or the
    /// run is stopped. Failures are also reported to the notifier.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<PipelineResponse> {
        let outcome = self.execute(content.into()).await;
        if let Err(error) = &outcome {
            self.notifier.notify(Notice::from(error));
        }
        outcome
    }

    /// Cancel the in-flight run
    ///
    /// Returns `false` when nothing was running or the run already reached
    /// its final response. Buffered tokens are still flushed to the canvas
    /// before the pending `send_message` resolves with
    /// [`PipelineError::Cancelled`].
    pub fn stop(&self) -> bool {
        let mut inner = self.lock_inner();
        let Some(run) = inner.current.clone() else {
            return false;
        };
        if !run.try_terminate() {
            return false;
        }

        run.cancel.cancel();
        inner.current = None;
        inner.phase = Phase::Idle;
        info!(run_id = %run.id, "Stopping pipeline run");
        true
    }

    async fn execute(&self, content: String) -> Result<PipelineResponse> {
        let started = Instant::now();
        let pipeline_id = self.validate(&content)?;
        let (run, thread_id) = self.claim_run()?;
        let guard = RunGuard {
            controller: self,
            run: Arc::clone(&run),
            armed: true,
        };

        info!(run_id = %run.id, %pipeline_id, "Starting pipeline run");
        let outcome = self
            .drive(&run, &pipeline_id, content, thread_id, started)
            .await;
        guard.disarm();
        self.release_run(&run, &outcome);
        outcome
    }

    fn validate(&self, content: &str) -> Result<String> {
        let pipeline_id = self
            .config
            .pipeline_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PipelineError::Validation("No pipeline selected".to_string()))?;

        if content.trim().is_empty() {
            return Err(PipelineError::Validation("Message is empty".to_string()));
        }

        Ok(pipeline_id.to_string())
    }

    fn claim_run(&self) -> Result<(Arc<RunHandle>, Option<String>)> {
        let mut inner = self.lock_inner();
        if inner.current.is_some() {
            return Err(PipelineError::Busy);
        }

        let run = Arc::new(RunHandle::new());
        inner.current = Some(Arc::clone(&run));
        inner.phase = Phase::Connecting;
        Ok((run, inner.thread_id.clone()))
    }

    fn release_run(&self, run: &RunHandle, outcome: &Result<PipelineResponse>) {
        let mut inner = self.lock_inner();
        if let Ok(response) = outcome {
            if response.thread_id.is_some() {
                inner.thread_id = response.thread_id.clone();
            }
        }

        // A stopped run no longer owns the state
        if !inner.owns(run) {
            return;
        }
        inner.current = None;
        inner.phase = match outcome {
            Ok(_) => Phase::Completed,
            Err(PipelineError::Cancelled) => Phase::Idle,
            Err(_) => Phase::Failed,
        };
    }

    fn enter_streaming(&self, run: &RunHandle) {
        let mut inner = self.lock_inner();
        if inner.owns(run) {
            inner.phase = Phase::Streaming;
        }
    }

    async fn drive(
        &self,
        run: &RunHandle,
        pipeline_id: &str,
        content: String,
        thread_id: Option<String>,
        started: Instant,
    ) -> Result<PipelineResponse> {
        let body = ExecutionRequest::new(self.projector.store().snapshot(), content)
            .with_thread_id(thread_id.clone())
            .to_body()?;

        let mut session = self.session.lock().await;
        session.batcher.flush();
        session.reconciler.begin_run();
        session.reconciler.set_thread_id(thread_id.clone());
        self.projector.begin();

        let outcome = self.pump(run, &mut session, pipeline_id, body, started).await;

        let won = run.try_terminate();
        self.flush(&mut session);
        let cleared = self.projector.finish();
        let outcome = if won { outcome } else { Err(PipelineError::Cancelled) };

        match outcome {
            Ok(mut response) => {
                if response.thread_id.is_none() {
                    response.thread_id = thread_id;
                }
                session.reconciler.set_thread_id(response.thread_id.clone());
                info!(
                    run_id = %run.id,
                    time_taken_ms = response.time_taken,
                    entries = session.reconciler.state().transcript.len(),
                    last_node = %response.last_node_id,
                    "Pipeline run completed"
                );
                Ok(response)
            }
            Err(PipelineError::Cancelled) => {
                info!(run_id = %run.id, cleared, "Pipeline run cancelled");
                Err(PipelineError::Cancelled)
            }
            Err(error) => {
                warn!(run_id = %run.id, %error, "Pipeline run failed");
                Err(error)
            }
        }
    }

    async fn pump(
        &self,
        run: &RunHandle,
        session: &mut Session,
        pipeline_id: &str,
        body: Value,
        started: Instant,
    ) -> Result<PipelineResponse> {
        let Connection { status, mut messages } = tokio::select! {
            biased;
            _ = run.cancel.cancelled() => return Err(PipelineError::Cancelled),
            opened = self.transport.open(pipeline_id, body) => opened?,
        };
        self.enter_streaming(run);
        debug!(run_id = %run.id, status, "Execution stream open");

        let idle = self.config.idle_timeout();
        let mut last_seen = Instant::now();
        let mut skipped = 0usize;

        loop {
            let deadline = session.batcher.deadline();
            let idle_deadline = idle.map(|limit| last_seen + limit);

            let next = tokio::select! {
                biased;
                _ = run.cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = until_due(deadline) => {
                    self.flush(session);
                    continue;
                }
                next = next_message(&mut messages, idle_deadline) => {
                    next.map_err(|_| PipelineError::Timeout(idle.unwrap_or_default()))?
                }
            };
            last_seen = Instant::now();

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(PipelineError::Transport(error.to_string())),
                None => {
                    return Err(PipelineError::Transport(
                        "Stream closed before the final response".to_string(),
                    ))
                }
            };

            match StreamEvent::from_json(&message.data) {
                Ok(StreamEvent::Token(token)) => {
                    if session.batcher.add(token) {
                        trace!(run_id = %run.id, "Batch window opened");
                    }
                }
                Ok(StreamEvent::FinalResponse(done)) => {
                    let time_taken = started.elapsed().as_millis() as u64;
                    return Ok(PipelineResponse::from_final(status, done, time_taken));
                }
                Err(error) => {
                    skipped += 1;
                    warn!(run_id = %run.id, %error, skipped, "Skipping malformed stream message");
                    if self.config.max_parse_errors.is_some_and(|max| skipped >= max) {
                        return Err(error.into());
                    }
                }
            }
        }
    }

    fn flush(&self, session: &mut Session) {
        if let Some(batch) = session.batcher.flush() {
            let size = batch.len();
            let state = session.reconciler.apply(batch);
            let touched = self.projector.project(state);
            trace!(size, touched, "Flushed token batch");
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the run when the `send_message` future is dropped mid-flight
struct RunGuard<'a> {
    controller: &'a ConnectionController,
    run: Arc<RunHandle>,
    armed: bool,
}

impl RunGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        self.run.try_terminate();
        self.run.cancel.cancel();
        self.controller
            .release_run(&self.run, &Err(PipelineError::Cancelled));

        // Leave the flags alone if a newer run already owns the canvas
        if !self.controller.is_running() {
            let cleared = self.controller.projector.finish();
            warn!(run_id = %self.run.id, cleared, "Pipeline run dropped before completion");
        }
    }
}

async fn next_message(
    messages: &mut SseStream,
    deadline: Option<Instant>,
) -> std::result::Result<Option<anyhow::Result<SseMessage>>, Elapsed> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, messages.next()).await,
        None => Ok(messages.next().await),
    }
}
