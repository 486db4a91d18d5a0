use std::sync::Arc;

use pipeflow_canvas::CanvasStore;

use crate::config::ClientConfig;
use crate::controller::ConnectionController;
use crate::error::{PipelineError, Result};
use crate::notify::{LogNotifier, Notifier};
use crate::transport::{HttpTransport, Transport};

/// Builder for constructing a ConnectionController with optional components
pub struct ControllerBuilder {
    config: ClientConfig,
    canvas: Option<Arc<dyn CanvasStore>>,
    transport: Option<Arc<dyn Transport>>,
    notifier: Option<Arc<dyn Notifier>>,
    thread_id: Option<String>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            canvas: None,
            transport: None,
            notifier: None,
            thread_id: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the canvas the run is projected onto
    pub fn canvas(mut self, canvas: Arc<dyn CanvasStore>) -> Self {
        self.canvas = Some(canvas);
        self
    }

    /// Replace the default HTTP transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Resume an existing conversation thread
    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn build(self) -> Result<ConnectionController> {
        let canvas = self
            .canvas
            .ok_or_else(|| PipelineError::Validation("Canvas store is required".to_string()))?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.clone())?),
        };
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        Ok(ConnectionController::new(self.config, transport, canvas)
            .with_notifier(notifier)
            .with_thread_id(self.thread_id))
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
