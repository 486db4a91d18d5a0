//! Client side of pipeline execution.
//!
//! A [`ConnectionController`] POSTs the current canvas plus a user message to
//! the execution endpoint, decodes the `text/event-stream` response, batches
//! token events and projects the reconciled run onto a
//! [`pipeflow_canvas::CanvasStore`] while the run progresses.

pub mod builder;
pub mod config;
pub mod controller;
pub mod error;
pub mod notify;
pub mod transport;

pub use builder::ControllerBuilder;
pub use config::ClientConfig;
pub use controller::{ConnectionController, Phase};
pub use error::{PipelineError, Result};
pub use notify::{LogNotifier, Notice, Notifier, Severity};
pub use transport::{Connection, HttpTransport, Transport, EVENT_STREAM};
