use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// User-visible notification (a toast, in a UI)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub detail: String,
}

impl From<&PipelineError> for Notice {
    fn from(error: &PipelineError) -> Self {
        let (severity, title) = match error {
            PipelineError::Validation(_) => (Severity::Error, "Cannot send message"),
            PipelineError::Cancelled => (Severity::Info, "Run stopped"),
            PipelineError::Busy => (Severity::Info, "A run is already in progress"),
            PipelineError::Timeout(_) => (Severity::Error, "Pipeline stopped responding"),
            PipelineError::Parse(_) => (Severity::Error, "Malformed pipeline output"),
            _ => (Severity::Error, "Pipeline execution failed"),
        };

        Self {
            severity,
            title: title.to_string(),
            detail: error.to_string(),
        }
    }
}

/// Sink for notices raised by the controller
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier: report through `tracing`
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.severity {
            Severity::Info => tracing::info!(title = %notice.title, "{}", notice.detail),
            Severity::Error => tracing::error!(title = %notice.title, "{}", notice.detail),
        }
    }
}
