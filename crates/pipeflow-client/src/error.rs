use pipeflow_types::ParseError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Expected a text/event-stream response, got `{0}`")]
    ContentType(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("No stream activity for {0:?}")]
    Timeout(Duration),

    #[error("A run is already in flight")]
    Busy,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Connection-level failure (as opposed to caller or payload problems)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::HttpStatus { .. }
                | Self::ContentType(_)
                | Self::Timeout(_)
                | Self::Http(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
