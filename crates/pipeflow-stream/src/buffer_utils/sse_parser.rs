use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;

use super::buffering::LineBuffer;

/// One dispatched Server-Sent-Events message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseMessage>> + Send>>;

/// Incremental SSE field decoder
///
/// Multiple `data:` lines are joined with `\n`; a blank line dispatches the
/// message. Comments (`:`) and `retry:` are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (terminator already removed)
    pub fn push_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => {}
            other => tracing::trace!("Ignoring unknown SSE field: {}", other),
        }

        None
    }

    /// Flush a message left open when the connection closed
    pub fn finish(&mut self) -> Option<SseMessage> {
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }

        Some(SseMessage {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.clone(),
        })
    }
}

/// Turn a raw byte stream into SSE messages, preserving arrival order
pub fn parse_sse_stream<S, E>(byte_stream: S) -> SseStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(byte_stream);
        let mut buffer = LineBuffer::with_capacity(4096);
        let mut decoder = SseDecoder::new();

        while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(bytes) => {
                    buffer.extend(&bytes);

                    while let Some(line) = buffer.next_line() {
                        if let Some(message) = decoder.push_line(&line) {
                            yield Ok(message);
                        }
                    }
                }
                Err(e) => {
                    yield Err(anyhow::anyhow!("Stream error: {}", e));
                    return;
                }
            }
        }

        if let Some(line) = buffer.take_remainder() {
            if let Some(message) = decoder.push_line(&line) {
                yield Ok(message);
            }
        }
        if let Some(message) = decoder.finish() {
            yield Ok(message);
        }
    })
}
