mod buffering;
mod sse_parser;

pub use buffering::LineBuffer;
pub use sse_parser::{parse_sse_stream, SseDecoder, SseMessage, SseStream};
