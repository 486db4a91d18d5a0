pub mod buffer_utils;
pub mod batching;
pub mod reconciler;
pub mod debounce;

pub use buffer_utils::{parse_sse_stream, LineBuffer, SseDecoder, SseMessage, SseStream};
pub use batching::{until_due, BatcherStats, EventBatcher};
pub use reconciler::{merge_tool_calls, Reconciler, ToolCallMerge};
pub use debounce::Debouncer;
