use pipeflow_canvas::{CanvasStore, MemoryCanvas};
use pipeflow_stream::Debouncer;
use pipeflow_types::FlowNode;
use std::sync::Arc;

use crate::config::RenderConfig;

/// Print a progress line for the streaming node on every settled canvas change
///
/// Bursts of revisions inside the debounce delay collapse into one redraw.
pub async fn watch_canvas(canvas: Arc<MemoryCanvas>, config: RenderConfig) {
    let mut revisions = canvas.subscribe();
    let mut debouncer = Debouncer::new(config.debounce());

    while revisions.changed().await.is_ok() {
        let canvas = Arc::clone(&canvas);
        let width = config.preview_chars;
        debouncer.call(async move {
            for node in canvas.nodes().iter().filter(|n| n.is_streaming()) {
                eprintln!("{}", progress_line(node, width));
            }
        });
    }
}

/// Final per-node output once the run is over
pub fn print_summary(canvas: &MemoryCanvas, width: usize) {
    for node in canvas.nodes() {
        if let Some(stream) = node.stream_state.as_ref().filter(|s| !s.content.is_empty()) {
            eprintln!(
                "  {:<24} {}",
                node.data.name,
                tail(&stream.content, width)
            );
        }
    }
}

fn progress_line(node: &FlowNode, width: usize) -> String {
    let content = node
        .stream_state
        .as_ref()
        .map(|s| s.content.as_str())
        .unwrap_or_default();
    format!("▸ {} [{}] {}", node.data.name, node.kind, tail(content, width))
}

/// Last `width` characters of `text` on one line
fn tail(text: &str, width: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    let count = flat.chars().count();
    if count <= width {
        return flat;
    }
    let skipped: String = flat.chars().skip(count - width).collect();
    format!("…{}", skipped)
}
