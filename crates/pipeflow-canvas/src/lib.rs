pub mod store;
pub mod projector;

pub use store::{CanvasStore, MemoryCanvas};
pub use projector::CanvasProjector;
