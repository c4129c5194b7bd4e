// Application layer - Export queue and wiring

pub mod container;
pub mod export_queue;

// Re-export application types
pub use container::{AppContainer, DefaultAppContainer};
pub use export_queue::{ExportEvent, ExportQueue, QueueSettings};
