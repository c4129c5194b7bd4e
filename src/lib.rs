//! ATACUT export orchestrator library
//!
//! Turns timeline export jobs into ffmpeg invocations. Clips that can be
//! remuxed are stream-copied; clips with effects, trims, transitions or other
//! adjustments are rendered individually and the pieces concatenated.
//! Jobs run through an [`app::ExportQueue`] that bounds concurrency, reports
//! progress as events and cleans up every intermediate file.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod filters;
pub mod output;
pub mod planner;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use app::{ExportEvent, ExportQueue, QueueSettings};
pub use config::ExporterConfig;
pub use domain::model::{Clip, ExportSettings, JobDescriptor, JobId, JobSnapshot, JobStatus};
pub use error::{ExportError, ExportResult};
