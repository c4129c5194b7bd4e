//! Export engine
//!
//! Runs the steps of an export plan against a [`crate::ports::ProcessRunner`]:
//! per-clip renders, the final concatenation, and the progress math that
//! maps both onto one job percentage.

pub mod concat;
pub mod progress;
pub mod registry;
pub mod render;

pub use concat::{concatenate, manifest_contents, write_manifest};
pub use progress::{ProcessProgress, ProgressParser};
pub use registry::{ProcessHandle, ProcessRegistry};
pub use render::render_clip;
