//! Output file preparation, verification and temp artifact cleanup

use std::path::PathBuf;

use serde::Serialize;

pub mod cleanup;
pub mod verifier;
pub mod writer;

pub use cleanup::{remove_artifacts, CleanupReport};
pub use verifier::OutputVerifier;
pub use writer::OutputWriter;

/// Smallest output considered a real file unless configured otherwise
pub const DEFAULT_MIN_OUTPUT_BYTES: u64 = 1000;

/// Outcome of output verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Verified output path
    pub path: PathBuf,
    /// Size on disk in bytes
    pub size_bytes: u64,
}
