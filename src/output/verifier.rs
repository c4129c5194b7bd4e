//! Output verification

use std::path::Path;

use tracing::{info, warn};

use crate::error::{ExportError, ExportResult};
use crate::output::{VerificationResult, DEFAULT_MIN_OUTPUT_BYTES};

/// Checks that the final file exists and is not a stub
#[derive(Debug, Clone, Copy)]
pub struct OutputVerifier {
    min_bytes: u64,
}

impl Default for OutputVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_OUTPUT_BYTES)
    }
}

impl OutputVerifier {
    pub fn new(min_bytes: u64) -> Self {
        Self { min_bytes }
    }

    pub fn min_bytes(&self) -> u64 {
        self.min_bytes
    }

    /// Verify the output file after a successful concatenation
    pub async fn verify(&self, path: &Path) -> ExportResult<VerificationResult> {
        let size_bytes = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) | Err(_) => {
                warn!(output = %path.display(), "Output file is missing");
                return Err(Self::too_small());
            }
        };

        if size_bytes < self.min_bytes {
            warn!(
                output = %path.display(),
                size_bytes,
                min_bytes = self.min_bytes,
                "Output file is smaller than the minimum"
            );
            return Err(Self::too_small());
        }

        info!(output = %path.display(), size_bytes, "Output verified");
        Ok(VerificationResult {
            path: path.to_path_buf(),
            size_bytes,
        })
    }

    fn too_small() -> ExportError {
        ExportError::OutputInvalid("output file missing or too small".to_string())
    }
}
