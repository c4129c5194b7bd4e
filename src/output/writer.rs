//! Output location handling

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::model::JobId;
use crate::error::{ExportError, ExportResult};
use crate::utils::path::job_work_dir;

/// Prepares the directories a job writes into
#[derive(Debug, Clone)]
pub struct OutputWriter {
    temp_root: PathBuf,
}

impl OutputWriter {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
        }
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Create `<temp_root>/atacut_<job id>` and return it
    pub async fn create_work_dir(&self, job_id: JobId) -> ExportResult<PathBuf> {
        let dir = job_work_dir(&self.temp_root, job_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ExportError::fs(&dir, e))?;
        debug!(job_id = %job_id, work_dir = %dir.display(), "Working directory created");
        Ok(dir)
    }

    /// Ensure the output's parent directory exists
    pub async fn ensure_output_directory(&self, output: &Path) -> ExportResult<()> {
        match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExportError::fs(parent, e)),
            _ => Ok(()),
        }
    }

    /// Delete a partially written output after a failed export
    pub async fn remove_partial_output(&self, output: &Path) {
        match tokio::fs::remove_file(output).await {
            Ok(()) => info!(output = %output.display(), "Partial output removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(output = %output.display(), error = %e, "Failed to remove partial output"),
        }
    }
}
