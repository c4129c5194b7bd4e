//! Concat manifest handling and the final concatenation step

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::model::JobId;
use crate::engine::registry::ProcessRegistry;
use crate::error::{ExportError, ExportResult};
use crate::planner::ConcatCommand;
use crate::ports::{ProcessRunner, ProgressFn};
use crate::utils::path::{absolutize, escape_concat_path};

/// Manifest text for the concat demuxer: one `file '<path>'` line per segment
pub fn manifest_contents(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|segment| format!("file '{}'", escape_concat_path(&absolutize(segment))))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write the manifest, creating its directory if needed
pub async fn write_manifest(path: &Path, segments: &[PathBuf]) -> ExportResult<()> {
    if segments.is_empty() {
        return Err(ExportError::InvalidJob(
            "cannot concatenate zero segments".to_string(),
        ));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExportError::fs(parent, e))?;
    }
    tokio::fs::write(path, manifest_contents(segments))
        .await
        .map_err(|e| ExportError::fs(path, e))?;
    debug!(manifest = %path.display(), segments = segments.len(), "Concat manifest written");
    Ok(())
}

async fn remove_manifest(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(manifest = %path.display(), error = %e, "Failed to remove concat manifest"),
    }
}

/// Write the manifest, run the concatenation and remove the manifest again
///
/// The manifest is removed on success and on failure alike.
pub async fn concatenate(
    runner: &dyn ProcessRunner,
    registry: &ProcessRegistry,
    job_id: JobId,
    command: &ConcatCommand,
    segments: &[PathBuf],
    on_progress: ProgressFn<'_>,
) -> ExportResult<()> {
    write_manifest(&command.manifest, segments).await?;

    let handle = registry.register(job_id);
    let result = runner
        .run(&command.invocation(), &handle, on_progress)
        .await;
    registry.release(&handle);
    remove_manifest(&command.manifest).await;

    result?;
    info!(
        job_id = %job_id,
        mode = ?command.mode,
        segments = segments.len(),
        output = %command.output.display(),
        "Segments concatenated"
    );
    Ok(())
}
