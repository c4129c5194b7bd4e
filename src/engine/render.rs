//! Per-clip render into an intermediate segment

use std::path::PathBuf;

use tracing::{debug, info};

use crate::domain::model::JobId;
use crate::engine::registry::ProcessRegistry;
use crate::error::ExportResult;
use crate::planner::RenderCommand;
use crate::ports::{ProcessRunner, ProgressFn};

/// Run one render command under a fresh process handle
///
/// The handle is released whatever the outcome, so a failed or cancelled
/// render never lingers in the registry.
pub async fn render_clip(
    runner: &dyn ProcessRunner,
    registry: &ProcessRegistry,
    job_id: JobId,
    command: &RenderCommand,
    on_progress: ProgressFn<'_>,
) -> ExportResult<PathBuf> {
    let handle = registry.register(job_id);
    debug!(
        job_id = %job_id,
        clip_id = %command.clip_id,
        filter_graph = %command.filter_graph,
        "Rendering clip"
    );

    let result = runner
        .run(&command.invocation(), &handle, on_progress)
        .await;
    registry.release(&handle);
    result?;

    info!(job_id = %job_id, clip_id = %command.clip_id, output = %command.output.display(), "Clip rendered");
    Ok(command.output.clone())
}
