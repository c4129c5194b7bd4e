//! Execution of one export job

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{Report, WorkerContext};
use crate::domain::model::{ExportStep, JobDescriptor, JobId, TempArtifact};
use crate::engine::progress::{
    concat_phase_percent, fast_path_percent, render_phase_percent, ProcessProgress,
    RENDER_PHASE_PERCENT,
};
use crate::engine::{concatenate, render_clip};
use crate::error::{ExportError, ExportResult};
use crate::planner::{resolve_encoder, ExportPlan, ExportStrategy, RenderContext};
use crate::utils::Utils;

/// How a worker ended
#[derive(Debug)]
pub struct JobOutcome {
    pub result: ExportResult<()>,
    /// The final concatenation was started, so the output path may hold a
    /// partial file
    pub output_written: bool,
}

/// Sends worker updates to the manager
struct Reporter {
    id: JobId,
    tx: mpsc::UnboundedSender<Report>,
}

impl Reporter {
    fn progress(&self, progress: u8, step: Option<ExportStep>) {
        let _ = self.tx.send(Report::Progress {
            id: self.id,
            progress,
            step,
        });
    }

    fn artifact(&self, artifact: TempArtifact) {
        let _ = self.tx.send(Report::Artifact {
            id: self.id,
            artifact,
        });
    }

    fn finished(&self, outcome: JobOutcome) {
        let _ = self.tx.send(Report::Finished {
            id: self.id,
            outcome,
        });
    }
}

/// Run a job on its own task; a panicking worker still reports an outcome
pub(super) fn spawn(
    ctx: WorkerContext,
    id: JobId,
    descriptor: JobDescriptor,
    tx: mpsc::UnboundedSender<Report>,
) {
    let reporter = Arc::new(Reporter { id, tx });
    tokio::spawn(async move {
        let inner = {
            let reporter = Arc::clone(&reporter);
            tokio::spawn(async move { execute(&ctx, id, &descriptor, &reporter).await })
        };
        let outcome = match inner.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(job_id = %id, error = %join_error, "Export worker panicked");
                JobOutcome {
                    result: Err(ExportError::WorkerPanicked(join_error.to_string())),
                    output_written: true,
                }
            }
        };
        reporter.finished(outcome);
    });
}

async fn execute(
    ctx: &WorkerContext,
    id: JobId,
    descriptor: &JobDescriptor,
    reporter: &Reporter,
) -> JobOutcome {
    let mut output_written = false;
    let result = run(ctx, id, descriptor, reporter, &mut output_written).await;
    if let Err(err) = &result {
        debug!(job_id = %id, error = %err, "Export worker ended with error");
    }
    JobOutcome {
        result,
        output_written,
    }
}

fn ensure_running(ctx: &WorkerContext, id: JobId) -> ExportResult<()> {
    if ctx.registry.is_terminated(id) {
        return Err(ExportError::Cancelled);
    }
    Ok(())
}

async fn run(
    ctx: &WorkerContext,
    id: JobId,
    descriptor: &JobDescriptor,
    reporter: &Reporter,
    output_written: &mut bool,
) -> ExportResult<()> {
    let encoder = resolve_encoder(ctx.probe.as_ref(), &descriptor.settings).await;
    debug!(job_id = %id, encoder = encoder.name, "Encoder selected");
    let render_ctx = RenderContext {
        encoder,
        canvas: ctx.canvas,
    };
    let plan = ExportPlan::build(id, descriptor, ctx.writer.temp_root(), &render_ctx)?;

    let work_dir = ctx.writer.create_work_dir(id).await?;
    reporter.artifact(TempArtifact::directory(&work_dir));
    ctx.writer.ensure_output_directory(&plan.concat.output).await?;

    let runner = ctx.runner.as_ref();
    let total = plan.renders.len();
    for (index, command) in plan.renders.iter().enumerate() {
        ensure_running(ctx, id)?;
        reporter.progress(
            render_phase_percent(index, 0.0, total),
            Some(ExportStep::Rendering { index, total }),
        );
        reporter.artifact(TempArtifact::file(&command.output));

        let on_progress = |p: ProcessProgress| {
            reporter.progress(render_phase_percent(index, p.fraction(), total), None);
        };
        render_clip(runner, &ctx.registry, id, command, &on_progress).await?;
        reporter.progress(render_phase_percent(index + 1, 0.0, total), None);
    }

    ensure_running(ctx, id)?;
    let fast_path = plan.strategy == ExportStrategy::FastPath;
    let start = if fast_path { 0 } else { RENDER_PHASE_PERCENT as u8 };
    reporter.progress(start, Some(ExportStep::Concatenating));
    reporter.artifact(TempArtifact::file(plan.manifest()));

    *output_written = true;
    let on_progress = |p: ProcessProgress| {
        let percent = if fast_path {
            fast_path_percent(p.fraction())
        } else {
            concat_phase_percent(p.fraction())
        };
        reporter.progress(percent, None);
    };
    concatenate(runner, &ctx.registry, id, &plan.concat, &plan.segment_paths(), &on_progress).await?;

    let verified = ctx.verifier.verify(&plan.concat.output).await?;
    info!(
        job_id = %id,
        strategy = ?plan.strategy,
        renders = total,
        size = %Utils::format_file_size(verified.size_bytes),
        "Export finished"
    );
    Ok(())
}
