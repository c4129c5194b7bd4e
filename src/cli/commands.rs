//! Command implementations

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::adapters::detect_hardware_accels;
use crate::app::container::{AppContainer, DefaultAppContainer};
use crate::app::export_queue::{ExportEvent, ExportQueue};
use crate::cli::args::{EncodersArgs, EventFormat, ExportArgs, PlanArgs};
use crate::domain::model::{JobDescriptor, JobId, JobSnapshot, JobStatus, VideoCodecFamily};
use crate::domain::rules::ClipClassifier;
use crate::planner::{encoder_for, ExportPlan};
use crate::utils::Utils;

/// Read and validate a job descriptor file
pub fn load_job(path: &Path) -> Result<JobDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let descriptor: JobDescriptor = serde_json::from_str(&content)
        .with_context(|| format!("Invalid job file {}", path.display()))?;
    descriptor
        .normalized()
        .with_context(|| format!("Invalid job in {}", path.display()))
}

#[derive(Serialize)]
struct TimestampedEvent<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a ExportEvent,
}

/// One output line for an event
pub fn format_event(event: &ExportEvent, format: EventFormat) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    match format {
        EventFormat::Json => serde_json::to_string(&TimestampedEvent { timestamp, event })
            .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e)),
        EventFormat::Text => {
            let job = event.job();
            let mut line = format!(
                "{} [{}] {:<13} {:>3}%",
                timestamp,
                job.id.short(),
                event.name(),
                job.progress
            );
            if let Some(step) = &job.step {
                line.push_str(&format!(" {}", step));
            }
            if let ExportEvent::JobFailed { error, .. } = event {
                line.push_str(&format!(" error: {}", error));
            }
            if event.is_terminal() {
                line.push_str(&format!(" -> {}", job.output_path.display()));
            }
            line
        }
    }
}

/// Cancel every given job when Ctrl-C arrives
fn cancel_on_ctrl_c(queue: ExportQueue, ids: Vec<JobId>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, cancelling exports");
        for id in ids {
            if let Err(e) = queue.cancel(id).await {
                info!(job_id = %id, error = %e, "Job not cancelled");
            }
        }
    })
}

/// Execute the export command
pub async fn export(container: &DefaultAppContainer, args: ExportArgs) -> Result<()> {
    let descriptors = args
        .jobs
        .iter()
        .map(|path| load_job(path))
        .collect::<Result<Vec<_>>>()?;

    let queue = container.start_export_queue();
    let mut events = queue.subscribe();

    let mut ids = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        ids.push(queue.submit(descriptor).await?);
    }
    let interrupt = cancel_on_ctrl_c(queue.clone(), ids.clone());

    let mut pending: HashSet<JobId> = ids.iter().copied().collect();
    let mut finished: Vec<JobSnapshot> = Vec::with_capacity(ids.len());
    while !pending.is_empty() {
        match events.recv().await {
            Ok(event) => {
                if !pending.contains(&event.job_id()) {
                    continue;
                }
                println!("{}", format_event(&event, args.events));
                if event.is_terminal() {
                    pending.remove(&event.job_id());
                    finished.push(event.job().clone());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event output fell behind");
                for id in pending.clone() {
                    if let Some(snapshot) = queue.settled(id).await? {
                        pending.remove(&id);
                        finished.push(snapshot);
                    }
                }
            }
            Err(RecvError::Closed) => bail!("Export queue stopped unexpectedly"),
        }
    }

    interrupt.abort();
    queue.shutdown().await?;

    let failed = finished
        .iter()
        .filter(|job| job.status != JobStatus::Completed)
        .count();
    for job in &finished {
        if let (Some(started), Some(done)) = (job.started_at, job.finished_at) {
            let elapsed = (done - started).to_std().unwrap_or_default();
            info!(
                job_id = %job.id,
                status = %job.status,
                elapsed = %Utils::format_duration(elapsed),
                "Export job finished"
            );
        }
    }
    if failed > 0 {
        bail!("{} of {} export jobs did not complete", failed, finished.len());
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClipReport {
    clip_id: String,
    reencode: bool,
    reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanReport {
    clips: Vec<ClipReport>,
    plan: ExportPlan,
}

/// Execute the plan command
pub async fn plan(container: &DefaultAppContainer, args: PlanArgs) -> Result<()> {
    let descriptor = load_job(&args.job)?;
    let ctx = container.render_context(&descriptor.settings).await;
    let temp_root = container.config().temp_root();
    let plan = ExportPlan::build(JobId::new(), &descriptor, &temp_root, &ctx)
        .context("Failed to plan export")?;

    let clips = descriptor
        .clips()
        .iter()
        .map(|clip| {
            let reason = ClipClassifier::reencode_reason(clip);
            ClipReport {
                clip_id: clip.id.clone(),
                reencode: reason.is_some(),
                reason: reason.map(|r| r.to_string()),
            }
        })
        .collect();

    let report = PlanReport { clips, plan };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Serialize)]
struct EncoderReport {
    accel: String,
    h264: &'static str,
    h265: &'static str,
}

/// Execute the encoders command
pub async fn encoders(container: &DefaultAppContainer, args: EncodersArgs) -> Result<()> {
    let ffmpeg = &container.config().ffmpeg_path;
    let accels = detect_hardware_accels(ffmpeg)
        .await
        .with_context(|| format!("Failed to query encoders from {}", ffmpeg.display()))?;

    let report: Vec<EncoderReport> = accels
        .iter()
        .map(|accel| EncoderReport {
            accel: accel.to_string(),
            h264: encoder_for(*accel, VideoCodecFamily::H264),
            h265: encoder_for(*accel, VideoCodecFamily::H265),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entry in &report {
            println!("{:<9} {:<12} {}", entry.accel, entry.h264, entry.h265);
        }
    }
    Ok(())
}
