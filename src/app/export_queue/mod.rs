//! Export queue and job lifecycle manager
//!
//! [`ExportQueue`] is a cheap, cloneable handle. A single manager task owns
//! the FIFO of waiting jobs, the job table and the number of running jobs;
//! handles talk to it over a command channel and workers report back over a
//! second channel, so every state change happens in one place.
//!
//! Terminal events are emitted only after the job's temp artifacts were
//! removed, so a subscriber that sees `JobCompleted`, `JobFailed` or
//! `JobCancelled` can rely on the work directory being gone.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::domain::model::{
    ExportJob, ExportStep, JobDescriptor, JobId, JobSnapshot, JobStatus, TempArtifact,
};
use crate::engine::registry::ProcessRegistry;
use crate::error::{ExportError, ExportResult};
use crate::filters::Canvas;
use crate::output::{remove_artifacts, OutputVerifier, OutputWriter, DEFAULT_MIN_OUTPUT_BYTES};
use crate::ports::{EncoderProbe, ProcessRunner};
use crate::utils::path::absolutize;

mod worker;

pub use worker::JobOutcome;

/// Default capacity of the event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Tunables of the export queue
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Jobs processed at the same time
    pub max_concurrent: usize,
    /// Root under which per-job working directories are created
    pub temp_root: PathBuf,
    /// Smallest acceptable output file
    pub min_output_bytes: u64,
    /// Canvas used to place text overlays
    pub canvas: Canvas,
    pub event_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            temp_root: std::env::temp_dir(),
            min_output_bytes: DEFAULT_MIN_OUTPUT_BYTES,
            canvas: Canvas::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Job lifecycle notification; every variant carries the job state after
/// the change
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ExportEvent {
    JobQueued { job: JobSnapshot },
    JobStarted { job: JobSnapshot },
    JobProgress { job: JobSnapshot },
    JobCompleted { job: JobSnapshot },
    JobFailed { job: JobSnapshot, error: String },
    JobCancelled { job: JobSnapshot },
}

impl ExportEvent {
    pub fn job(&self) -> &JobSnapshot {
        match self {
            ExportEvent::JobQueued { job }
            | ExportEvent::JobStarted { job }
            | ExportEvent::JobProgress { job }
            | ExportEvent::JobCompleted { job }
            | ExportEvent::JobFailed { job, .. }
            | ExportEvent::JobCancelled { job } => job,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job().id
    }

    /// Last event a job ever produces
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportEvent::JobCompleted { .. }
                | ExportEvent::JobFailed { .. }
                | ExportEvent::JobCancelled { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportEvent::JobQueued { .. } => "job-queued",
            ExportEvent::JobStarted { .. } => "job-started",
            ExportEvent::JobProgress { .. } => "job-progress",
            ExportEvent::JobCompleted { .. } => "job-completed",
            ExportEvent::JobFailed { .. } => "job-failed",
            ExportEvent::JobCancelled { .. } => "job-cancelled",
        }
    }

    fn terminal_for(job: &ExportJob) -> Option<Self> {
        let snapshot = job.snapshot();
        match job.status() {
            JobStatus::Completed => Some(ExportEvent::JobCompleted { job: snapshot }),
            JobStatus::Failed => Some(ExportEvent::JobFailed {
                error: job.error().unwrap_or("export failed").to_string(),
                job: snapshot,
            }),
            JobStatus::Cancelled => Some(ExportEvent::JobCancelled { job: snapshot }),
            JobStatus::Queued | JobStatus::Processing => None,
        }
    }
}

enum Command {
    Submit {
        descriptor: JobDescriptor,
        reply: oneshot::Sender<ExportResult<JobId>>,
    },
    Cancel {
        id: JobId,
        reply: oneshot::Sender<ExportResult<()>>,
    },
    Snapshot {
        id: JobId,
        reply: oneshot::Sender<ExportResult<JobSnapshot>>,
    },
    List {
        reply: oneshot::Sender<Vec<JobSnapshot>>,
    },
    Counts {
        reply: oneshot::Sender<(usize, usize)>,
    },
    Settled {
        id: JobId,
        reply: oneshot::Sender<ExportResult<Option<JobSnapshot>>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Messages from worker and cleanup tasks to the manager
pub(crate) enum Report {
    Progress {
        id: JobId,
        progress: u8,
        step: Option<ExportStep>,
    },
    Artifact {
        id: JobId,
        artifact: TempArtifact,
    },
    Finished {
        id: JobId,
        outcome: JobOutcome,
    },
    Cleaned {
        id: JobId,
    },
}

/// Collaborators shared by every worker
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub runner: Arc<dyn ProcessRunner>,
    pub probe: Arc<dyn EncoderProbe>,
    pub registry: ProcessRegistry,
    pub writer: OutputWriter,
    pub verifier: OutputVerifier,
    pub canvas: Canvas,
}

/// Handle to the export queue
#[derive(Clone)]
pub struct ExportQueue {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ExportEvent>,
    registry: ProcessRegistry,
}

impl ExportQueue {
    /// Start the manager task on the current tokio runtime
    pub fn spawn(
        settings: QueueSettings,
        runner: Arc<dyn ProcessRunner>,
        probe: Arc<dyn EncoderProbe>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (reports, report_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let registry = ProcessRegistry::new();

        let ctx = WorkerContext {
            runner,
            probe,
            registry: registry.clone(),
            writer: OutputWriter::new(absolutize(&settings.temp_root)),
            verifier: OutputVerifier::new(settings.min_output_bytes),
            canvas: settings.canvas,
        };

        let manager = Manager {
            max_concurrent: settings.max_concurrent.max(1),
            jobs: HashMap::new(),
            queue: VecDeque::new(),
            settled: HashSet::new(),
            running: 0,
            shutting_down: false,
            shutdown_waiters: Vec::new(),
            events: events.clone(),
            reports,
            ctx,
        };
        tokio::spawn(manager.run(command_rx, report_rx));

        info!(max_concurrent = settings.max_concurrent, "Export queue started");
        Self {
            commands,
            events,
            registry,
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> ExportResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| ExportError::QueueClosed)?;
        rx.await.map_err(|_| ExportError::QueueClosed)
    }

    /// Validate and enqueue a job
    pub async fn submit(&self, descriptor: JobDescriptor) -> ExportResult<JobId> {
        let descriptor = descriptor.normalized()?;
        self.request(|reply| Command::Submit { descriptor, reply })
            .await?
    }

    /// Cancel a queued or processing job
    pub async fn cancel(&self, id: JobId) -> ExportResult<()> {
        self.request(|reply| Command::Cancel { id, reply }).await?
    }

    pub async fn snapshot(&self, id: JobId) -> ExportResult<JobSnapshot> {
        self.request(|reply| Command::Snapshot { id, reply }).await?
    }

    /// Every known job in submission order
    pub async fn jobs(&self) -> ExportResult<Vec<JobSnapshot>> {
        self.request(|reply| Command::List { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.events.subscribe()
    }

    /// Jobs waiting for a free slot
    pub async fn queued_count(&self) -> ExportResult<usize> {
        self.request(|reply| Command::Counts { reply })
            .await
            .map(|(queued, _)| queued)
    }

    /// Jobs being processed, including their cleanup
    pub async fn active_count(&self) -> ExportResult<usize> {
        self.request(|reply| Command::Counts { reply })
            .await
            .map(|(_, active)| active)
    }

    /// External processes currently running for any job
    pub fn process_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Final snapshot once the job's terminal event was sent
    pub async fn settled(&self, id: JobId) -> ExportResult<Option<JobSnapshot>> {
        self.request(|reply| Command::Settled { id, reply }).await?
    }

    /// Resolve once the job's terminal event was sent
    pub async fn wait_for(&self, id: JobId) -> ExportResult<JobSnapshot> {
        let mut events = self.subscribe();
        loop {
            if let Some(snapshot) = self.settled(id).await? {
                return Ok(snapshot);
            }
            loop {
                match events.recv().await {
                    Ok(event) if event.job_id() == id && event.is_terminal() => {
                        return Ok(event.job().clone());
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(job_id = %id, skipped, "Event stream lagged");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(ExportError::QueueClosed)
                    }
                }
            }
        }
    }

    /// Cancel everything and wait for running jobs to finish their cleanup
    pub async fn shutdown(&self) -> ExportResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

struct Manager {
    max_concurrent: usize,
    jobs: HashMap<JobId, ExportJob>,
    queue: VecDeque<JobId>,
    /// Jobs whose terminal event was sent
    settled: HashSet<JobId>,
    running: usize,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
    events: broadcast::Sender<ExportEvent>,
    reports: mpsc::UnboundedSender<Report>,
    ctx: WorkerContext,
}

impl Manager {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut reports: mpsc::UnboundedReceiver<Report>,
    ) {
        let mut handles_open = true;
        loop {
            tokio::select! {
                command = commands.recv(), if handles_open => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        handles_open = false;
                        self.begin_shutdown();
                    }
                },
                Some(report) = reports.recv() => self.handle_report(report),
            }

            if self.shutting_down && self.running == 0 {
                for waiter in self.shutdown_waiters.drain(..) {
                    let _ = waiter.send(());
                }
                info!("Export queue stopped");
                break;
            }
        }
    }

    fn emit(&self, event: ExportEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { descriptor, reply } => {
                let _ = reply.send(self.submit(descriptor));
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(id));
            }
            Command::Snapshot { id, reply } => {
                let snapshot = self
                    .jobs
                    .get(&id)
                    .map(ExportJob::snapshot)
                    .ok_or(ExportError::UnknownJob(id));
                let _ = reply.send(snapshot);
            }
            Command::List { reply } => {
                let mut jobs: Vec<JobSnapshot> = self.jobs.values().map(ExportJob::snapshot).collect();
                jobs.sort_by_key(|job| job.queued_at);
                let _ = reply.send(jobs);
            }
            Command::Counts { reply } => {
                let _ = reply.send((self.queue.len(), self.running));
            }
            Command::Settled { id, reply } => {
                let settled = match self.jobs.get(&id) {
                    Some(job) if self.settled.contains(&id) => Ok(Some(job.snapshot())),
                    Some(_) => Ok(None),
                    None => Err(ExportError::UnknownJob(id)),
                };
                let _ = reply.send(settled);
            }
            Command::Shutdown { reply } => {
                self.shutdown_waiters.push(reply);
                self.begin_shutdown();
            }
        }
    }

    fn submit(&mut self, descriptor: JobDescriptor) -> ExportResult<JobId> {
        if self.shutting_down {
            return Err(ExportError::QueueClosed);
        }
        let job = ExportJob::new(descriptor);
        let id = job.id();
        info!(
            job_id = %id,
            output = %job.descriptor().output_path.display(),
            clips = job.descriptor().clips().len(),
            "Export job queued"
        );
        self.emit(ExportEvent::JobQueued {
            job: job.snapshot(),
        });
        self.jobs.insert(id, job);
        self.queue.push_back(id);
        self.pump();
        Ok(id)
    }

    fn cancel(&mut self, id: JobId) -> ExportResult<()> {
        let job = self.jobs.get_mut(&id).ok_or(ExportError::UnknownJob(id))?;
        match job.status() {
            JobStatus::Queued => {
                self.queue.retain(|queued| *queued != id);
                job.cancel();
                info!(job_id = %id, "Queued export job cancelled");
                let event = ExportEvent::JobCancelled {
                    job: job.snapshot(),
                };
                self.settled.insert(id);
                self.emit(event);
            }
            JobStatus::Processing => {
                job.cancel();
                let processes = self.ctx.registry.terminate_job(id);
                info!(job_id = %id, processes, "Processing export job cancelled");
            }
            status => return Err(ExportError::NotCancellable { id, status }),
        }
        Ok(())
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!(
            queued = self.queue.len(),
            running = self.running,
            "Export queue shutting down"
        );

        let queued: Vec<JobId> = self.queue.drain(..).collect();
        for id in queued {
            if let Some(job) = self.jobs.get_mut(&id) {
                job.cancel();
                let event = ExportEvent::JobCancelled {
                    job: job.snapshot(),
                };
                self.settled.insert(id);
                self.emit(event);
            }
        }

        let processing: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.status() == JobStatus::Processing)
            .map(ExportJob::id)
            .collect();
        for id in processing {
            if let Some(job) = self.jobs.get_mut(&id) {
                job.cancel();
            }
            self.ctx.registry.terminate_job(id);
        }
    }

    /// Start queued jobs while slots are free
    fn pump(&mut self) {
        while !self.shutting_down && self.running < self.max_concurrent {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            if !job.start() {
                continue;
            }
            self.running += 1;
            let descriptor = job.descriptor().clone();
            info!(job_id = %id, running = self.running, "Export job started");
            let event = ExportEvent::JobStarted {
                job: job.snapshot(),
            };
            self.emit(event);
            worker::spawn(self.ctx.clone(), id, descriptor, self.reports.clone());
        }
    }

    fn handle_report(&mut self, report: Report) {
        match report {
            Report::Progress { id, progress, step } => {
                let Some(job) = self.jobs.get_mut(&id) else {
                    return;
                };
                if job.advance(progress, step) {
                    let event = ExportEvent::JobProgress {
                        job: job.snapshot(),
                    };
                    self.emit(event);
                }
            }
            Report::Artifact { id, artifact } => {
                if let Some(job) = self.jobs.get_mut(&id) {
                    if !job.record_artifact(artifact.clone()) {
                        debug!(job_id = %id, path = %artifact.path.display(), "Artifact not recorded");
                    }
                }
            }
            Report::Finished { id, outcome } => self.finish(id, outcome),
            Report::Cleaned { id } => {
                self.running = self.running.saturating_sub(1);
                self.ctx.registry.forget_job(id);
                if let Some(event) = self.jobs.get(&id).and_then(ExportEvent::terminal_for) {
                    self.settled.insert(id);
                    self.emit(event);
                }
                self.pump();
            }
        }
    }

    fn finish(&mut self, id: JobId, outcome: JobOutcome) {
        let Some(job) = self.jobs.get_mut(&id) else {
            error!(job_id = %id, "Finished report for unknown job");
            return;
        };

        match outcome.result {
            Ok(()) => {
                if job.complete() {
                    info!(job_id = %id, output = %job.descriptor().output_path.display(), "Export job completed");
                }
            }
            Err(err) if err.is_cancellation() => {
                job.cancel();
            }
            Err(err) => {
                if job.fail(err.to_string()) {
                    error!(job_id = %id, error = %err, "Export job failed");
                }
            }
        }

        if job.status() == JobStatus::Cancelled {
            info!(job_id = %id, "Export job stopped after cancellation");
        }

        let artifacts = job.take_artifacts();
        let partial_output = (outcome.output_written && job.status() != JobStatus::Completed)
            .then(|| absolutize(&job.descriptor().output_path));
        let writer = self.ctx.writer.clone();
        let reports = self.reports.clone();

        tokio::spawn(async move {
            let report = remove_artifacts(artifacts).await;
            if let Some(output) = partial_output {
                writer.remove_partial_output(&output).await;
            }
            if report.failed > 0 {
                warn!(job_id = %id, failed = report.failed, "Cleanup left artifacts behind");
            }
            debug!(job_id = %id, removed = report.removed, missing = report.missing, "Cleanup finished");
            let _ = reports.send(Report::Cleaned { id });
        });
    }
}
