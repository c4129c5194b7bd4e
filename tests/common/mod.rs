//! Shared helpers for integration tests: a scripted process runner and job
//! builders

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use atacut_export::app::export_queue::{ExportEvent, ExportQueue, QueueSettings};
use atacut_export::domain::model::{Clip, ExportSettings, HardwareAccel, JobDescriptor, Track};
use atacut_export::engine::{ProcessHandle, ProcessProgress};
use atacut_export::error::{ExportError, ExportResult};
use atacut_export::ports::{EncoderProbe, Invocation, ProcessRunner, ProgressFn};

/// Bytes written to every output the fake produces
pub const FAKE_OUTPUT_BYTES: usize = 4096;

/// What the fake does for a matching invocation
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Report progress, write the output, exit 0 after `delay`
    Succeed { delay: Duration },
    /// Exit non-zero with a diagnostic line
    Fail { code: i32, stderr: String },
    /// Run until the handle is terminated
    Block,
    /// Exit 0 but leave a stub output behind
    TinyOutput,
}

/// One recorded call
#[derive(Debug, Clone)]
pub struct Call {
    pub label: String,
    pub args: Vec<String>,
    /// Concat manifest text as it was when ffmpeg would have read it
    pub manifest: Option<String>,
}

#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<(String, Behavior)>>,
    calls: Mutex<Vec<Call>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Use `behavior` for invocations whose label contains `label`
    pub fn on(self: &Arc<Self>, label: &str, behavior: Behavior) -> Arc<Self> {
        self.rules
            .lock()
            .unwrap()
            .push((label.to_string(), behavior));
        Arc::clone(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.label).collect()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, label: &str) -> Behavior {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| label.contains(pattern.as_str()))
            .map(|(_, behavior)| behavior.clone())
            .unwrap_or(Behavior::Succeed {
                delay: Duration::from_millis(5),
            })
    }

    fn record(&self, invocation: &Invocation) {
        let manifest = invocation
            .args
            .iter()
            .position(|a| a == "concat")
            .and_then(|i| invocation.args.get(i + 4))
            .and_then(|path| std::fs::read_to_string(path).ok());
        self.calls.lock().unwrap().push(Call {
            label: invocation.label.clone(),
            args: invocation.args.clone(),
            manifest,
        });
    }
}

fn write_output(invocation: &Invocation, bytes: usize) {
    if let Some(output) = invocation.output() {
        let output = Path::new(output);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(output, vec![0u8; bytes]).unwrap();
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        handle: &ProcessHandle,
        on_progress: ProgressFn<'_>,
    ) -> ExportResult<()> {
        if handle.is_terminated() {
            return Err(ExportError::Cancelled);
        }
        self.record(invocation);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let result = match self.behavior_for(&invocation.label) {
            Behavior::Succeed { delay } => {
                on_progress(ProcessProgress {
                    seconds: 0.0,
                    percent: Some(50.0),
                    finished: false,
                });
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        write_output(invocation, FAKE_OUTPUT_BYTES);
                        on_progress(ProcessProgress {
                            seconds: 0.0,
                            percent: Some(100.0),
                            finished: true,
                        });
                        Ok(())
                    }
                    _ = handle.terminated() => Err(ExportError::Cancelled),
                }
            }
            Behavior::Fail { code, stderr } => {
                // ffmpeg leaves a partial file behind before failing
                write_output(invocation, 10);
                Err(ExportError::ProcessExit {
                    code: Some(code),
                    diagnostics: stderr,
                })
            }
            Behavior::Block => {
                handle.terminated().await;
                Err(ExportError::Cancelled)
            }
            Behavior::TinyOutput => {
                write_output(invocation, 12);
                Ok(())
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Probe reporting a fixed set of accelerations
pub struct FixedProbe(pub Vec<HardwareAccel>);

#[async_trait]
impl EncoderProbe for FixedProbe {
    async fn available_accels(&self) -> ExportResult<Vec<HardwareAccel>> {
        Ok(self.0.clone())
    }
}

/// Temp root, output dir and a running queue
pub struct Harness {
    pub queue: ExportQueue,
    pub runner: Arc<FakeRunner>,
    pub temp_root: tempfile::TempDir,
    pub out_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(runner: Arc<FakeRunner>, max_concurrent: usize) -> Self {
        let temp_root = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let settings = QueueSettings {
            max_concurrent,
            temp_root: temp_root.path().to_path_buf(),
            ..QueueSettings::default()
        };
        let queue = ExportQueue::spawn(
            settings,
            runner.clone(),
            Arc::new(FixedProbe(vec![HardwareAccel::Software])),
        );
        Self {
            queue,
            runner,
            temp_root,
            out_dir,
        }
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.out_dir.path().join(name)
    }

    pub fn job(&self, name: &str, clips: Vec<Clip>) -> JobDescriptor {
        job(self.output(name), clips)
    }

    /// Entries left under the temp root
    pub fn temp_entries(&self) -> usize {
        std::fs::read_dir(self.temp_root.path()).unwrap().count()
    }
}

pub fn job(output: PathBuf, clips: Vec<Clip>) -> JobDescriptor {
    JobDescriptor {
        output_path: output,
        settings: ExportSettings::default(),
        tracks: vec![Track {
            id: "video-1".to_string(),
            clips,
        }],
    }
}

pub fn plain_clip(id: &str) -> Clip {
    Clip::media(id, format!("/media/{}.mp4", id), 5.0)
}

pub fn graded_clip(id: &str) -> Clip {
    let mut clip = plain_clip(id);
    clip.grading.brightness = 25.0;
    clip
}

/// Wait for the first event matching `pred`
pub async fn next_event<F>(events: &mut broadcast::Receiver<ExportEvent>, pred: F) -> ExportEvent
where
    F: Fn(&ExportEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Collect every event until the job's terminal event
pub async fn events_until_terminal(
    events: &mut broadcast::Receiver<ExportEvent>,
    id: atacut_export::JobId,
) -> Vec<ExportEvent> {
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.expect("event stream closed");
            if event.job_id() != id {
                continue;
            }
            let done = event.is_terminal();
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("timed out waiting for terminal event")
}
