//! ffmpeg execution adapter
//!
//! Spawns the ffmpeg binary with `tokio::process`, turns its `-progress`
//! output into [`ProcessProgress`] callbacks and kills it when the process
//! handle is terminated or the watchdog fires.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::engine::progress::ProgressParser;
use crate::engine::registry::ProcessHandle;
use crate::error::{ExportError, ExportResult};
use crate::ports::{Invocation, ProcessRunner, ProgressFn};

/// Number of stderr lines kept for error messages
pub const STDERR_TAIL_LINES: usize = 20;

/// Runs ffmpeg as a child process
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    program: PathBuf,
    timeout: Option<Duration>,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Terminated,
    TimedOut(Duration),
}

impl FfmpegRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill processes that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    async fn watchdog(timeout: Option<Duration>) -> Duration {
        match timeout {
            Some(after) => {
                tokio::time::sleep(after).await;
                after
            }
            None => std::future::pending().await,
        }
    }
}

async fn read_progress(
    stdout: Option<ChildStdout>,
    mut parser: ProgressParser,
    on_progress: ProgressFn<'_>,
) {
    let Some(stdout) = stdout else {
        return;
    };
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(progress) = parser.feed_line(&line) {
            on_progress(progress);
        }
    }
}

/// Keep the last lines of stderr; ffmpeg puts the failure reason there
async fn drain_stderr(stderr: Option<ChildStderr>) -> String {
    let Some(stderr) = stderr else {
        return String::new();
    };
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

#[async_trait]
impl ProcessRunner for FfmpegRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        handle: &ProcessHandle,
        on_progress: ProgressFn<'_>,
    ) -> ExportResult<()> {
        if handle.is_terminated() {
            return Err(ExportError::Cancelled);
        }

        debug!(
            job_id = %handle.job_id(),
            process_id = handle.id(),
            label = %invocation.label,
            args = ?invocation.args,
            "Spawning ffmpeg"
        );

        let mut child = Command::new(&self.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExportError::Spawn {
                program: self.program_name(),
                source,
            })?;

        let stderr_task = tokio::spawn(drain_stderr(child.stderr.take()));
        let stdout = child.stdout.take();
        let parser = ProgressParser::new(invocation.expected_duration);

        let outcome = tokio::select! {
            status = async {
                read_progress(stdout, parser, on_progress).await;
                child.wait().await
            } => Outcome::Exited(status),
            _ = handle.terminated() => Outcome::Terminated,
            after = Self::watchdog(self.timeout) => Outcome::TimedOut(after),
        };

        match outcome {
            Outcome::Exited(Ok(status)) if status.success() => {
                info!(job_id = %handle.job_id(), label = %invocation.label, "ffmpeg finished");
                Ok(())
            }
            Outcome::Exited(Ok(status)) => {
                let diagnostics = stderr_task.await.unwrap_or_default();
                warn!(
                    job_id = %handle.job_id(),
                    label = %invocation.label,
                    code = ?status.code(),
                    "ffmpeg failed"
                );
                Err(ExportError::ProcessExit {
                    code: status.code(),
                    diagnostics,
                })
            }
            Outcome::Exited(Err(source)) => Err(ExportError::Spawn {
                program: self.program_name(),
                source,
            }),
            Outcome::Terminated => {
                if let Err(e) = child.kill().await {
                    warn!(job_id = %handle.job_id(), error = %e, "Failed to kill ffmpeg");
                }
                info!(job_id = %handle.job_id(), label = %invocation.label, "ffmpeg terminated");
                Err(ExportError::Cancelled)
            }
            Outcome::TimedOut(after) => {
                if let Err(e) = child.kill().await {
                    warn!(job_id = %handle.job_id(), error = %e, "Failed to kill ffmpeg");
                }
                warn!(
                    job_id = %handle.job_id(),
                    label = %invocation.label,
                    timeout_secs = after.as_secs(),
                    "ffmpeg timed out"
                );
                Err(ExportError::Timeout { after })
            }
        }
    }
}
