//! Error handling module for the export orchestrator

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::model::{JobId, JobStatus};

/// Main error type for export operations
#[derive(Error, Debug)]
pub enum ExportError {
    /// The external binary could not be launched
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external binary ran but exited unsuccessfully
    #[error("ffmpeg exited with {}: {diagnostics}", exit_code_label(.code))]
    ProcessExit {
        code: Option<i32>,
        diagnostics: String,
    },

    /// Manifest, temp directory or segment access failed
    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Deliberate termination requested by the caller
    #[error("Export cancelled")]
    Cancelled,

    /// Watchdog fired for a hung external process
    #[error("ffmpeg did not finish within {}s", .after.as_secs())]
    Timeout { after: Duration },

    /// Job descriptor rejected before queueing
    #[error("Invalid export job: {0}")]
    InvalidJob(String),

    /// Output produced by the external binary is unusable
    #[error("Output verification failed: {0}")]
    OutputInvalid(String),

    /// No job with this id was ever submitted
    #[error("Unknown export job: {0}")]
    UnknownJob(JobId),

    /// Job already reached a terminal state
    #[error("Export job {id} cannot be cancelled: already {status}")]
    NotCancellable { id: JobId, status: JobStatus },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker task ended without reporting an outcome
    #[error("Export worker stopped unexpectedly: {0}")]
    WorkerPanicked(String),

    /// The export queue task is no longer running
    #[error("Export queue is shut down")]
    QueueClosed,
}

impl ExportError {
    /// Wrap an I/O error with the path it concerns
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// True for the cancellation signal, which is not a job failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExportError::Cancelled)
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Result type alias for export operations
pub type ExportResult<T> = std::result::Result<T, ExportError>;
