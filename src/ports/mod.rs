// Ports - Interface definitions (contracts)

use async_trait::async_trait;

use crate::domain::model::HardwareAccel;
use crate::engine::progress::ProcessProgress;
use crate::engine::registry::ProcessHandle;
use crate::error::ExportResult;

/// One call of the external media binary
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Short description for logs ("render clip c1", "concat")
    pub label: String,
    /// Arguments after the program name
    pub args: Vec<String>,
    /// Expected output duration in seconds, used to derive a percentage
    pub expected_duration: Option<f64>,
}

impl Invocation {
    pub fn new(label: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            label: label.into(),
            args,
            expected_duration: None,
        }
    }

    pub fn with_expected_duration(mut self, seconds: f64) -> Self {
        if seconds.is_finite() && seconds > 0.0 {
            self.expected_duration = Some(seconds);
        }
        self
    }

    /// Last argument, which is the output path for every command built here
    pub fn output(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

/// Callback receiving progress from a running process
pub type ProgressFn<'a> = &'a (dyn Fn(ProcessProgress) + Send + Sync);

/// Port for running the external media binary
///
/// Implementations resolve once the process has exited. A non-zero exit is
/// reported as `ExportError::ProcessExit`, termination through the handle as
/// `ExportError::Cancelled`.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        handle: &ProcessHandle,
        on_progress: ProgressFn<'_>,
    ) -> ExportResult<()>;
}

/// Port for discovering hardware encoder support
#[async_trait]
pub trait EncoderProbe: Send + Sync {
    /// Accelerations usable on this machine; software is always included
    async fn available_accels(&self) -> ExportResult<Vec<HardwareAccel>>;
}
