//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Args, ValueEnum};

/// How events are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventFormat {
    /// One human-readable line per event
    Text,
    /// One JSON object per line
    Json,
}

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Job descriptor files (JSON)
    #[arg(required = true)]
    pub jobs: Vec<PathBuf>,

    /// Jobs processed at the same time
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Directory for intermediate segments
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Kill any single ffmpeg process after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Event output format
    #[arg(long, value_enum, default_value = "text")]
    pub events: EventFormat,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Job descriptor file (JSON)
    pub job: PathBuf,

    /// Directory intermediate segments would be written to
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,
}

/// Arguments for the encoders command
#[derive(Args, Debug)]
pub struct EncodersArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
