//! CLI module for the exporter
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ConfigOverrides;

pub mod args;
pub mod commands;

/// ATACUT export orchestrator
///
/// Renders timeline export jobs through ffmpeg, stream-copying untouched
/// clips and re-encoding only the clips that need it.
#[derive(Parser, Debug)]
#[command(name = "atacut-export")]
#[command(about = "ATACUT export orchestrator - smart stream-copy/re-encode exports through ffmpeg")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "ATACUT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// ffmpeg binary to run
    #[arg(long, global = true)]
    pub ffmpeg: Option<PathBuf>,

    /// Logging level or filter directive
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one or more export jobs and stream their events
    Export(args::ExportArgs),
    /// Show how a job would be exported without running ffmpeg
    Plan(args::PlanArgs),
    /// List the hardware encoders ffmpeg offers on this machine
    Encoders(args::EncodersArgs),
}

impl Cli {
    /// Command-line layer of the configuration
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            ffmpeg_path: self.ffmpeg.clone(),
            log_level: self.log_level.clone(),
            json_logs: self.json_logs.then_some(true),
            ..ConfigOverrides::default()
        };
        match &self.command {
            Commands::Export(args) => {
                overrides.max_concurrent_exports = args.max_concurrent;
                overrides.temp_dir = args.temp_dir.clone();
                overrides.process_timeout_secs = args.timeout;
            }
            Commands::Plan(args) => overrides.temp_dir = args.temp_dir.clone(),
            Commands::Encoders(_) => {}
        }
        overrides
    }
}
