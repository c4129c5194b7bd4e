//! ATACUT export orchestrator
//!
//! Command-line front end for the export queue.
//!
//! # Usage
//!
//! ```bash
//! atacut-export export job.json --events json
//! atacut-export plan job.json
//! atacut-export encoders
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use atacut_export::app::DefaultAppContainer;
use atacut_export::cli::{commands, Cli, Commands};
use atacut_export::config::ExporterConfig;
use atacut_export::utils::logging::init_logging;

/// Main entry point for the export CLI
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ExporterConfig::load(cli.config.as_deref(), &cli.overrides())
        .context("Failed to load configuration")?;
    init_logging(&config.logging_config()).context("Failed to initialise logging")?;
    debug!(?config, "Configuration resolved");

    let container = DefaultAppContainer::new(config);

    match cli.command {
        Commands::Export(args) => {
            info!(jobs = args.jobs.len(), "Executing export command");
            commands::export(&container, args).await?;
        }
        Commands::Plan(args) => {
            info!(job = %args.job.display(), "Executing plan command");
            commands::plan(&container, args).await?;
        }
        Commands::Encoders(args) => {
            info!("Executing encoders command");
            commands::encoders(&container, args).await?;
        }
    }

    Ok(())
}
