//! Fluid CSI node plugin
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use fluid_csi_node::cli::{Cli, Commands};
use fluid_csi_node::config::{Config, ConfigManager};
use fluid_csi_node::error::CsiResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            eprintln!("{} {}", style("Code:").yellow(), e.code());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CsiResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    if let Some(node_id) = cli.node_id {
        config.node.id = node_id;
    }

    init_tracing(cli.verbose, &config);
    debug!("Loaded config from {}", config_manager.path().display());

    match cli.command {
        Commands::Publish(args) => fluid_csi_node::cli::commands::publish(args, &config).await,
        Commands::Unpublish(args) => fluid_csi_node::cli::commands::unpublish(args, &config).await,
        Commands::Stage(args) => fluid_csi_node::cli::commands::stage(args, &config).await,
        Commands::Unstage(args) => fluid_csi_node::cli::commands::unstage(args, &config).await,
        Commands::Capabilities => fluid_csi_node::cli::commands::capabilities().await,
        Commands::Config(args) => {
            fluid_csi_node::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// Initialize logging: 0 = info, 1 = debug, 2+ = trace
fn init_tracing(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("fluid_csi_node=info"),
        1 => EnvFilter::new("fluid_csi_node=debug"),
        _ => EnvFilter::new("fluid_csi_node=trace"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}
