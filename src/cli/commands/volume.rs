//! Volume lifecycle commands

use crate::cli::args::{PublishArgs, StageArgs, UnpublishArgs, UnstageArgs};
use crate::config::Config;
use crate::error::CsiResult;
use crate::node::NodeServer;
use console::style;

/// Execute the publish command
pub async fn publish(args: PublishArgs, config: &Config) -> CsiResult<()> {
    let server = NodeServer::from_config(config)?;
    server.publish_volume(&args.request()).await?;

    println!(
        "{} volume {} at {}",
        style("Published").green().bold(),
        args.volume_id,
        args.target_path.display()
    );
    Ok(())
}

/// Execute the unpublish command
pub async fn unpublish(args: UnpublishArgs, config: &Config) -> CsiResult<()> {
    let server = NodeServer::from_config(config)?;
    server.unpublish_volume(&args.request()).await?;

    println!(
        "{} volume {} from {}",
        style("Unpublished").green().bold(),
        args.volume_id,
        args.target_path.display()
    );
    Ok(())
}

/// Execute the stage command
pub async fn stage(args: StageArgs, config: &Config) -> CsiResult<()> {
    let server = NodeServer::from_config(config)?;
    server.stage_volume(&args.request()).await?;

    println!(
        "{} volume {} on node {}",
        style("Staged").green().bold(),
        args.volume_id,
        config.node.id
    );
    Ok(())
}

/// Execute the unstage command
pub async fn unstage(args: UnstageArgs, config: &Config) -> CsiResult<()> {
    let server = NodeServer::from_config(config)?;
    server.unstage_volume(&args.request()).await?;

    println!(
        "{} volume {} on node {}",
        style("Unstaged").green().bold(),
        args.volume_id,
        config.node.id
    );
    Ok(())
}
