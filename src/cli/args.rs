//! CLI argument definitions using clap derive

use crate::node::{AccessMode, VolumeContext, VolumeRequest};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Fluid CSI node plugin
///
/// Runs one node lifecycle call against this host: bind mounts Fluid
/// dataset volumes into containers and labels the node for FUSE scheduling.
#[derive(Parser, Debug)]
#[command(name = "fluid-csi-node")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FLUID_CSI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the node this plugin runs on
    #[arg(long, global = true, env = "NODE_ID")]
    pub node_id: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bind a staged volume into a container's target path
    Publish(PublishArgs),

    /// Unmount a volume from a container's target path
    Unpublish(UnpublishArgs),

    /// Prepare this node for a volume (labels the node for the FUSE daemon)
    Stage(StageArgs),

    /// Release this node's claim on a volume
    Unstage(UnstageArgs),

    /// List node service capabilities
    Capabilities,

    /// Show configuration
    Config(ConfigArgs),
}

/// Requested access mode
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessModeArg {
    SingleNodeWriter,
    SingleNodeReaderOnly,
    MultiNodeReaderOnly,
    MultiNodeSingleWriter,
    MultiNodeMultiWriter,
}

impl From<AccessModeArg> for AccessMode {
    fn from(mode: AccessModeArg) -> Self {
        match mode {
            AccessModeArg::SingleNodeWriter => Self::SingleNodeWriter,
            AccessModeArg::SingleNodeReaderOnly => Self::SingleNodeReaderOnly,
            AccessModeArg::MultiNodeReaderOnly => Self::MultiNodeReaderOnly,
            AccessModeArg::MultiNodeSingleWriter => Self::MultiNodeSingleWriter,
            AccessModeArg::MultiNodeMultiWriter => Self::MultiNodeMultiWriter,
        }
    }
}

/// Arguments for the publish command
#[derive(Parser, Debug)]
pub struct PublishArgs {
    /// Volume id (persistent volume name)
    #[arg(long)]
    pub volume_id: String,

    /// Path where the volume must appear
    #[arg(long)]
    pub target_path: PathBuf,

    /// Volume context attribute (KEY=VALUE, repeatable)
    #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub context: Vec<(String, String)>,

    /// Access mode of the volume capability
    #[arg(long, value_enum)]
    pub access_mode: Option<AccessModeArg>,
}

impl PublishArgs {
    /// Build the lifecycle request
    pub fn request(&self) -> VolumeRequest {
        let mut request = VolumeRequest::new(&self.volume_id)
            .with_target(&self.target_path)
            .with_context(context(&self.context));
        if let Some(mode) = self.access_mode {
            request = request.with_access_mode(mode.into());
        }
        request
    }
}

/// Arguments for the unpublish command
#[derive(Parser, Debug)]
pub struct UnpublishArgs {
    /// Volume id (persistent volume name)
    #[arg(long)]
    pub volume_id: String,

    /// Path the volume was published to
    #[arg(long)]
    pub target_path: PathBuf,
}

impl UnpublishArgs {
    /// Build the lifecycle request
    pub fn request(&self) -> VolumeRequest {
        VolumeRequest::new(&self.volume_id).with_target(&self.target_path)
    }
}

/// Arguments for the stage command
#[derive(Parser, Debug)]
pub struct StageArgs {
    /// Volume id (persistent volume name)
    #[arg(long)]
    pub volume_id: String,

    /// Volume context attribute (KEY=VALUE, repeatable)
    #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub context: Vec<(String, String)>,
}

impl StageArgs {
    /// Build the lifecycle request
    pub fn request(&self) -> VolumeRequest {
        VolumeRequest::new(&self.volume_id).with_context(context(&self.context))
    }
}

/// Arguments for the unstage command
#[derive(Parser, Debug)]
pub struct UnstageArgs {
    /// Volume id (persistent volume name)
    #[arg(long)]
    pub volume_id: String,
}

impl UnstageArgs {
    /// Build the lifecycle request
    pub fn request(&self) -> VolumeRequest {
        VolumeRequest::new(&self.volume_id)
    }
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

fn context(pairs: &[(String, String)]) -> VolumeContext {
    pairs.iter().cloned().collect()
}

/// Parse a single KEY=VALUE pair
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{}`", s))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}
