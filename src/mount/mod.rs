//! Host mount handling
//!
//! - `probe`: mount state of a path
//! - `command`: external process execution
//! - `gateway`: mount, umount and the Fluid check scripts
//! - `repair`: cleanup of disconnected FUSE mount points

pub mod command;
pub mod gateway;
pub mod probe;
pub mod repair;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use gateway::MountGateway;
pub use probe::{HostMountProbe, MountProbe, MountState};
pub use repair::clean_up_broken_mount_point;
