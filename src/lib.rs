//! Fluid CSI node plugin
//!
//! Publishes Fluid dataset volumes into containers by bind mounting the
//! runtime's FUSE mount point, and labels the node so the runtime's FUSE
//! daemon is scheduled where volumes are staged.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod mount;
pub mod node;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CsiError, CsiResult};
