//! Node service
//!
//! - `request`: lifecycle request types and volume context keys
//! - `sessmgr`: session manager readiness gate
//! - `server`: publish, unpublish, stage and unstage

pub mod request;
pub mod sessmgr;
pub mod server;

pub use request::{attrs, mount_source, AccessMode, VolumeContext, VolumeRequest};
pub use server::{NodeCapability, NodeServer};
