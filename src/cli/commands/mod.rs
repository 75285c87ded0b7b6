//! CLI command implementations

pub mod capabilities;
pub mod config;
pub mod volume;

pub use capabilities::execute as capabilities;
pub use config::execute as config;
pub use volume::{publish, stage, unpublish, unstage};
