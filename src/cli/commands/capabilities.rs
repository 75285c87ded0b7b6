//! Capabilities command - list node service capabilities

use crate::error::CsiResult;
use crate::node::NodeServer;

/// Execute the capabilities command
pub async fn execute() -> CsiResult<()> {
    for capability in NodeServer::capabilities() {
        println!("{}", capability);
    }
    Ok(())
}
