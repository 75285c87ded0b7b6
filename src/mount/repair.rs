//! Broken mount point cleanup

use crate::error::{CsiError, CsiResult};
use crate::mount::gateway::MountGateway;
use crate::mount::probe::{is_transport_disconnected, MountProbe};
use std::io;
use std::path::Path;
use tracing::info;

/// Unmount `mount_point` if its FUSE daemon is gone (`stat` fails with
/// ENOTCONN). A missing or healthy path is left alone.
pub async fn clean_up_broken_mount_point(
    probe: &dyn MountProbe,
    gateway: &MountGateway,
    mount_point: &Path,
) -> CsiResult<()> {
    let err = match probe.stat(mount_point).await {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => e,
    };

    if is_transport_disconnected(&err) {
        gateway.unmount(mount_point).await.map_err(|e| {
            CsiError::context(format!("failed to unmount {}", mount_point.display()), e)
        })?;
        info!(
            "Found broken mount point {}, successfully umounted it",
            mount_point.display()
        );
        return Ok(());
    }

    Err(CsiError::io(
        format!("failed to stat {}", mount_point.display()),
        err,
    ))
}
