//! Session manager readiness gate
//!
//! Some FUSE runtimes need a session manager on the node before they can
//! serve a mount. The plugin requests one by labeling the node, then waits
//! for the manager's socket file to appear in its work directory.

use crate::cluster::label_keys::{ENABLED, SESSION_MANAGER};
use crate::cluster::{LabelDelta, NodeLabeler};
use crate::config::schema::SessionManagerConfig;
use crate::error::{CsiError, CsiResult};
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

/// File the session manager creates once it is serving
pub const READY_FILE: &str = "sessmgrd.sock";

/// Label the node for a session manager and wait until it is ready
pub async fn prepare_session_manager(
    labeler: &mut NodeLabeler,
    work_dir: &Path,
    settings: &SessionManagerConfig,
) -> CsiResult<()> {
    labeler
        .apply(&LabelDelta::new().add(SESSION_MANAGER, ENABLED))
        .await?;

    let ready_file = work_dir.join(READY_FILE);
    info!("Checking existence of file {}", ready_file.display());
    wait_for_file(&ready_file, settings.max_attempts, settings.poll_interval()).await
}

/// Check for `path` up to `max_attempts` times, `interval` apart
async fn wait_for_file(path: &Path, max_attempts: u32, interval: Duration) -> CsiResult<()> {
    for _ in 0..max_attempts {
        match tokio::fs::metadata(path).await {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!("fail to stat sessmgr socket file {}: {}", path.display(), e),
        }
        tokio::time::sleep(interval).await;
    }

    Err(CsiError::Timeout("SessMgr Pod to be ready".to_string()))
}
