//! Volume lifecycle for a single node
//!
//! [`NodeServer`] implements publish, unpublish, stage and unstage. Every
//! operation is idempotent: the orchestrator retries failed calls with the
//! same arguments, and a call that already took effect succeeds again.
//!
//! Stage and unstage mutate the node's labels and are serialized by the
//! lock around [`NodeLabeler`]. Publish and unpublish only touch their own
//! target path and run without it.

use crate::cluster::label_keys::ENABLED;
use crate::cluster::{
    resolve_runtime_identity, CleanPolicy, KubectlStore, LabelDelta, MetadataStore, NodeLabeler,
};
use crate::config::schema::SessionManagerConfig;
use crate::config::Config;
use crate::error::{CsiError, CsiResult, ResultExt};
use crate::mount::{
    clean_up_broken_mount_point, HostMountProbe, MountGateway, MountProbe, MountState,
    SystemCommandRunner,
};
use crate::node::request::{mount_source, VolumeRequest};
use crate::node::sessmgr::prepare_session_manager;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Optional node service capabilities advertised to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCapability {
    StageUnstageVolume,
}

impl fmt::Display for NodeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageUnstageVolume => write!(f, "STAGE_UNSTAGE_VOLUME"),
        }
    }
}

/// Node-local volume lifecycle coordinator
pub struct NodeServer {
    probe: Arc<dyn MountProbe>,
    gateway: MountGateway,
    store: Arc<dyn MetadataStore>,
    labeler: Mutex<NodeLabeler>,
    session_manager: SessionManagerConfig,
}

impl NodeServer {
    /// Create a node server from its collaborators
    pub fn new(
        probe: Arc<dyn MountProbe>,
        gateway: MountGateway,
        store: Arc<dyn MetadataStore>,
        labeler: NodeLabeler,
        session_manager: SessionManagerConfig,
    ) -> Self {
        Self {
            probe,
            gateway,
            store,
            labeler: Mutex::new(labeler),
            session_manager,
        }
    }

    /// Create a node server wired to the host and `kubectl`
    pub fn from_config(config: &Config) -> CsiResult<Self> {
        if config.node.id.is_empty() {
            return Err(CsiError::InvalidArgument(
                "node id is not set (use --node-id or NODE_ID)".to_string(),
            ));
        }

        let runner = Arc::new(SystemCommandRunner::new());
        let store: Arc<dyn MetadataStore> =
            Arc::new(KubectlStore::new(runner.clone(), config.commands.kubectl.clone()));
        let gateway = MountGateway::new(runner, config.commands.clone());
        let labeler = NodeLabeler::new(config.node.id.clone(), store.clone(), &config.node);

        Ok(Self::new(
            Arc::new(HostMountProbe::new()),
            gateway,
            store,
            labeler,
            config.session_manager.clone(),
        ))
    }

    /// Bind the FUSE mount point into the container's target path
    pub async fn publish_volume(&self, req: &VolumeRequest) -> CsiResult<()> {
        info!(
            "NodePublishVolume: volume {} target {} context {:?}",
            req.volume_id,
            req.target_path.display(),
            req.context
        );
        let target = req.target_path.as_path();
        if target.as_os_str().is_empty() {
            return Err(CsiError::InvalidArgument("target_path is not set".to_string()));
        }

        let missing = match self.probe.probe(target).await {
            MountState::Mounted => {
                info!("It's already mounted to {}", target.display());
                return Ok(());
            }
            MountState::NotMounted => false,
            MountState::Missing => true,
            MountState::Corrupted(e) | MountState::Failed(e) => {
                return Err(CsiError::io(
                    format!("NodePublishVolume: stat targetPath {}", target.display()),
                    e,
                ));
            }
        };

        let read_only = req.read_only();
        if read_only {
            info!("Set the mount option readonly={}", read_only);
        }

        let fluid_path = req
            .context
            .fluid_path()
            .ok_or_else(|| CsiError::InvalidArgument("fluid_path is not set".to_string()))?;
        let mount_type = req.context.mount_type();
        let sub_path = req.context.sub_path();

        if missing {
            create_target_dir(target).await?;
            info!("MkdirAll successful. {}", target.display());
        }
        info!("Try to mount to {}", target.display());

        let source = mount_source(fluid_path, sub_path);
        self.gateway
            .wait_until_ready(Path::new(fluid_path), mount_type, sub_path)
            .await
            .with_context(|| "NodePublishVolume: mount point is not ready")?;

        self.gateway
            .bind_mount(&source, target, read_only)
            .await
            .with_context(|| format!("NodePublishVolume: volume {}", req.volume_id))
    }

    /// Unmount every layer bound on the target path, then remove it
    pub async fn unpublish_volume(&self, req: &VolumeRequest) -> CsiResult<()> {
        let target = req.target_path.as_path();
        if target.as_os_str().is_empty() {
            return Err(CsiError::InvalidArgument("target_path is not set".to_string()));
        }

        // The target may be bind mounted several times after mount point
        // recovery, so unmount until nothing is left.
        loop {
            match self.probe.probe(target).await {
                MountState::Mounted => {
                    debug!("umount:{}", target.display());
                    self.gateway.unmount(target).await.with_context(|| {
                        format!("NodeUnpublishVolume: umount targetPath {}", target.display())
                    })?;
                }
                MountState::NotMounted | MountState::Missing => {
                    debug!("umount:{} success", target.display());
                    break;
                }
                MountState::Corrupted(e) => {
                    debug!("targetPath {} is a corrupted mount: {}", target.display(), e);
                    break;
                }
                MountState::Failed(e) => {
                    return Err(CsiError::io(
                        format!("NodeUnpublishVolume: stat targetPath {}", target.display()),
                        e,
                    ));
                }
            }
        }

        match self.clean_up_mount_point(target).await {
            Ok(()) => debug!("Succeed in umounting {}", target.display()),
            Err(e) => warn!("Failed to clean up mount point {}: {}", target.display(), e),
        }
        Ok(())
    }

    /// Remove the target directory, unmounting it first if it is corrupted
    async fn clean_up_mount_point(&self, target: &Path) -> CsiResult<()> {
        match self.probe.probe(target).await {
            MountState::Missing => return Ok(()),
            MountState::NotMounted => {}
            MountState::Corrupted(_) => self.gateway.unmount(target).await?,
            MountState::Mounted => {
                return Err(CsiError::Internal(format!(
                    "{} is still mounted",
                    target.display()
                )));
            }
            MountState::Failed(e) => {
                return Err(CsiError::io(format!("stat {}", target.display()), e));
            }
        }

        match tokio::fs::remove_dir(target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CsiError::io(format!("removing {}", target.display()), e)),
        }
    }

    /// Label the node so the runtime's FUSE pod is scheduled here
    pub async fn stage_volume(&self, req: &VolumeRequest) -> CsiResult<()> {
        let mut labeler = self.labeler.lock().await;
        info!(
            "NodeStageVolume: Starting NodeStage with VolumeId: {}, and VolumeContext: {:?}",
            req.volume_id, req.context
        );

        if let Some(work_dir) = req.context.session_manager_work_dir() {
            prepare_session_manager(&mut labeler, Path::new(work_dir), &self.session_manager)
                .await
                .map_err(|e| {
                    error!("NodeStageVolume: fail to prepare SessMgr because: {}", e);
                    CsiError::context("NodeStageVolume: fail to prepare SessMgr", e)
                })?;
        }

        if let Some(fluid_path) = req.context.fluid_path() {
            let fluid_path = Path::new(fluid_path);
            if let Err(e) =
                clean_up_broken_mount_point(self.probe.as_ref(), &self.gateway, fluid_path).await
            {
                warn!(
                    "Ignoring error when cleaning up broken mount point {}: {}",
                    fluid_path.display(),
                    e
                );
            }
        }

        let identity =
            resolve_runtime_identity(self.store.as_ref(), Some(&req.context), &req.volume_id)
                .await
                .map_err(|e| {
                    error!(
                        "NodeStageVolume: can't get runtime namespace and name given (volumeContext: {:?}, volumeId: {}): {}",
                        req.context, req.volume_id, e
                    );
                    CsiError::context(
                        format!(
                            "NodeStageVolume: can't get namespace and name by volume id {}",
                            req.volume_id
                        ),
                        e,
                    )
                })?;

        let fuse_label_key = identity.fuse_label_key();
        labeler
            .apply(&LabelDelta::new().add(&fuse_label_key, ENABLED))
            .await
            .map_err(|e| {
                error!("NodeStageVolume: {}", e);
                CsiError::context("NodeStageVolume", e)
            })?;

        info!(
            "NodeStageVolume: NodeStage succeeded with VolumeId: {}, and added NodeLabel: {}",
            req.volume_id, fuse_label_key
        );
        Ok(())
    }

    /// Remove the FUSE scheduling label when the runtime's clean policy
    /// allows it and no container still uses the volume
    pub async fn unstage_volume(&self, req: &VolumeRequest) -> CsiResult<()> {
        let mut labeler = self.labeler.lock().await;
        let volume_id = req.volume_id.as_str();

        // Unstage requests carry no volume context
        let identity = match resolve_runtime_identity(self.store.as_ref(), None, volume_id).await {
            Ok(identity) => identity,
            Err(e) if e.is_not_found() => {
                warn!(
                    "NodeUnstageVolume: volume {} not found, maybe it's already cleaned up, ignore it",
                    volume_id
                );
                return Ok(());
            }
            Err(e) => {
                error!(
                    "NodeUnstageVolume: can't get runtime namespace and name given (volumeContext: nil, volumeId: {}): {}",
                    volume_id, e
                );
                return Err(CsiError::context(
                    format!(
                        "NodeUnstageVolume: can't get namespace and name by volume id {}",
                        volume_id
                    ),
                    e,
                ));
            }
        };

        let runtime_info = match self.store.get_runtime_info(&identity).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                warn!(
                    "NodeUnstageVolume: dataset or runtime {} not found, maybe it's already cleaned up",
                    identity
                );
                return Ok(());
            }
            Err(e) => {
                return Err(CsiError::context(
                    format!("NodeUnstageVolume: failed to get runtime info for {}", identity),
                    e,
                ));
            }
        };

        let clean_policy = CleanPolicy::parse(&runtime_info.fuse_clean_policy)?;
        info!(
            "Using {} clean policy for runtime {} in namespace {}",
            clean_policy, runtime_info.identity.name, runtime_info.identity.namespace
        );
        if clean_policy == CleanPolicy::OnRuntimeDeleted {
            return Ok(());
        }

        let in_use = self
            .gateway
            .is_volume_in_use(volume_id)
            .await
            .with_context(|| "NodeUnstageVolume: can't check mount in use")?;
        if in_use {
            return Err(CsiError::context(
                "NodeUnstageVolume: can't stop fuse cause it's in use",
                CsiError::VolumeInUse(volume_id.to_string()),
            ));
        }

        // Without the label the FUSE daemonset's node selector no longer
        // matches and the FUSE pod on this node is terminated.
        labeler
            .apply(&LabelDelta::new().delete(identity.fuse_label_key()))
            .await
            .map_err(|e| {
                error!("NodeUnstageVolume: {}", e);
                CsiError::context("NodeUnstageVolume", e)
            })?;

        Ok(())
    }

    /// Volume expansion is not supported
    pub async fn expand_volume(&self, _req: &VolumeRequest) -> CsiResult<()> {
        Err(CsiError::Unimplemented(String::new()))
    }

    /// Capabilities of this node service
    pub fn capabilities() -> Vec<NodeCapability> {
        debug!("Using default NodeGetCapabilities");
        vec![NodeCapability::StageUnstageVolume]
    }

    /// Drop the cached node record so the next label patch refetches it
    pub async fn invalidate_node_cache(&self) {
        self.labeler.lock().await.invalidate();
    }
}

async fn create_target_dir(target: &Path) -> CsiResult<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o750);
    builder
        .create(target)
        .await
        .map_err(|e| CsiError::io(format!("creating target path {}", target.display()), e))
}
