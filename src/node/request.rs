//! Lifecycle request types

use crate::cluster::RuntimeIdentity;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Volume context keys set by the Fluid controller
pub mod attrs {
    /// Host path where the runtime's FUSE daemon serves the dataset
    pub const FLUID_PATH: &str = "fluid_path";
    /// Filesystem type tag of the FUSE mount
    pub const MOUNT_TYPE: &str = "mount_type";
    /// Optional directory below the fluid path to expose
    pub const SUB_PATH: &str = "subpath";
    /// Runtime namespace hint
    pub const RUNTIME_NAMESPACE: &str = "runtime_namespace";
    /// Runtime name hint
    pub const RUNTIME_NAME: &str = "runtime_name";
    /// Work directory of a session manager the FUSE daemon depends on
    pub const SESSMGR_WORKDIR: &str = "eac_sessmgr_workdir";

    /// Mount type used when the context does not set one
    pub const DEFAULT_MOUNT_TYPE: &str = "fuse.alluxio-fuse";
}

/// String attributes attached to a volume
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeContext(HashMap<String, String>);

impl VolumeContext {
    /// Raw value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value of `key`, treating an empty string as unset
    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Backing path of the FUSE mount
    pub fn fluid_path(&self) -> Option<&str> {
        self.non_empty(attrs::FLUID_PATH)
    }

    /// Mount type tag, defaulted when absent
    pub fn mount_type(&self) -> &str {
        self.non_empty(attrs::MOUNT_TYPE)
            .unwrap_or(attrs::DEFAULT_MOUNT_TYPE)
    }

    /// Sub path below the fluid path
    pub fn sub_path(&self) -> Option<&str> {
        self.non_empty(attrs::SUB_PATH)
    }

    /// Session manager work directory, if this mount type needs one
    pub fn session_manager_work_dir(&self) -> Option<&str> {
        self.non_empty(attrs::SESSMGR_WORKDIR)
    }

    /// Runtime identity when both namespace and name hints are present
    pub fn runtime_hint(&self) -> Option<RuntimeIdentity> {
        match (self.get(attrs::RUNTIME_NAMESPACE), self.get(attrs::RUNTIME_NAME)) {
            (Some(namespace), Some(name)) => Some(RuntimeIdentity::new(namespace, name)),
            _ => None,
        }
    }
}

impl From<HashMap<String, String>> for VolumeContext {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VolumeContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Requested access mode of a volume capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    SingleNodeWriter,
    SingleNodeReaderOnly,
    MultiNodeReaderOnly,
    MultiNodeSingleWriter,
    MultiNodeMultiWriter,
}

impl AccessMode {
    /// Whether the bind mount must be read-only. Only the multi-node
    /// reader mode selects `ro`; single-node readers get a writable bind.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::MultiNodeReaderOnly)
    }
}

/// Input of a lifecycle call
#[derive(Debug, Clone, Default)]
pub struct VolumeRequest {
    /// Cluster-unique volume id (the persistent volume name)
    pub volume_id: String,
    /// Where the volume must appear; empty for stage and unstage
    pub target_path: PathBuf,
    /// Attributes from the persistent volume
    pub context: VolumeContext,
    /// Access mode, absent when the caller sent no capability
    pub access_mode: Option<AccessMode>,
}

impl VolumeRequest {
    /// Create a request for `volume_id`
    pub fn new(volume_id: impl Into<String>) -> Self {
        Self {
            volume_id: volume_id.into(),
            ..Self::default()
        }
    }

    /// Set the target path
    pub fn with_target(mut self, target_path: impl Into<PathBuf>) -> Self {
        self.target_path = target_path.into();
        self
    }

    /// Set the volume context
    pub fn with_context(mut self, context: VolumeContext) -> Self {
        self.context = context;
        self
    }

    /// Set the access mode
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = Some(mode);
        self
    }

    /// Whether the bind mount must be read-only
    pub fn read_only(&self) -> bool {
        self.access_mode.is_some_and(|m| m.is_read_only())
    }
}

/// Path to bind: the fluid path, or the sub path beneath it
pub fn mount_source(fluid_path: &str, sub_path: Option<&str>) -> PathBuf {
    let base = Path::new(fluid_path);
    match sub_path {
        Some(sub) => base.join(sub.trim_start_matches('/')),
        None => base.to_path_buf(),
    }
}
