//! Cluster metadata access
//!
//! The node plugin reads and patches a handful of objects in the cluster:
//! its own node (labels drive FUSE and session manager scheduling), the
//! persistent volume behind a volume id, and the dataset runtime that owns
//! it. [`MetadataStore`] is the seam; [`KubectlStore`] is the production
//! implementation.

pub mod kubectl;
pub mod labels;
pub mod resolver;

pub use kubectl::KubectlStore;
pub use labels::NodeLabeler;
pub use resolver::resolve_runtime_identity;

use crate::error::{CsiError, CsiResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Label keys and values the plugin writes on its node
pub mod label_keys {
    /// Prefix of the per-runtime FUSE scheduling label
    pub const FUSE_PREFIX: &str = "fluid.io/f-";
    /// Requests a session manager instance on this node
    pub const SESSION_MANAGER: &str = "fluid.io/sessmgr";
    /// Value of every label the plugin adds
    pub const ENABLED: &str = "true";
}

/// Snapshot of this node's metadata
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// Node object name
    pub name: String,
    /// Labels at the time of the read
    pub labels: BTreeMap<String, String>,
    /// When this snapshot was taken
    pub fetched_at: DateTime<Utc>,
}

impl NodeRecord {
    /// Create a record stamped with the current time
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            labels,
            fetched_at: Utc::now(),
        }
    }
}

/// A single label change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOp {
    Add { key: String, value: String },
    Delete { key: String },
}

/// Label changes applied to a node as one patch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDelta {
    ops: Vec<LabelOp>,
}

impl LabelDelta {
    /// Create an empty delta
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite `key=value`
    pub fn add(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(LabelOp::Add {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Remove `key`
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(LabelOp::Delete { key: key.into() });
        self
    }

    /// Whether the delta changes nothing
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Operations in the order they were added
    pub fn ops(&self) -> &[LabelOp] {
        &self.ops
    }

    /// JSON merge patch touching only the keys in this delta; `null` deletes
    pub fn to_merge_patch(&self) -> Value {
        let mut labels = Map::new();
        for op in &self.ops {
            match op {
                LabelOp::Add { key, value } => {
                    labels.insert(key.clone(), Value::String(value.clone()));
                }
                LabelOp::Delete { key } => {
                    labels.insert(key.clone(), Value::Null);
                }
            }
        }
        serde_json::json!({ "metadata": { "labels": labels } })
    }

    /// Apply the delta to a label set in place
    pub fn apply_to(&self, labels: &mut BTreeMap<String, String>) {
        for op in &self.ops {
            match op {
                LabelOp::Add { key, value } => {
                    labels.insert(key.clone(), value.clone());
                }
                LabelOp::Delete { key } => {
                    labels.remove(key);
                }
            }
        }
    }
}

impl fmt::Display for LabelDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .ops
            .iter()
            .map(|op| match op {
                LabelOp::Add { key, value } => format!("+{}={}", key, value),
                LabelOp::Delete { key } => format!("-{}", key),
            })
            .collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}

/// Namespace and name of the dataset runtime that owns a volume
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeIdentity {
    pub namespace: String,
    pub name: String,
}

impl RuntimeIdentity {
    /// Create an identity
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Node label that schedules this runtime's FUSE pod
    pub fn fuse_label_key(&self) -> String {
        format!("{}{}-{}", label_keys::FUSE_PREFIX, self.namespace, self.name)
    }
}

impl fmt::Display for RuntimeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// When a runtime's FUSE pod is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanPolicy {
    /// As soon as the last volume using it is unstaged
    OnDemand,
    /// Only when the runtime itself is deleted
    OnRuntimeDeleted,
}

impl CleanPolicy {
    /// Parse the value stored on the runtime object
    pub fn parse(value: &str) -> CsiResult<Self> {
        match value {
            "OnDemand" => Ok(Self::OnDemand),
            "OnRuntimeDeleted" => Ok(Self::OnRuntimeDeleted),
            other => Err(CsiError::UnknownCleanPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for CleanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnDemand => write!(f, "OnDemand"),
            Self::OnRuntimeDeleted => write!(f, "OnRuntimeDeleted"),
        }
    }
}

/// Runtime details the unstage path needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub identity: RuntimeIdentity,
    /// Runtime engine, e.g. "alluxio" or "jindo"
    pub runtime_type: String,
    /// Raw FUSE clean policy as stored on the runtime
    pub fuse_clean_policy: String,
}

/// Cluster metadata operations used by the node plugin
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read a node by name
    async fn get_node(&self, node_id: &str) -> CsiResult<NodeRecord>;

    /// Apply `delta` to the node's labels, returning the patched node
    async fn patch_node_labels(&self, node: &NodeRecord, delta: &LabelDelta)
        -> CsiResult<NodeRecord>;

    /// Read the runtime owning a dataset
    async fn get_runtime_info(&self, identity: &RuntimeIdentity) -> CsiResult<RuntimeInfo>;

    /// Find the dataset a persistent volume belongs to
    async fn get_runtime_identity_by_volume_id(&self, volume_id: &str)
        -> CsiResult<RuntimeIdentity>;
}
