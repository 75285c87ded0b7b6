//! Metadata store backed by `kubectl`
//!
//! Reads objects with `kubectl get ... -o json` and patches node labels with
//! a JSON merge patch, so only the keys in a delta are sent.

use crate::cluster::{LabelDelta, MetadataStore, NodeRecord, RuntimeIdentity, RuntimeInfo};
use crate::error::{CsiError, CsiResult};
use crate::mount::command::{render, CommandRunner};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// PVC label marking a claim as a Fluid dataset volume
const DATASET_LABEL: &str = "fluid.io/dataset";
/// PVC labels pointing at a dataset in another namespace
const REFERRING_NAME_LABEL: &str = "fluid.io/dataset.referring-name";
const REFERRING_NAMESPACE_LABEL: &str = "fluid.io/dataset.referring-namespace";
/// Clean policy of runtimes that do not set one
const DEFAULT_CLEAN_POLICY: &str = "OnRuntimeDeleted";

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Node {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct PersistentVolume {
    #[serde(default)]
    spec: PersistentVolumeSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistentVolumeSpec {
    claim_ref: Option<ObjectReference>,
}

#[derive(Debug, Deserialize)]
struct ObjectReference {
    #[serde(default)]
    namespace: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct PersistentVolumeClaim {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    status: DatasetStatus,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetStatus {
    #[serde(default)]
    runtimes: Vec<RuntimeRef>,
}

#[derive(Debug, Deserialize)]
struct RuntimeRef {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(rename = "type")]
    runtime_type: String,
}

#[derive(Debug, Deserialize)]
struct Runtime {
    #[serde(default)]
    spec: RuntimeSpec,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimeSpec {
    #[serde(default)]
    fuse: FuseSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuseSpec {
    #[serde(default)]
    clean_policy: String,
}

/// Metadata store that shells out to `kubectl`
pub struct KubectlStore {
    runner: Arc<dyn CommandRunner>,
    kubectl: String,
}

impl KubectlStore {
    /// Create a store running `kubectl` through `runner`
    pub fn new(runner: Arc<dyn CommandRunner>, kubectl: impl Into<String>) -> Self {
        Self {
            runner,
            kubectl: kubectl.into(),
        }
    }

    /// Run kubectl and decode its JSON output
    async fn exec_json<T: DeserializeOwned>(
        &self,
        kind: &str,
        name: &str,
        args: Vec<String>,
    ) -> CsiResult<T> {
        let out = self.runner.run(&self.kubectl, &args).await?;

        if !out.success() {
            if out.output.contains("NotFound") {
                return Err(CsiError::not_found(kind, name));
            }
            return Err(CsiError::CommandExecution {
                command: render(&self.kubectl, &args),
                code: out.code,
                output: out.output.trim_end().to_string(),
            });
        }

        Ok(serde_json::from_str(&out.output)?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> CsiResult<T> {
        let mut args = vec!["get".to_string(), kind.to_string(), name.to_string()];
        if let Some(namespace) = namespace {
            args.push("-n".to_string());
            args.push(namespace.to_string());
        }
        args.push("-o".to_string());
        args.push("json".to_string());
        self.exec_json(kind, name, args).await
    }
}

#[async_trait]
impl MetadataStore for KubectlStore {
    async fn get_node(&self, node_id: &str) -> CsiResult<NodeRecord> {
        let node: Node = self.get("node", node_id, None).await?;
        Ok(NodeRecord::new(node.metadata.name, node.metadata.labels))
    }

    async fn patch_node_labels(
        &self,
        node: &NodeRecord,
        delta: &LabelDelta,
    ) -> CsiResult<NodeRecord> {
        let patch = serde_json::to_string(&delta.to_merge_patch())?;
        debug!("Patching node {} with {}", node.name, patch);

        let args = vec![
            "patch".to_string(),
            "node".to_string(),
            node.name.clone(),
            "--type=merge".to_string(),
            "-p".to_string(),
            patch,
            "-o".to_string(),
            "json".to_string(),
        ];
        let patched: Node = self.exec_json("node", &node.name, args).await?;
        Ok(NodeRecord::new(patched.metadata.name, patched.metadata.labels))
    }

    async fn get_runtime_info(&self, identity: &RuntimeIdentity) -> CsiResult<RuntimeInfo> {
        let dataset: Dataset = self
            .get("dataset", &identity.name, Some(&identity.namespace))
            .await?;

        // A dataset that is not bound to a runtime has nothing to clean up
        let runtime_ref = dataset
            .status
            .runtimes
            .into_iter()
            .next()
            .ok_or_else(|| CsiError::not_found("runtime", identity.to_string()))?;

        let runtime_identity = RuntimeIdentity::new(
            non_empty_or(runtime_ref.namespace, &identity.namespace),
            non_empty_or(runtime_ref.name, &identity.name),
        );
        let kind = format!("{}runtime", runtime_ref.runtime_type);
        let runtime: Runtime = self
            .get(&kind, &runtime_identity.name, Some(&runtime_identity.namespace))
            .await?;

        let policy = runtime.spec.fuse.clean_policy;
        Ok(RuntimeInfo {
            identity: runtime_identity,
            runtime_type: runtime_ref.runtime_type,
            fuse_clean_policy: non_empty_or(policy, DEFAULT_CLEAN_POLICY),
        })
    }

    async fn get_runtime_identity_by_volume_id(
        &self,
        volume_id: &str,
    ) -> CsiResult<RuntimeIdentity> {
        let pv: PersistentVolume = self.get("persistentvolume", volume_id, None).await?;
        let claim = pv.spec.claim_ref.ok_or_else(|| {
            CsiError::Store(format!("pv {} has unexpected nil claimRef", volume_id))
        })?;

        let pvc: PersistentVolumeClaim = self
            .get("persistentvolumeclaim", &claim.name, Some(&claim.namespace))
            .await?;
        let labels = &pvc.metadata.labels;
        if !labels.contains_key(DATASET_LABEL) {
            return Err(CsiError::Store(format!(
                "pv {} is not bound to a fluid dataset",
                volume_id
            )));
        }

        match (
            labels.get(REFERRING_NAMESPACE_LABEL),
            labels.get(REFERRING_NAME_LABEL),
        ) {
            (Some(namespace), Some(name)) => Ok(RuntimeIdentity::new(namespace, name)),
            _ => Ok(RuntimeIdentity::new(claim.namespace, pvc.metadata.name)),
        }
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
