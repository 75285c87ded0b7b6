//! Node label patching with a cached node record
//!
//! The labeler owns the only long-lived mutable state of the plugin. Callers
//! hold it behind a lock for the whole read-then-patch sequence, which is
//! what keeps two concurrent label changes from losing one another.

use crate::cluster::{LabelDelta, MetadataStore, NodeRecord};
use crate::config::schema::NodeConfig;
use crate::error::{CsiError, CsiResult};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Applies label deltas to this plugin's node
pub struct NodeLabeler {
    node_id: String,
    store: Arc<dyn MetadataStore>,
    allow_stale: bool,
    ttl: Option<Duration>,
    cached: Option<NodeRecord>,
}

impl NodeLabeler {
    /// Create a labeler for `node_id`
    pub fn new(
        node_id: impl Into<String>,
        store: Arc<dyn MetadataStore>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            store,
            allow_stale: config.allow_stale_node,
            ttl: cache_ttl(config.node_cache_ttl_secs),
            cached: None,
        }
    }

    /// Drop the cached node record so the next patch refetches it
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Cached node record, if any
    pub fn cached(&self) -> Option<&NodeRecord> {
        self.cached.as_ref()
    }

    /// Return the node record, from cache when stale reuse is allowed
    pub async fn node(&mut self) -> CsiResult<NodeRecord> {
        if self.allow_stale {
            if let Some(node) = &self.cached {
                let expired = self
                    .ttl
                    .is_some_and(|ttl| Utc::now() - node.fetched_at >= ttl);
                if !expired {
                    debug!("Found cached node {}", node.name);
                    return Ok(node.clone());
                }
            }
        }

        let node = self.store.get_node(&self.node_id).await?;
        info!("Got node {} from api server", node.name);
        self.cached = Some(node.clone());
        Ok(node)
    }

    /// Apply `delta` to the node's labels as a single patch
    pub async fn apply(&mut self, delta: &LabelDelta) -> CsiResult<NodeRecord> {
        let node = self.node().await.map_err(|e| {
            CsiError::context(
                format!("can't get node {} to patch labels {}", self.node_id, delta),
                e,
            )
        })?;
        if delta.is_empty() {
            return Ok(node);
        }

        match self.store.patch_node_labels(&node, delta).await {
            Ok(patched) => {
                debug!("Patched labels {} on node {}", delta, self.node_id);
                self.cached = Some(patched.clone());
                Ok(patched)
            }
            Err(e) => {
                self.invalidate();
                Err(CsiError::context(
                    format!(
                        "error when patching labels {} on node {}",
                        delta, self.node_id
                    ),
                    e,
                ))
            }
        }
    }
}

/// Cache lifetime for `secs`; zero or a value past the representable range
/// never expires
fn cache_ttl(secs: u64) -> Option<Duration> {
    match secs {
        0 => None,
        secs => i64::try_from(secs).ok().and_then(Duration::try_seconds),
    }
}
