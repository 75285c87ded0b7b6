//! Volume id to runtime identity resolution

use crate::cluster::{MetadataStore, RuntimeIdentity};
use crate::error::CsiResult;
use crate::node::request::VolumeContext;
use tracing::{debug, info};

/// Resolve the runtime owning `volume_id`.
///
/// Namespace and name hints in the volume context are used as-is. Without
/// them (unstage requests carry no context) the store is asked to map the
/// volume id.
pub async fn resolve_runtime_identity(
    store: &dyn MetadataStore,
    context: Option<&VolumeContext>,
    volume_id: &str,
) -> CsiResult<RuntimeIdentity> {
    if let Some(identity) = context.and_then(VolumeContext::runtime_hint) {
        debug!(
            "Get runtime namespace({}) and name({}) from volume context",
            identity.namespace, identity.name
        );
        return Ok(identity);
    }

    info!(
        "Get runtime namespace and name directly from api server with volumeId {}",
        volume_id
    );
    store.get_runtime_identity_by_volume_id(volume_id).await
}
