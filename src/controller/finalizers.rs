//! Finalizer handling for NodeObservabilityMachineConfig cleanup
//!
//! The finalizer keeps the desired-state resource around until every
//! dependent object this operator created has been removed.

use kube::ResourceExt;
use tracing::info;

use super::store::ObjectStore;
use crate::crd::NodeObservabilityMachineConfig;
use crate::error::Result;

/// Sentinel finalizer protecting NodeObservabilityMachineConfig resources
pub const MACHINE_CONFIG_FINALIZER: &str = "nodeobservability.olm.openshift.io/machineconfig";

/// Ensure the sentinel finalizer is set
///
/// Returns the persisted resource. When the token is already present the
/// input is returned unchanged without touching the store. The caller's
/// value is never mutated, so a failed update leaves it intact.
pub async fn with_finalizer(
    store: &dyn ObjectStore,
    config: &NodeObservabilityMachineConfig,
) -> Result<NodeObservabilityMachineConfig> {
    if has_finalizer(config) {
        return Ok(config.clone());
    }

    let mut updated = config.clone();
    updated
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(MACHINE_CONFIG_FINALIZER.to_string());

    let persisted = store.update_config(&updated).await?;
    info!("Added finalizer to NodeObservabilityMachineConfig: {}", config.name_any());
    Ok(persisted)
}

/// Remove exactly `token`, keeping the order of the remaining finalizers
///
/// An emptied list is stored as no finalizers at all.
pub async fn without_finalizer(
    store: &dyn ObjectStore,
    config: &NodeObservabilityMachineConfig,
    token: &str,
) -> Result<NodeObservabilityMachineConfig> {
    let mut updated = config.clone();
    updated.metadata.finalizers = strip_finalizer(config.finalizers(), token);

    let persisted = store.update_config(&updated).await?;
    info!(
        "Removed finalizer {} from NodeObservabilityMachineConfig: {}",
        token,
        config.name_any()
    );
    Ok(persisted)
}

fn strip_finalizer(finalizers: &[String], token: &str) -> Option<Vec<String>> {
    let remaining: Vec<String> = finalizers
        .iter()
        .filter(|f| f.as_str() != token)
        .cloned()
        .collect();
    if remaining.is_empty() {
        None
    } else {
        Some(remaining)
    }
}

/// A deletion timestamp means deletion was requested and finalizers are holding it
pub fn is_being_deleted(config: &NodeObservabilityMachineConfig) -> bool {
    config.metadata.deletion_timestamp.is_some()
}

pub fn has_finalizer(config: &NodeObservabilityMachineConfig) -> bool {
    config
        .finalizers()
        .iter()
        .any(|f| f == MACHINE_CONFIG_FINALIZER)
}
