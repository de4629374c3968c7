//! NodeObservabilityMachineConfig Custom Resource Definition
//!
//! The desired-state resource. Each boolean toggle in `.spec` maps onto one
//! profiling capability whose MachineConfig-side object must exist iff the
//! toggle is set.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "nodeobservability.olm.openshift.io",
    version = "v1alpha1",
    kind = "NodeObservabilityMachineConfig",
    status = "NodeObservabilityMachineConfigStatus",
    shortname = "nomc",
    printcolumn = r#"{"name":"CRI-O","type":"boolean","jsonPath":".spec.enableCrioProfiling"}"#,
    printcolumn = r#"{"name":"Kubelet","type":"boolean","jsonPath":".spec.enableKubeletProfiling"}"#,
    printcolumn = r#"{"name":"Pool","type":"string","jsonPath":".status.conditions[?(@.type=='PoolHealthy')].status"}"#,
    printcolumn = r#"{"name":"Last Update","type":"string","jsonPath":".status.lastUpdate"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NodeObservabilityMachineConfigSpec {
    /// Enable the CRI-O profiling unix socket on profiled nodes
    #[serde(default)]
    pub enable_crio_profiling: bool,

    /// Enable the kubelet profiling handler on profiled nodes
    #[serde(default)]
    pub enable_kubelet_profiling: bool,
}

/// Status written by the reconciler
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeObservabilityMachineConfigStatus {
    /// Time of the last pass that converged without errors (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,

    /// Pool health summary, see `PoolHealthy`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl NodeObservabilityMachineConfig {
    /// True when at least one profiling capability is requested
    pub fn any_profiling_enabled(&self) -> bool {
        self.spec.enable_crio_profiling || self.spec.enable_kubelet_profiling
    }
}
