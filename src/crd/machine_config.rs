//! Machine Config Operator resources consumed by this operator
//!
//! These are the OpenShift `machineconfiguration.openshift.io/v1` kinds the
//! operator creates or reads. Only the fields the operator touches are
//! modelled; everything else round-trips through the untyped payloads.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MachineConfig carries an Ignition config rendered onto every node of a pool
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfig"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigSpec {
    /// Raw Ignition config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kernel_arguments: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

/// KubeletConfig patches the kubelet configuration of the selected pools
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "KubeletConfig"
)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfigSpec {
    /// Partial kubelet configuration merged by the MCO
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubelet_config: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub machine_config_pool_selector: Option<LabelSelector>,
}

/// MachineConfigPool groups nodes and the MachineConfigs rendered onto them
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    status = "MachineConfigPoolStatus",
    shortname = "mcp"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub machine_config_selector: Option<LabelSelector>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub node_selector: Option<LabelSelector>,

    #[serde(default)]
    pub paused: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    #[serde(default)]
    pub machine_count: i32,

    #[serde(default)]
    pub updated_machine_count: i32,

    #[serde(default)]
    pub ready_machine_count: i32,

    #[serde(default)]
    pub unavailable_machine_count: i32,

    #[serde(default)]
    pub degraded_machine_count: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<MachineConfigPoolCondition>,
}

/// Pool condition as reported by the MCO
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolCondition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
