//! Custom Resource Definitions for the node observability operator
//!
//! `NodeObservabilityMachineConfig` is owned by this operator; the
//! `machineconfiguration.openshift.io` kinds belong to the Machine Config
//! Operator and are only created or read here.

pub mod machine_config;
mod machine_config_request;
pub mod types;


pub use machine_config::{
    KubeletConfig, KubeletConfigSpec, MachineConfig, MachineConfigPool,
    MachineConfigPoolCondition, MachineConfigPoolSpec, MachineConfigPoolStatus,
    MachineConfigSpec,
};
pub use machine_config_request::{
    NodeObservabilityMachineConfig, NodeObservabilityMachineConfigSpec,
    NodeObservabilityMachineConfigStatus,
};
pub use types::Condition;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// CRDs installed and owned by this operator
///
/// The MachineConfig-side kinds are served by the Machine Config Operator
/// and never appear here.
pub fn owned_crds() -> Vec<CustomResourceDefinition> {
    vec![NodeObservabilityMachineConfig::crd()]
}
