//! Canonical configuration for each profiling capability
//!
//! A capability is fully described by a `CapabilitySpec`: the dependent
//! kind, its well-known object name, and a payload constructor. The
//! constructors are deterministic so that forward convergence and rollback
//! always produce the same object.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::DynamicObject;
use kube::core::ApiResource;
use serde::Serialize;
use serde_json::json;

use crate::crd::{
    KubeletConfig, KubeletConfigSpec, MachineConfig, MachineConfigSpec,
    NodeObservabilityMachineConfig,
};
use crate::error::Result;

/// Name of the MachineConfigPool holding profiled nodes
pub const PROFILING_POOL_NAME: &str = "profiling";

/// Label the MCO uses to bind MachineConfigs to a pool
pub const MC_ROLE_LABEL: &str = "machineconfiguration.openshift.io/role";

/// Marker label on every object created by this operator
pub const MANAGED_BY_LABEL: &str = "machineconfigs.nodeobservability.olm.openshift.io/profiling";

/// Well-known name of the kubelet profiling KubeletConfig
pub const KUBELET_PROFILING_CONFIG_NAME: &str = "99-kubelet-profiling";

/// Well-known name of the CRI-O profiling MachineConfig
pub const CRIO_PROFILING_CONFIG_NAME: &str = "10-crio-profiling";

const IGNITION_VERSION: &str = "3.2.0";
const CRIO_UNIT_NAME: &str = "crio.service";
const CRIO_DROPIN_NAME: &str = "10-mco-profile-unix-socket.conf";
const CRIO_DROPIN_CONTENTS: &str = "[Service]\nEnvironment=\"ENABLE_PROFILE_UNIX_SOCKET=true\"\n";

/// An independently toggleable profiling feature
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Crio,
    Kubelet,
}

impl Capability {
    /// Every capability, in convergence order
    pub const ALL: [Capability; 2] = [Capability::Crio, Capability::Kubelet];

    /// Stable key used in logs, metrics and rollback records
    pub fn key(self) -> &'static str {
        match self {
            Capability::Crio => "crio",
            Capability::Kubelet => "kubelet",
        }
    }

    /// Toggle value for this capability on the desired-state resource
    pub fn is_enabled(self, config: &NodeObservabilityMachineConfig) -> bool {
        match self {
            Capability::Crio => config.spec.enable_crio_profiling,
            Capability::Kubelet => config.spec.enable_kubelet_profiling,
        }
    }

    /// Human-readable name of the dependent object, used in event messages
    pub fn object_description(self) -> &'static str {
        match self {
            Capability::Crio => "crio machine config",
            Capability::Kubelet => "kubelet config",
        }
    }

    pub fn spec(self) -> CapabilitySpec {
        match self {
            Capability::Crio => CapabilitySpec {
                capability: self,
                resource: ApiResource::erase::<MachineConfig>(&()),
                name: CRIO_PROFILING_CONFIG_NAME,
                build: build_crio_config,
            },
            Capability::Kubelet => CapabilitySpec {
                capability: self,
                resource: ApiResource::erase::<KubeletConfig>(&()),
                name: KUBELET_PROFILING_CONFIG_NAME,
                build: build_kubelet_config,
            },
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Static description of one capability's dependent object
#[derive(Clone, Debug)]
pub struct CapabilitySpec {
    pub capability: Capability,
    pub resource: ApiResource,
    pub name: &'static str,
    pub build: fn() -> Result<DynamicObject>,
}

impl CapabilitySpec {
    /// Build the canonical dependent object
    pub fn build(&self) -> Result<DynamicObject> {
        (self.build)()
    }
}

/// Labels carried by every MachineConfig-side object this operator creates
pub fn machine_config_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (MC_ROLE_LABEL.to_string(), PROFILING_POOL_NAME.to_string()),
        (MANAGED_BY_LABEL.to_string(), String::new()),
    ])
}

/// Selector matching the MachineConfigs targeting the profiling pool
pub fn profiling_pool_selector() -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([(
            MC_ROLE_LABEL.to_string(),
            PROFILING_POOL_NAME.to_string(),
        )])),
        ..Default::default()
    }
}

/// Convert a typed resource into the untyped form stored by the reconciler
pub(crate) fn to_dynamic<K: Serialize>(resource: &K) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(resource)?)?)
}

fn build_kubelet_config() -> Result<DynamicObject> {
    let mut config = KubeletConfig::new(
        KUBELET_PROFILING_CONFIG_NAME,
        KubeletConfigSpec {
            kubelet_config: Some(json!({ "enableProfilingHandler": true })),
            machine_config_pool_selector: Some(profiling_pool_selector()),
        },
    );
    config.metadata.labels = Some(machine_config_labels());
    to_dynamic(&config)
}

fn build_crio_config() -> Result<DynamicObject> {
    let ignition = json!({
        "ignition": { "version": IGNITION_VERSION },
        "systemd": {
            "units": [{
                "name": CRIO_UNIT_NAME,
                "dropins": [{
                    "name": CRIO_DROPIN_NAME,
                    "contents": CRIO_DROPIN_CONTENTS,
                }],
            }],
        },
    });

    let mut config = MachineConfig::new(
        CRIO_PROFILING_CONFIG_NAME,
        MachineConfigSpec {
            config: Some(ignition),
            ..Default::default()
        },
    );
    config.metadata.labels = Some(machine_config_labels());
    to_dynamic(&config)
}
