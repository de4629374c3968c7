//! Response bodies for the REST API

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One NodeObservabilityMachineConfig as seen by API clients
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigSummary {
    pub name: String,
    pub enable_crio_profiling: bool,
    pub enable_kubelet_profiling: bool,
    /// True when any profiling capability is requested
    pub profiling_enabled: bool,
    pub last_update: Option<String>,
    /// Status of the PoolHealthy condition, "Unknown" before the first pass
    pub pool_healthy: String,
    pub deleting: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MachineConfigListResponse {
    pub items: Vec<MachineConfigSummary>,
    pub total: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}
