//! Profiling MachineConfigPool management and health
//!
//! The profiling capabilities target nodes through a dedicated
//! `MachineConfigPool`. This module owns that pool's lifecycle and exposes
//! the pool-health signal the reconciler uses to decide on rollback.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::api::{Api, DynamicObject};
use kube::core::ApiResource;
use kube::Client;
use tracing::{debug, info};

use super::capability::{to_dynamic, MANAGED_BY_LABEL, MC_ROLE_LABEL, PROFILING_POOL_NAME};
use super::store::ObjectStore;
use crate::crd::types::{CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_STATUS_UNKNOWN};
use crate::crd::{
    Condition, MachineConfigPool, MachineConfigPoolSpec, MachineConfigPoolStatus,
    NodeObservabilityMachineConfig,
};
use crate::error::{Error, Result};

/// Condition type written on the desired-state status
pub const CONDITION_TYPE_POOL_HEALTHY: &str = "PoolHealthy";

const WORKER_ROLE: &str = "worker";
const WORKER_NODE_LABEL: &str = "node-role.kubernetes.io/worker";

/// Whether the profiled nodes have applied the current configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolHealth {
    Healthy,
    Degraded,
    Unknown,
}

impl fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolHealth::Healthy => f.write_str("Healthy"),
            PoolHealth::Degraded => f.write_str("Degraded"),
            PoolHealth::Unknown => f.write_str("Unknown"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolHealthReport {
    pub health: PoolHealth,
    pub message: String,
}

impl PoolHealthReport {
    pub fn new(health: PoolHealth, message: impl Into<String>) -> Self {
        Self {
            health,
            message: message.into(),
        }
    }

    /// Status condition summarising this report
    pub fn to_condition(&self) -> Condition {
        let (status, reason) = match self.health {
            PoolHealth::Healthy => (CONDITION_STATUS_TRUE, "PoolUpdated"),
            PoolHealth::Degraded => (CONDITION_STATUS_FALSE, "PoolDegraded"),
            PoolHealth::Unknown => (CONDITION_STATUS_UNKNOWN, "PoolUpdating"),
        };
        Condition::new(CONDITION_TYPE_POOL_HEALTHY, status, reason, &self.message)
    }
}

/// Source of the pool-health signal
#[async_trait]
pub trait PoolHealthSource: Send + Sync {
    async fn check(&self, config: &NodeObservabilityMachineConfig) -> Result<PoolHealthReport>;
}

/// Reads the profiling pool's status from the API server
pub struct MachineConfigPoolHealth {
    client: Client,
}

impl MachineConfigPoolHealth {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PoolHealthSource for MachineConfigPoolHealth {
    async fn check(&self, _config: &NodeObservabilityMachineConfig) -> Result<PoolHealthReport> {
        let pools: Api<MachineConfigPool> = Api::all(self.client.clone());
        let pool = pools
            .get_opt(PROFILING_POOL_NAME)
            .await
            .map_err(|e| Error::from_kube("MachineConfigPool", PROFILING_POOL_NAME, e))?;

        Ok(match pool.and_then(|p| p.status) {
            Some(status) => evaluate_pool_status(&status),
            None => PoolHealthReport::new(
                PoolHealth::Unknown,
                format!("MachineConfigPool {PROFILING_POOL_NAME} has not reported status yet"),
            ),
        })
    }
}

/// Classify a pool status into a health report
pub fn evaluate_pool_status(status: &MachineConfigPoolStatus) -> PoolHealthReport {
    let condition_true = |type_: &str| {
        status
            .conditions
            .iter()
            .any(|c| c.type_ == type_ && c.status == CONDITION_STATUS_TRUE)
    };

    if status.degraded_machine_count > 0 || condition_true("Degraded") || condition_true("NodeDegraded") {
        let detail = status
            .conditions
            .iter()
            .filter(|c| c.type_.ends_with("Degraded") && c.status == CONDITION_STATUS_TRUE)
            .filter_map(|c| c.message.as_deref().or(c.reason.as_deref()))
            .collect::<Vec<_>>()
            .join("; ");
        let mut message = format!(
            "{} of {} machines degraded",
            status.degraded_machine_count, status.machine_count
        );
        if !detail.is_empty() {
            message = format!("{message}: {detail}");
        }
        return PoolHealthReport::new(PoolHealth::Degraded, message);
    }

    if status.updated_machine_count == status.machine_count && condition_true("Updated") {
        return PoolHealthReport::new(
            PoolHealth::Healthy,
            format!("all {} machines updated", status.machine_count),
        );
    }

    PoolHealthReport::new(
        PoolHealth::Unknown,
        format!(
            "{} of {} machines updated",
            status.updated_machine_count, status.machine_count
        ),
    )
}

fn pool_resource() -> ApiResource {
    ApiResource::erase::<MachineConfigPool>(&())
}

/// Canonical profiling pool: worker nodes, worker + profiling MachineConfigs
pub fn build_profiling_pool() -> Result<DynamicObject> {
    let mut pool = MachineConfigPool::new(
        PROFILING_POOL_NAME,
        MachineConfigPoolSpec {
            machine_config_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: MC_ROLE_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![WORKER_ROLE.to_string(), PROFILING_POOL_NAME.to_string()]),
                }]),
                ..Default::default()
            }),
            node_selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([(WORKER_NODE_LABEL.to_string(), String::new())])),
                ..Default::default()
            }),
            paused: false,
        },
    );
    pool.metadata.labels = Some(BTreeMap::from([(MANAGED_BY_LABEL.to_string(), String::new())]));
    to_dynamic(&pool)
}

/// Create the profiling pool if it does not exist yet
///
/// Returns whether this call created it.
pub async fn ensure_profiling_pool(store: &dyn ObjectStore) -> Result<bool> {
    let resource = pool_resource();
    if store.get(&resource, PROFILING_POOL_NAME).await?.is_some() {
        debug!("MachineConfigPool {} already exists", PROFILING_POOL_NAME);
        return Ok(false);
    }

    match store.create(&resource, &build_profiling_pool()?).await {
        Ok(_) => {
            info!("Created MachineConfigPool {}", PROFILING_POOL_NAME);
            Ok(true)
        }
        // Another pass created it first; the pool is fixed so theirs is ours
        Err(e) if e.is_conflict() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete the profiling pool if present
///
/// Returns whether this call deleted it.
pub async fn remove_profiling_pool(store: &dyn ObjectStore) -> Result<bool> {
    let resource = pool_resource();
    if store.get(&resource, PROFILING_POOL_NAME).await?.is_none() {
        return Ok(false);
    }

    match store.delete(&resource, PROFILING_POOL_NAME, None).await {
        Ok(()) => {
            info!("Removed MachineConfigPool {}", PROFILING_POOL_NAME);
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
