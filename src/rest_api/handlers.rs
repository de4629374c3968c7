//! HTTP handlers for the REST API

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use kube::{api::Api, ResourceExt};
use tracing::{error, instrument};

use crate::controller::pool::CONDITION_TYPE_POOL_HEALTHY;
use crate::controller::ControllerState;
use crate::crd::types::{find_condition, CONDITION_STATUS_UNKNOWN};
use crate::crd::NodeObservabilityMachineConfig;

use super::dto::{ErrorResponse, HealthResponse, MachineConfigListResponse, MachineConfigSummary};

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List all NodeObservabilityMachineConfigs
#[instrument(skip(state))]
pub async fn list_machine_configs(
    State(state): State<Arc<ControllerState>>,
) -> Result<Json<MachineConfigListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let api: Api<NodeObservabilityMachineConfig> = Api::all(state.client.clone());

    match api.list(&Default::default()).await {
        Ok(configs) => {
            let items: Vec<MachineConfigSummary> = configs.items.iter().map(summarize).collect();
            let total = items.len();
            Ok(Json(MachineConfigListResponse { items, total }))
        }
        Err(e) => {
            error!("Failed to list NodeObservabilityMachineConfigs: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("list_failed", &e.to_string())),
            ))
        }
    }
}

pub(crate) fn summarize(config: &NodeObservabilityMachineConfig) -> MachineConfigSummary {
    let status = config.status.as_ref();
    MachineConfigSummary {
        name: config.name_any(),
        enable_crio_profiling: config.spec.enable_crio_profiling,
        enable_kubelet_profiling: config.spec.enable_kubelet_profiling,
        profiling_enabled: config.any_profiling_enabled(),
        last_update: status.and_then(|s| s.last_update.clone()),
        pool_healthy: status
            .and_then(|s| find_condition(&s.conditions, CONDITION_TYPE_POOL_HEALTHY))
            .map(|c| c.status.clone())
            .unwrap_or_else(|| CONDITION_STATUS_UNKNOWN.to_string()),
        deleting: config.metadata.deletion_timestamp.is_some(),
    }
}
