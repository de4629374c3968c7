//! Object store seam between the reconciler and the API server
//!
//! The desired-state resource is handled typed; dependent objects are
//! handled as `DynamicObject`s addressed by `ApiResource` + name, so one
//! code path serves every MachineConfig-side kind.

use async_trait::async_trait;
use kube::api::{
    Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams, Preconditions,
};
use kube::core::ApiResource;
use kube::{Client, ResourceExt};
use tracing::debug;

use crate::crd::NodeObservabilityMachineConfig;
use crate::error::{Error, Result};

/// Field manager used for every write
pub const FIELD_MANAGER: &str = "node-observability-operator";

const CONFIG_KIND: &str = "NodeObservabilityMachineConfig";

/// Cluster object store used by the reconciler
///
/// Not-found is `Ok(None)` from the getters and `Error::NotFound` from
/// `delete`. Writes that lose an optimistic-concurrency race fail with
/// `Error::Conflict`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_config(&self, name: &str) -> Result<Option<NodeObservabilityMachineConfig>>;

    /// Replace the resource, guarded by its `resourceVersion`
    async fn update_config(
        &self,
        config: &NodeObservabilityMachineConfig,
    ) -> Result<NodeObservabilityMachineConfig>;

    /// Write the status subresource
    async fn update_config_status(
        &self,
        config: &NodeObservabilityMachineConfig,
    ) -> Result<NodeObservabilityMachineConfig>;

    async fn get(&self, kind: &ApiResource, name: &str) -> Result<Option<DynamicObject>>;

    async fn create(&self, kind: &ApiResource, object: &DynamicObject) -> Result<DynamicObject>;

    /// Delete by name; with `uid` set, only that exact incarnation
    ///
    /// A `uid` that no longer matches the live object fails with
    /// `Error::Conflict`.
    async fn delete(&self, kind: &ApiResource, name: &str, uid: Option<&str>) -> Result<()>;
}

/// `ObjectStore` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn configs(&self) -> Api<NodeObservabilityMachineConfig> {
        Api::all(self.client.clone())
    }

    fn dynamic(&self, kind: &ApiResource) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), kind)
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_config(&self, name: &str) -> Result<Option<NodeObservabilityMachineConfig>> {
        self.configs()
            .get_opt(name)
            .await
            .map_err(|e| Error::from_kube(CONFIG_KIND, name, e))
    }

    async fn update_config(
        &self,
        config: &NodeObservabilityMachineConfig,
    ) -> Result<NodeObservabilityMachineConfig> {
        let name = config.name_any();
        self.configs()
            .replace(&name, &PostParams::default(), config)
            .await
            .map_err(|e| Error::from_kube(CONFIG_KIND, &name, e))
    }

    async fn update_config_status(
        &self,
        config: &NodeObservabilityMachineConfig,
    ) -> Result<NodeObservabilityMachineConfig> {
        let name = config.name_any();
        let patch = serde_json::json!({ "status": config.status });
        self.configs()
            .patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from_kube(CONFIG_KIND, &name, e))
    }

    async fn get(&self, kind: &ApiResource, name: &str) -> Result<Option<DynamicObject>> {
        self.dynamic(kind)
            .get_opt(name)
            .await
            .map_err(|e| Error::from_kube(&kind.kind, name, e))
    }

    async fn create(&self, kind: &ApiResource, object: &DynamicObject) -> Result<DynamicObject> {
        let name = object.name_any();
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.dynamic(kind)
            .create(&pp, object)
            .await
            .map_err(|e| Error::from_kube(&kind.kind, &name, e))
    }

    async fn delete(&self, kind: &ApiResource, name: &str, uid: Option<&str>) -> Result<()> {
        let dp = DeleteParams {
            preconditions: uid.map(|uid| Preconditions {
                uid: Some(uid.to_string()),
                resource_version: None,
            }),
            ..Default::default()
        };
        let result = self
            .dynamic(kind)
            .delete(name, &dp)
            .await
            .map_err(|e| Error::from_kube(&kind.kind, name, e))?;
        // Left: the object came back, so finalizers are still holding it
        if result.is_left() {
            debug!("{}/{} deletion pending on finalizers", kind.kind, name);
        }
        Ok(())
    }
}
