//! In-memory doubles for the reconciler's seams
//!
//! `InMemoryStore` emulates the API server's behaviour that the reconciler
//! relies on: not-found reporting, `resourceVersion` conflicts, and removal
//! of a deleting object once its last finalizer is gone. Failures can be
//! injected per kind and fire once.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kube::core::ApiResource;
use kube::ResourceExt;

use super::events::{ConfigEvent, EventSink};
use super::pool::{PoolHealth, PoolHealthReport, PoolHealthSource};
use super::store::ObjectStore;
use crate::crd::{NodeObservabilityMachineConfig, NodeObservabilityMachineConfigSpec};
use crate::error::{Error, Result};

const CONFIG_KIND: &str = "NodeObservabilityMachineConfig";

/// One-shot failure injected into a store operation
#[derive(Debug)]
pub enum StoreFailure {
    /// Transport-level failure
    Unavailable,
    /// Optimistic-concurrency conflict
    Conflict,
    /// Another writer wins a create race: the object is stored, caller gets a conflict
    Race(Box<DynamicObject>),
    /// Delete reports success but the object stays (stale cache)
    Ignored,
}

#[derive(Default)]
pub struct InMemoryStore {
    configs: Mutex<HashMap<String, NodeObservabilityMachineConfig>>,
    objects: Mutex<BTreeMap<(String, String), DynamicObject>>,
    create_failures: Mutex<HashMap<String, StoreFailure>>,
    delete_failures: Mutex<HashMap<String, StoreFailure>>,
    config_update_failure: Mutex<Option<StoreFailure>>,
    next_version: AtomicUsize,
    deletes: AtomicUsize,
    status_updates: AtomicUsize,
}

impl InMemoryStore {
    fn version(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    pub fn insert_config(&self, mut config: NodeObservabilityMachineConfig) {
        config.metadata.resource_version = Some(self.version());
        self.configs
            .lock()
            .unwrap()
            .insert(config.name_any(), config);
    }

    pub fn config(&self, name: &str) -> Option<NodeObservabilityMachineConfig> {
        self.configs.lock().unwrap().get(name).cloned()
    }

    /// Set the deletion marker the way the API server does on DELETE
    pub fn mark_deleted(&self, name: &str) {
        if let Some(config) = self.configs.lock().unwrap().get_mut(name) {
            config.metadata.deletion_timestamp = Some(Time(Utc::now()));
        }
    }

    pub fn insert_object(&self, kind: &str, object: DynamicObject) {
        self.objects
            .lock()
            .unwrap()
            .insert((kind.to_string(), object.name_any()), object);
    }

    pub fn object(&self, kind: &str, name: &str) -> Option<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind.to_string(), name.to_string()))
            .cloned()
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.object(kind, name).is_some()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| k == kind)
            .count()
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn status_updates(&self) -> usize {
        self.status_updates.load(Ordering::SeqCst)
    }

    pub fn fail_creates(&self, kind: &str, failure: StoreFailure) {
        self.create_failures
            .lock()
            .unwrap()
            .insert(kind.to_string(), failure);
    }

    pub fn fail_deletes(&self, kind: &str, failure: StoreFailure) {
        self.delete_failures
            .lock()
            .unwrap()
            .insert(kind.to_string(), failure);
    }

    pub fn fail_config_update(&self, failure: StoreFailure) {
        *self.config_update_failure.lock().unwrap() = Some(failure);
    }
}

fn conflict(kind: &str, name: &str) -> Error {
    Error::Conflict {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_config(&self, name: &str) -> Result<Option<NodeObservabilityMachineConfig>> {
        Ok(self.config(name))
    }

    async fn update_config(
        &self,
        config: &NodeObservabilityMachineConfig,
    ) -> Result<NodeObservabilityMachineConfig> {
        let name = config.name_any();
        match self.config_update_failure.lock().unwrap().take() {
            Some(StoreFailure::Unavailable) => {
                return Err(Error::StoreUnavailable("injected".to_string()))
            }
            Some(_) => return Err(conflict(CONFIG_KIND, &name)),
            None => {}
        }

        let mut configs = self.configs.lock().unwrap();
        let stored = configs.get(&name).ok_or_else(|| Error::NotFound {
            kind: CONFIG_KIND.to_string(),
            name: name.clone(),
        })?;
        if stored.metadata.resource_version != config.metadata.resource_version {
            return Err(conflict(CONFIG_KIND, &name));
        }

        let mut updated = config.clone();
        // Status is a subresource; replace never touches it
        updated.status = stored.status.clone();
        updated.metadata.resource_version = Some(self.version());

        let released = updated.metadata.deletion_timestamp.is_some()
            && updated.finalizers().is_empty();
        if released {
            configs.remove(&name);
        } else {
            configs.insert(name, updated.clone());
        }
        Ok(updated)
    }

    async fn update_config_status(
        &self,
        config: &NodeObservabilityMachineConfig,
    ) -> Result<NodeObservabilityMachineConfig> {
        let name = config.name_any();
        let mut configs = self.configs.lock().unwrap();
        let stored = configs.get_mut(&name).ok_or_else(|| Error::NotFound {
            kind: CONFIG_KIND.to_string(),
            name: name.clone(),
        })?;
        stored.status = config.status.clone();
        stored.metadata.resource_version = Some(self.version());
        self.status_updates.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }

    async fn get(&self, kind: &ApiResource, name: &str) -> Result<Option<DynamicObject>> {
        Ok(self.object(&kind.kind, name))
    }

    async fn create(&self, kind: &ApiResource, object: &DynamicObject) -> Result<DynamicObject> {
        let name = object.name_any();
        match self.create_failures.lock().unwrap().remove(&kind.kind) {
            Some(StoreFailure::Race(winner)) => {
                self.insert_object(&kind.kind, *winner);
                return Err(conflict(&kind.kind, &name));
            }
            Some(StoreFailure::Unavailable) => {
                return Err(Error::StoreUnavailable("injected".to_string()))
            }
            Some(_) => return Err(conflict(&kind.kind, &name)),
            None => {}
        }

        if self.contains(&kind.kind, &name) {
            return Err(conflict(&kind.kind, &name));
        }
        let mut created = object.clone();
        created.metadata.resource_version = Some(self.version());
        created.metadata.uid = Some(format!("uid-{}-{}", kind.kind.to_lowercase(), name));
        self.insert_object(&kind.kind, created.clone());
        Ok(created)
    }

    async fn delete(&self, kind: &ApiResource, name: &str, uid: Option<&str>) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        match self.delete_failures.lock().unwrap().remove(&kind.kind) {
            Some(StoreFailure::Ignored) => return Ok(()),
            Some(StoreFailure::Unavailable) => {
                return Err(Error::StoreUnavailable("injected".to_string()))
            }
            Some(_) => return Err(conflict(&kind.kind, name)),
            None => {}
        }

        let mut objects = self.objects.lock().unwrap();
        let key = (kind.kind.clone(), name.to_string());
        let stored = objects.get(&key).ok_or_else(|| Error::NotFound {
            kind: kind.kind.clone(),
            name: name.to_string(),
        })?;
        if uid.is_some() && stored.metadata.uid.as_deref() != uid {
            return Err(conflict(&kind.kind, name));
        }
        objects.remove(&key);
        Ok(())
    }
}

/// Captures published events
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<ConfigEvent>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<ConfigEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn with_reason(&self, reason: &str) -> Vec<ConfigEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingEvents {
    async fn publish(
        &self,
        _config: &NodeObservabilityMachineConfig,
        event: ConfigEvent,
    ) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Pool-health source returning whatever the test sets
pub struct StaticPoolHealth {
    report: Mutex<PoolHealthReport>,
}

impl StaticPoolHealth {
    pub fn new(health: PoolHealth) -> Self {
        Self {
            report: Mutex::new(PoolHealthReport::new(health, format!("pool is {health}"))),
        }
    }

    pub fn set(&self, health: PoolHealth) {
        *self.report.lock().unwrap() = PoolHealthReport::new(health, format!("pool is {health}"));
    }
}

#[async_trait]
impl PoolHealthSource for StaticPoolHealth {
    async fn check(&self, _config: &NodeObservabilityMachineConfig) -> Result<PoolHealthReport> {
        Ok(self.report.lock().unwrap().clone())
    }
}

/// Desired-state resource with the given toggles and no finalizers
pub fn machine_config_request(name: &str, crio: bool, kubelet: bool) -> NodeObservabilityMachineConfig {
    let mut config = NodeObservabilityMachineConfig::new(
        name,
        NodeObservabilityMachineConfigSpec {
            enable_crio_profiling: crio,
            enable_kubelet_profiling: kubelet,
        },
    );
    config.metadata.uid = Some(format!("uid-{name}"));
    config
}
