//! Ensure-exists / ensure-absent convergence for one capability
//!
//! One `CapabilityConfigManager` is instantiated per capability. Both
//! convergence directions are idempotent predicates over the single
//! well-known dependent object; there is no field-level diffing because the
//! desired shape is derived purely from the toggle.

use std::sync::Arc;

use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::capability::{Capability, CapabilitySpec};
use super::store::ObjectStore;
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct CapabilityConfigManager {
    spec: CapabilitySpec,
    store: Arc<dyn ObjectStore>,
}

impl CapabilityConfigManager {
    pub fn new(spec: CapabilitySpec, store: Arc<dyn ObjectStore>) -> Self {
        Self { spec, store }
    }

    /// Managers for every known capability, in convergence order
    pub fn for_all(store: Arc<dyn ObjectStore>) -> Vec<Self> {
        Capability::ALL
            .iter()
            .map(|capability| Self::new(capability.spec(), store.clone()))
            .collect()
    }

    pub fn capability(&self) -> Capability {
        self.spec.capability
    }

    pub fn object_name(&self) -> &'static str {
        self.spec.name
    }

    /// Fetch the dependent object, creating it from the canonical config when absent
    ///
    /// Returns the object and whether this call created it. A create that
    /// races another writer surfaces `Error::Conflict` without retrying.
    #[instrument(skip(self), fields(capability = %self.spec.capability, name = self.spec.name))]
    pub async fn ensure_exists(&self) -> Result<(DynamicObject, bool)> {
        if let Some(existing) = self.fetch().await? {
            debug!("{} {} already exists", self.spec.resource.kind, self.spec.name);
            return Ok((existing, false));
        }

        let created = self.create_object().await?;
        Ok((created, true))
    }

    /// Delete the dependent object if present and verify it is gone
    ///
    /// Returns whether this call deleted it. Absent objects are a no-op.
    #[instrument(skip(self), fields(capability = %self.spec.capability, name = self.spec.name))]
    pub async fn ensure_absent(&self) -> Result<bool> {
        let Some(existing) = self.fetch().await? else {
            debug!("{} {} already absent", self.spec.resource.kind, self.spec.name);
            return Ok(false);
        };

        match self.delete_object(&existing).await {
            Ok(()) => {}
            // Someone else removed it between our read and delete
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        }

        if self.fetch().await?.is_some() {
            return Err(Error::InconsistentState {
                kind: self.spec.resource.kind.clone(),
                name: self.spec.name.to_string(),
            });
        }
        Ok(true)
    }

    /// Create the canonical dependent object
    pub async fn create_object(&self) -> Result<DynamicObject> {
        let object = self.spec.build()?;
        let created = self.store.create(&self.spec.resource, &object).await?;
        info!(
            "Created {} {} to enable {} profiling",
            self.spec.resource.kind, self.spec.name, self.spec.capability
        );
        Ok(created)
    }

    /// Delete exactly the given dependent object
    ///
    /// The object's uid is sent as a precondition, so a same-named object
    /// recreated by someone else is left alone and reported as a conflict.
    pub async fn delete_object(&self, object: &DynamicObject) -> Result<()> {
        let name = object.name_any();
        self.store
            .delete(&self.spec.resource, &name, object.uid().as_deref())
            .await?;
        info!(
            "Removed {} {} to disable {} profiling",
            self.spec.resource.kind, name, self.spec.capability
        );
        Ok(())
    }

    async fn fetch(&self) -> Result<Option<DynamicObject>> {
        self.store.get(&self.spec.resource, self.spec.name).await
    }
}
