//! Rollback bookkeeping for changes made during a reconcile pass
//!
//! Every state-changing convergence step is recorded per desired-state
//! resource and capability, so that the change can be inverted if the pool
//! later reports degradation. A single async mutex guards the whole map;
//! holding a `RollbackLedger` is the critical section spanning a pass's
//! convergence-and-record sequence.

use std::collections::{BTreeMap, HashMap};

use kube::api::DynamicObject;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use super::capability::Capability;
use super::config_manager::CapabilityConfigManager;
use crate::error::{Error, Result};

/// Action taken for one capability during a pass
#[derive(Clone, Debug)]
pub enum SyncRecord {
    /// The dependent object was created; holds the created object
    Created(DynamicObject),
    /// The dependent object was deleted; recreation uses the canonical config
    Deleted,
}

impl SyncRecord {
    pub fn action(&self) -> &'static str {
        match self {
            SyncRecord::Created(_) => "created",
            SyncRecord::Deleted => "deleted",
        }
    }
}

type Records = BTreeMap<Capability, SyncRecord>;

/// Per-reconciler store of `SyncRecord`s, keyed by desired-state resource
#[derive(Default)]
pub struct RollbackTracker {
    records: Mutex<HashMap<String, Records>>,
}

impl RollbackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the critical section for `owner`
    pub async fn lock(&self, owner: &str) -> RollbackLedger<'_> {
        RollbackLedger {
            guard: self.records.lock().await,
            owner: owner.to_string(),
        }
    }
}

/// Exclusive view of one owner's records
pub struct RollbackLedger<'a> {
    guard: MutexGuard<'a, HashMap<String, Records>>,
    owner: String,
}

impl RollbackLedger<'_> {
    /// Store a record, replacing any earlier one for the same capability
    pub fn record(&mut self, capability: Capability, record: SyncRecord) {
        let previous = self
            .guard
            .entry(self.owner.clone())
            .or_default()
            .insert(capability, record);
        if let Some(previous) = previous {
            warn!(
                "Replacing stale {} record for {} on {}",
                previous.action(),
                capability,
                self.owner
            );
        }
    }

    pub fn get(&self, capability: Capability) -> Option<&SyncRecord> {
        self.guard.get(&self.owner).and_then(|r| r.get(&capability))
    }

    pub fn len(&self) -> usize {
        self.guard.get(&self.owner).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accept the recorded changes; nothing left to roll back
    pub fn commit(&mut self) {
        if let Some(records) = self.guard.get_mut(&self.owner) {
            records.clear();
        }
    }

    /// Drop every record for this owner, e.g. once it is deleted
    pub fn forget(&mut self) {
        self.guard.remove(&self.owner);
    }

    /// Invert every recorded action
    ///
    /// Each capability is attempted once. Successful reverts clear their
    /// record; failed ones keep it for a later attempt and are returned as
    /// an aggregate error after the remaining capabilities have been tried.
    /// Returns the number of capabilities reverted.
    pub async fn revert_all(&mut self, managers: &[CapabilityConfigManager]) -> Result<usize> {
        let pending: Vec<(Capability, SyncRecord)> = match self.guard.get(&self.owner) {
            Some(records) if !records.is_empty() => {
                records.iter().map(|(c, r)| (*c, r.clone())).collect()
            }
            _ => {
                info!(
                    "Profiling pool is degraded for {}, but not because of any changes made by this controller",
                    self.owner
                );
                return Ok(0);
            }
        };

        let mut reverted = 0;
        let mut errors = Vec::new();
        for (capability, record) in pending {
            let Some(manager) = managers.iter().find(|m| m.capability() == capability) else {
                errors.push(Error::ConfigError(format!(
                    "no config manager registered for capability {capability}"
                )));
                continue;
            };

            match revert_one(manager, &record).await {
                Ok(()) => {
                    info!("Reverted {} {} change for {}", capability, record.action(), self.owner);
                    if let Some(records) = self.guard.get_mut(&self.owner) {
                        records.remove(&capability);
                    }
                    reverted += 1;
                }
                Err(e) => {
                    warn!("Failed to revert {} change for {}: {}", capability, self.owner, e);
                    errors.push(e);
                }
            }
        }

        match Error::aggregate(errors) {
            Some(err) => Err(err),
            None => Ok(reverted),
        }
    }
}

async fn revert_one(manager: &CapabilityConfigManager, record: &SyncRecord) -> Result<()> {
    match record {
        SyncRecord::Created(object) => match manager.delete_object(object).await {
            Err(e) if e.is_not_found() => Ok(()),
            // Our incarnation is gone; the same-named object belongs to someone else
            Err(e) if e.is_conflict() => {
                info!(
                    "{} was recreated by another writer, leaving it in place",
                    manager.object_name()
                );
                Ok(())
            }
            other => other,
        },
        SyncRecord::Deleted => match manager.create_object().await {
            // Already back in place
            Err(e) if e.is_conflict() => Ok(()),
            other => other.map(|_| ()),
        },
    }
}
