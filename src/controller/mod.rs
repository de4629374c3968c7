//! Controller module for NodeObservabilityMachineConfig reconciliation
//! This module contains the main controller loop, reconciliation logic,
//! and management of the profiling MachineConfig-side objects.

pub mod capability;
mod config_manager;
pub mod events;
mod finalizers;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod pool;
mod reconciler;
#[cfg(test)]
mod reconciler_test;
mod rollback;
pub mod store;
#[cfg(test)]
mod testing;

pub use capability::{Capability, CapabilitySpec};
pub use config_manager::CapabilityConfigManager;
pub use events::{ConfigEvent, EventSink, EventType, KubeEventSink};
pub use finalizers::MACHINE_CONFIG_FINALIZER;
pub use pool::{MachineConfigPoolHealth, PoolHealth, PoolHealthReport, PoolHealthSource};
pub use reconciler::{
    run_controller, ControllerState, PassPhase, ReconcileOutcome, Reconciler, ReconcilerConfig,
};
pub use rollback::{RollbackTracker, SyncRecord};
pub use store::{KubeStore, ObjectStore};
