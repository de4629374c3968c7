//! Main reconciler for NodeObservabilityMachineConfig resources
//!
//! A pass fetches the desired-state resource and then takes one of three
//! paths:
//! - NotFound: the resource vanished; drop its bookkeeping and come back later.
//! - Deleting: remove every dependent object, then release the finalizer.
//! - Normal: set the finalizer, converge each capability under the rollback
//!   lock, consult pool health, and persist status.
//!
//! The kube-runtime `Controller` wiring lives at the bottom of this file.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::client::Client;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use super::capability::Capability;
use super::config_manager::CapabilityConfigManager;
use super::events::{
    ConfigEvent, EventSink, REASON_CREATE_CONFIG, REASON_DELETE_CONFIG, REASON_REVERT_CONFIG,
    REASON_REVERT_FAILED,
};
use super::finalizers::{
    has_finalizer, is_being_deleted, with_finalizer, without_finalizer, MACHINE_CONFIG_FINALIZER,
};
use super::pool::{
    ensure_profiling_pool, remove_profiling_pool, PoolHealth, PoolHealthReport, PoolHealthSource,
};
use super::rollback::{RollbackTracker, SyncRecord};
use super::store::ObjectStore;
use crate::crd::types::set_condition;
use crate::crd::NodeObservabilityMachineConfig;
use crate::error::{Error, Result};

/// Default revisit interval for a converged resource
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Default revisit interval after a failed pass
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(3 * 60);

/// Default revisit interval while the pool is rolling out our changes
pub const DEFAULT_POOL_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Timing knobs for the reconciler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub requeue_interval: Duration,
    pub error_backoff: Duration,
    pub pool_poll_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            pool_poll_interval: DEFAULT_POOL_POLL_INTERVAL,
        }
    }
}

impl ReconcilerConfig {
    /// Requeue delay after a failed pass
    pub fn backoff_for(&self, error: &Error) -> Duration {
        if error.is_retriable() {
            self.error_backoff
        } else {
            self.requeue_interval
        }
    }
}

/// Which branch of the state machine a pass took
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassPhase {
    NotFound,
    Deleting,
    Normal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub phase: PassPhase,
    pub requeue_after: Duration,
}

impl ReconcileOutcome {
    fn new(phase: PassPhase, requeue_after: Duration) -> Self {
        Self {
            phase,
            requeue_after,
        }
    }
}

/// Drives dependent profiling objects toward a NodeObservabilityMachineConfig
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    events: Arc<dyn EventSink>,
    pool_health: Arc<dyn PoolHealthSource>,
    managers: Vec<CapabilityConfigManager>,
    tracker: RollbackTracker,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventSink>,
        pool_health: Arc<dyn PoolHealthSource>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            managers: CapabilityConfigManager::for_all(store.clone()),
            store,
            events,
            pool_health,
            tracker: RollbackTracker::new(),
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn tracker(&self) -> &RollbackTracker {
        &self.tracker
    }

    /// Run one reconcile pass for the named resource
    #[instrument(skip(self))]
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome> {
        let Some(config) = self.store.get_config(name).await? else {
            info!(
                "NodeObservabilityMachineConfig {} not found, it may have been deleted",
                name
            );
            self.tracker.lock(name).await.forget();
            return Ok(ReconcileOutcome::new(
                PassPhase::NotFound,
                self.config.requeue_interval,
            ));
        };

        if is_being_deleted(&config) {
            info!("NodeObservabilityMachineConfig {} marked for deletion, cleaning up", name);
            return self.cleanup(&config).await;
        }

        self.apply(&config).await
    }

    /// Invert every change recorded for the resource since the last commit
    ///
    /// Returns the number of capabilities reverted. Emits one event per
    /// capability attempted.
    pub async fn revert_changes(&self, config: &NodeObservabilityMachineConfig) -> Result<usize> {
        let name = config.name_any();
        let mut ledger = self.tracker.lock(&name).await;
        let attempted: Vec<(Capability, &'static str)> = Capability::ALL
            .into_iter()
            .filter_map(|c| ledger.get(c).map(|r| (c, r.action())))
            .collect();

        let result = ledger.revert_all(&self.managers).await;

        for (capability, action) in attempted {
            let reverted = ledger.get(capability).is_none();
            record_rollback(capability, reverted);
            let event = if reverted {
                ConfigEvent::normal(
                    REASON_REVERT_CONFIG,
                    format!(
                        "reverted {} {} after profiling pool degradation",
                        action,
                        capability.object_description()
                    ),
                )
            } else {
                ConfigEvent::warning(
                    REASON_REVERT_FAILED,
                    format!(
                        "failed to revert {} {}",
                        action,
                        capability.object_description()
                    ),
                )
            };
            self.notify(config, event).await;
        }

        result
    }

    #[instrument(skip(self, config), fields(name = %config.name_any()))]
    async fn apply(&self, config: &NodeObservabilityMachineConfig) -> Result<ReconcileOutcome> {
        let name = config.name_any();

        let config = with_finalizer(self.store.as_ref(), config)
            .await
            .map_err(|e| {
                Error::FinalizerError(format!("failed to add finalizer to {name}: {e}"))
            })?;

        if let Err(e) = ensure_profiling_pool(self.store.as_ref()).await {
            error!("Profiling MachineConfigPool reconciliation failed: {}", e);
            return Err(e);
        }

        let mut errors = self.converge(&config).await;

        let report = match self.pool_health.check(&config).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Failed to evaluate profiling pool health: {}", e);
                let report =
                    PoolHealthReport::new(PoolHealth::Unknown, format!("pool health unavailable: {e}"));
                errors.push(e);
                report
            }
        };

        let watch_pool = match report.health {
            // Back off after reverting: an enabled toggle recreates its
            // object on the next pass and the pool re-renders each time
            PoolHealth::Degraded => {
                warn!("Profiling pool degraded: {}", report.message);
                if let Err(e) = self.revert_changes(&config).await {
                    errors.push(e);
                }
                false
            }
            PoolHealth::Healthy => {
                self.tracker.lock(&name).await.commit();
                false
            }
            PoolHealth::Unknown => !self.tracker.lock(&name).await.is_empty(),
        };

        if let Some(err) = Error::aggregate(errors) {
            error!("Profiling config reconciliation failed for {}: {}", name, err);
            return Err(err);
        }

        self.update_status(&config, &report).await?;

        let requeue_after = if watch_pool {
            self.config.pool_poll_interval
        } else {
            self.config.requeue_interval
        };
        Ok(ReconcileOutcome::new(PassPhase::Normal, requeue_after))
    }

    /// Converge every capability, holding the rollback lock throughout
    ///
    /// Failures are collected so one capability never blocks another.
    async fn converge(&self, config: &NodeObservabilityMachineConfig) -> Vec<Error> {
        let mut ledger = self.tracker.lock(&config.name_any()).await;
        let mut errors = Vec::new();

        for manager in &self.managers {
            let capability = manager.capability();
            if capability.is_enabled(config) {
                match manager.ensure_exists().await {
                    Ok((object, true)) => {
                        ledger.record(capability, SyncRecord::Created(object));
                        record_change(capability, "created");
                        self.notify(
                            config,
                            ConfigEvent::normal(
                                REASON_CREATE_CONFIG,
                                format!("successfully created {}", capability.object_description()),
                            ),
                        )
                        .await;
                    }
                    Ok((_, false)) => {}
                    Err(e) => {
                        error!("Failed to enable {} profiling: {}", capability, e);
                        errors.push(e);
                    }
                }
            } else {
                match manager.ensure_absent().await {
                    Ok(true) => {
                        ledger.record(capability, SyncRecord::Deleted);
                        record_change(capability, "deleted");
                        self.notify(
                            config,
                            ConfigEvent::normal(
                                REASON_DELETE_CONFIG,
                                format!("successfully deleted {}", capability.object_description()),
                            ),
                        )
                        .await;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!("Failed to disable {} profiling: {}", capability, e);
                        errors.push(e);
                    }
                }
            }
        }

        errors
    }

    /// Remove everything this operator may have created, then drop the finalizer
    #[instrument(skip(self, config), fields(name = %config.name_any()))]
    async fn cleanup(&self, config: &NodeObservabilityMachineConfig) -> Result<ReconcileOutcome> {
        let name = config.name_any();
        if !has_finalizer(config) {
            debug!("Finalizer already removed from {}", name);
            return Ok(ReconcileOutcome::new(
                PassPhase::Deleting,
                self.config.requeue_interval,
            ));
        }

        let mut ledger = self.tracker.lock(&name).await;
        let mut errors = Vec::new();

        // Regardless of toggles: anything we ever created must go
        for manager in &self.managers {
            let capability = manager.capability();
            match manager.ensure_absent().await {
                Ok(true) => {
                    record_change(capability, "deleted");
                    self.notify(
                        config,
                        ConfigEvent::normal(
                            REASON_DELETE_CONFIG,
                            format!("successfully deleted {}", capability.object_description()),
                        ),
                    )
                    .await;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to clean up {} profiling config: {}", capability, e);
                    errors.push(e);
                }
            }
        }

        // The pool only goes once no profiling config can still target it
        if errors.is_empty() {
            if let Err(e) = remove_profiling_pool(self.store.as_ref()).await {
                error!("Failed to remove profiling MachineConfigPool: {}", e);
                errors.push(e);
            }
        }

        if let Some(err) = Error::aggregate(errors) {
            return Err(err);
        }

        without_finalizer(self.store.as_ref(), config, MACHINE_CONFIG_FINALIZER)
            .await
            .map_err(|e| {
                Error::FinalizerError(format!("failed to remove finalizer from {name}: {e}"))
            })?;
        ledger.forget();

        info!("Cleanup complete for NodeObservabilityMachineConfig: {}", name);
        Ok(ReconcileOutcome::new(
            PassPhase::Deleting,
            self.config.requeue_interval,
        ))
    }

    async fn update_status(
        &self,
        config: &NodeObservabilityMachineConfig,
        report: &PoolHealthReport,
    ) -> Result<()> {
        let mut updated = config.clone();
        let status = updated.status.get_or_insert_with(Default::default);
        status.last_update = Some(Utc::now().to_rfc3339());
        set_condition(&mut status.conditions, report.to_condition());

        if let Err(e) = self.store.update_config_status(&updated).await {
            error!("Failed to update status of {}: {}", config.name_any(), e);
            return Err(e);
        }
        Ok(())
    }

    /// Publish an event; failures are logged and never fail the pass
    async fn notify(&self, config: &NodeObservabilityMachineConfig, event: ConfigEvent) {
        let reason = event.reason;
        if let Err(e) = self.events.publish(config, event).await {
            warn!("Failed to publish {} event for {}: {}", reason, config.name_any(), e);
        }
    }
}

#[cfg(feature = "metrics")]
fn record_change(capability: Capability, action: &str) {
    super::metrics::inc_config_change(capability.key(), action);
}

#[cfg(not(feature = "metrics"))]
fn record_change(_capability: Capability, _action: &str) {}

#[cfg(feature = "metrics")]
fn record_rollback(capability: Capability, success: bool) {
    super::metrics::inc_rollback(capability.key(), success);
}

#[cfg(not(feature = "metrics"))]
fn record_rollback(_capability: Capability, _success: bool) {}

#[cfg(feature = "metrics")]
fn record_pass(elapsed: Duration, result: &Result<ReconcileOutcome>) {
    super::metrics::observe_reconcile_duration(elapsed.as_secs_f64());
    if let Err(e) = result {
        super::metrics::inc_reconcile_error(e.metric_label());
    }
}

#[cfg(not(feature = "metrics"))]
fn record_pass(_elapsed: Duration, _result: &Result<ReconcileOutcome>) {}

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub reconciler: Reconciler,
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let configs: Api<NodeObservabilityMachineConfig> = Api::all(state.client.clone());

    info!("Starting NodeObservabilityMachineConfig controller");

    // Verify CRD exists
    match configs.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("NodeObservabilityMachineConfig CRD is available"),
        Err(e) => {
            error!(
                "NodeObservabilityMachineConfig CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "NodeObservabilityMachineConfig CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(configs, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// kube-runtime entry point
///
/// Called whenever a NodeObservabilityMachineConfig changes or its requeue
/// timer expires. The object from the watch cache only supplies the name;
/// the pass re-reads it from the API server.
#[instrument(skip(obj, ctx), fields(name = %obj.name_any()))]
async fn reconcile(
    obj: Arc<NodeObservabilityMachineConfig>,
    ctx: Arc<ControllerState>,
) -> Result<Action> {
    let started = std::time::Instant::now();
    let result = ctx.reconciler.reconcile(&obj.name_any()).await;
    record_pass(started.elapsed(), &result);

    let outcome = result?;
    debug!(
        "Pass finished in {:?} phase, requeue in {:?}",
        outcome.phase, outcome.requeue_after
    );
    Ok(Action::requeue(outcome.requeue_after))
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(
    obj: Arc<NodeObservabilityMachineConfig>,
    error: &Error,
    ctx: Arc<ControllerState>,
) -> Action {
    error!("Reconciliation error for {}: {:?}", obj.name_any(), error);
    Action::requeue(ctx.reconciler.config().backoff_for(error))
}
