//! Tests for the reconciler module
//!
//! These tests drive full passes against the in-memory store:
//! - Dependent object creation and deletion per toggle
//! - Idempotency across repeated passes
//! - Pool-health driven commit and rollback
//! - Deletion cleanup and finalizer handling
//! - Error aggregation and status persistence

#[cfg(test)]
mod tests {
    use super::super::capability::{
        Capability, CRIO_PROFILING_CONFIG_NAME, KUBELET_PROFILING_CONFIG_NAME, MC_ROLE_LABEL,
        PROFILING_POOL_NAME,
    };
    use super::super::events::{
        EventType, REASON_CREATE_CONFIG, REASON_DELETE_CONFIG, REASON_REVERT_CONFIG,
        REASON_REVERT_FAILED,
    };
    use super::super::finalizers::{has_finalizer, MACHINE_CONFIG_FINALIZER};
    use super::super::pool::{PoolHealth, CONDITION_TYPE_POOL_HEALTHY};
    use super::super::reconciler::*;
    use super::super::rollback::SyncRecord;
    use super::super::testing::{
        machine_config_request, InMemoryStore, RecordingEvents, StaticPoolHealth, StoreFailure,
    };
    use crate::crd::types::{find_condition, CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE};
    use crate::error::Error;
    use kube::ResourceExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const MACHINE_CONFIG: &str = "MachineConfig";
    const KUBELET_CONFIG: &str = "KubeletConfig";
    const POOL: &str = "MachineConfigPool";

    struct Harness {
        store: Arc<InMemoryStore>,
        events: Arc<RecordingEvents>,
        health: Arc<StaticPoolHealth>,
        reconciler: Reconciler,
    }

    fn harness(health: PoolHealth) -> Harness {
        let store = Arc::new(InMemoryStore::default());
        let events = Arc::new(RecordingEvents::default());
        let health = Arc::new(StaticPoolHealth::new(health));
        let reconciler = Reconciler::new(
            store.clone(),
            events.clone(),
            health.clone(),
            ReconcilerConfig::default(),
        );
        Harness {
            store,
            events,
            health,
            reconciler,
        }
    }

    impl Harness {
        fn toggle(&self, name: &str, crio: bool, kubelet: bool) {
            let mut config = self.store.config(name).unwrap();
            config.spec.enable_crio_profiling = crio;
            config.spec.enable_kubelet_profiling = kubelet;
            self.store.insert_config(config);
        }

        async fn pending_records(&self, name: &str) -> usize {
            self.reconciler.tracker().lock(name).await.len()
        }
    }

    #[test]
    fn test_default_config_intervals() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.requeue_interval, Duration::from_secs(1800));
        assert_eq!(config.error_backoff, Duration::from_secs(180));
        assert_eq!(config.pool_poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_for_error_kinds() {
        let config = ReconcilerConfig::default();
        let conflict = Error::Conflict {
            kind: KUBELET_CONFIG.to_string(),
            name: KUBELET_PROFILING_CONFIG_NAME.to_string(),
        };
        assert_eq!(config.backoff_for(&conflict), config.error_backoff);
        assert_eq!(
            config.backoff_for(&Error::ConfigError("bad".to_string())),
            config.requeue_interval
        );
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let h = harness(PoolHealth::Healthy);
        let outcome = assert_ok!(h.reconciler.reconcile("ghost").await);

        assert_eq!(outcome.phase, PassPhase::NotFound);
        assert_eq!(outcome.requeue_after, Duration::from_secs(1800));
        assert_eq!(h.store.status_updates(), 0);
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_kubelet_enabled_creates_only_kubelet_config() {
        let h = harness(PoolHealth::Healthy);
        h.store.insert_config(machine_config_request("cluster", false, true));

        let outcome = assert_ok!(h.reconciler.reconcile("cluster").await);
        assert_eq!(outcome.phase, PassPhase::Normal);
        assert_eq!(outcome.requeue_after, Duration::from_secs(1800));

        let kubelet = h
            .store
            .object(KUBELET_CONFIG, KUBELET_PROFILING_CONFIG_NAME)
            .unwrap();
        assert_eq!(
            kubelet.labels().get(MC_ROLE_LABEL).map(String::as_str),
            Some(PROFILING_POOL_NAME)
        );
        assert!(!h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));
        assert!(h.store.contains(POOL, PROFILING_POOL_NAME));

        let stored = h.store.config("cluster").unwrap();
        assert!(has_finalizer(&stored));
        let status = stored.status.unwrap();
        assert!(status.last_update.is_some());
        let condition = find_condition(&status.conditions, CONDITION_TYPE_POOL_HEALTHY).unwrap();
        assert_eq!(condition.status, CONDITION_STATUS_TRUE);

        let created = h.events.with_reason(REASON_CREATE_CONFIG);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].type_, EventType::Normal);
        assert!(created[0].message.contains("kubelet"));

        // Healthy pool commits the pass
        assert_eq!(h.pending_records("cluster").await, 0);
    }

    #[tokio::test]
    async fn test_repeated_passes_are_idempotent() {
        let h = harness(PoolHealth::Healthy);
        h.store.insert_config(machine_config_request("cluster", true, true));

        assert_ok!(h.reconciler.reconcile("cluster").await);
        assert_ok!(h.reconciler.reconcile("cluster").await);

        assert_eq!(h.store.count(MACHINE_CONFIG), 1);
        assert_eq!(h.store.count(KUBELET_CONFIG), 1);
        assert_eq!(h.store.count(POOL), 1);
        assert_eq!(h.events.with_reason(REASON_CREATE_CONFIG).len(), 2);
        assert_eq!(h.store.config("cluster").unwrap().finalizers().len(), 1);
    }

    #[tokio::test]
    async fn test_enabling_crio_leaves_existing_kubelet_config_alone() {
        let h = harness(PoolHealth::Unknown);
        h.store.insert_config(machine_config_request("cluster", false, true));
        let mut existing = Capability::Kubelet.spec().build().unwrap();
        existing.metadata.resource_version = Some("kubelet-rv".to_string());
        h.store.insert_object(KUBELET_CONFIG, existing);

        assert_ok!(h.reconciler.reconcile("cluster").await);
        assert_eq!(h.pending_records("cluster").await, 0);

        h.toggle("cluster", true, true);
        assert_ok!(h.reconciler.reconcile("cluster").await);

        assert_eq!(h.store.count(MACHINE_CONFIG), 1);
        assert_eq!(h.store.count(KUBELET_CONFIG), 1);
        let kubelet = h
            .store
            .object(KUBELET_CONFIG, KUBELET_PROFILING_CONFIG_NAME)
            .unwrap();
        assert_eq!(kubelet.metadata.resource_version.as_deref(), Some("kubelet-rv"));

        let ledger = h.reconciler.tracker().lock("cluster").await;
        assert_eq!(ledger.len(), 1);
        assert!(matches!(
            ledger.get(Capability::Crio),
            Some(SyncRecord::Created(_))
        ));
        assert!(ledger.get(Capability::Kubelet).is_none());
        drop(ledger);

        assert_eq!(h.events.with_reason(REASON_CREATE_CONFIG).len(), 1);
    }

    #[tokio::test]
    async fn test_disabling_toggle_deletes_dependent_object() {
        let h = harness(PoolHealth::Healthy);
        h.store.insert_config(machine_config_request("cluster", true, false));
        assert_ok!(h.reconciler.reconcile("cluster").await);
        assert!(h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));

        h.toggle("cluster", false, false);
        assert_ok!(h.reconciler.reconcile("cluster").await);

        assert!(!h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));
        let deleted = h.events.with_reason(REASON_DELETE_CONFIG);
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].message.contains("crio"));
    }

    #[tokio::test]
    async fn test_updating_pool_keeps_records_and_polls() {
        let h = harness(PoolHealth::Unknown);
        h.store.insert_config(machine_config_request("cluster", true, false));

        let outcome = assert_ok!(h.reconciler.reconcile("cluster").await);
        assert_eq!(outcome.requeue_after, Duration::from_secs(60));
        assert_eq!(h.pending_records("cluster").await, 1);

        h.health.set(PoolHealth::Healthy);
        let outcome = assert_ok!(h.reconciler.reconcile("cluster").await);
        assert_eq!(outcome.requeue_after, Duration::from_secs(1800));
        assert_eq!(h.pending_records("cluster").await, 0);
    }

    #[tokio::test]
    async fn test_degraded_pool_reverts_created_config() {
        let h = harness(PoolHealth::Unknown);
        h.store.insert_config(machine_config_request("cluster", false, true));
        assert_ok!(h.reconciler.reconcile("cluster").await);
        assert!(h.store.contains(KUBELET_CONFIG, KUBELET_PROFILING_CONFIG_NAME));

        h.health.set(PoolHealth::Degraded);
        let outcome = assert_ok!(h.reconciler.reconcile("cluster").await);

        assert!(!h.store.contains(KUBELET_CONFIG, KUBELET_PROFILING_CONFIG_NAME));
        // No fast create/revert cycle while the pool stays degraded
        assert_eq!(outcome.requeue_after, Duration::from_secs(1800));
        assert_eq!(h.pending_records("cluster").await, 0);

        let reverted = h.events.with_reason(REASON_REVERT_CONFIG);
        assert_eq!(reverted.len(), 1);
        assert!(reverted[0].message.contains("created"));

        let status = h.store.config("cluster").unwrap().status.unwrap();
        let condition = find_condition(&status.conditions, CONDITION_TYPE_POOL_HEALTHY).unwrap();
        assert_eq!(condition.status, CONDITION_STATUS_FALSE);
    }

    #[tokio::test]
    async fn test_degraded_pool_recreates_deleted_config() {
        let h = harness(PoolHealth::Healthy);
        h.store.insert_config(machine_config_request("cluster", true, false));
        assert_ok!(h.reconciler.reconcile("cluster").await);

        h.toggle("cluster", false, false);
        h.health.set(PoolHealth::Degraded);
        assert_ok!(h.reconciler.reconcile("cluster").await);

        assert!(h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));
        assert_eq!(h.events.with_reason(REASON_DELETE_CONFIG).len(), 1);
        let reverted = h.events.with_reason(REASON_REVERT_CONFIG);
        assert_eq!(reverted.len(), 1);
        assert!(reverted[0].message.contains("deleted"));
    }

    #[tokio::test]
    async fn test_degraded_pool_without_our_changes_is_left_alone() {
        let h = harness(PoolHealth::Healthy);
        h.store.insert_config(machine_config_request("cluster", false, true));
        assert_ok!(h.reconciler.reconcile("cluster").await);

        h.health.set(PoolHealth::Degraded);
        let outcome = assert_ok!(h.reconciler.reconcile("cluster").await);

        assert!(h.store.contains(KUBELET_CONFIG, KUBELET_PROFILING_CONFIG_NAME));
        assert!(h.events.with_reason(REASON_REVERT_CONFIG).is_empty());
        assert_eq!(outcome.requeue_after, Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn test_one_capability_failure_does_not_block_the_other() {
        let h = harness(PoolHealth::Unknown);
        h.store.insert_config(machine_config_request("cluster", true, true));
        h.store
            .fail_creates(MACHINE_CONFIG, StoreFailure::Unavailable);

        let err = assert_err!(h.reconciler.reconcile("cluster").await);
        assert!(matches!(err, Error::Convergence(ref errors) if errors.len() == 1));
        assert!(err.is_retriable());

        assert!(h.store.contains(KUBELET_CONFIG, KUBELET_PROFILING_CONFIG_NAME));
        assert!(!h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));
        assert_eq!(h.store.status_updates(), 0);
        assert_eq!(h.pending_records("cluster").await, 1);

        // The injected failure is one-shot; the next pass converges
        assert_ok!(h.reconciler.reconcile("cluster").await);
        assert!(h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));
        assert_eq!(h.store.status_updates(), 1);
    }

    #[tokio::test]
    async fn test_create_race_surfaces_conflict() {
        // Unknown health keeps records, so nothing can be committed away
        let h = harness(PoolHealth::Unknown);
        h.store.insert_config(machine_config_request("cluster", false, true));
        let winner = Capability::Kubelet.spec().build().unwrap();
        h.store
            .fail_creates(KUBELET_CONFIG, StoreFailure::Race(Box::new(winner)));

        let err = assert_err!(h.reconciler.reconcile("cluster").await);
        assert!(err.is_retriable());
        assert_eq!(h.store.count(KUBELET_CONFIG), 1);
        assert!(h.events.with_reason(REASON_CREATE_CONFIG).is_empty());
        assert_eq!(h.pending_records("cluster").await, 0);
    }

    #[tokio::test]
    async fn test_finalizer_failure_stops_the_pass() {
        let h = harness(PoolHealth::Healthy);
        h.store.insert_config(machine_config_request("cluster", true, true));
        h.store.fail_config_update(StoreFailure::Conflict);

        let err = assert_err!(h.reconciler.reconcile("cluster").await);
        assert!(matches!(err, Error::FinalizerError(_)));
        assert_eq!(h.store.count(MACHINE_CONFIG), 0);
        assert_eq!(h.store.count(KUBELET_CONFIG), 0);
        assert_eq!(h.store.count(POOL), 0);
    }

    #[tokio::test]
    async fn test_deletion_removes_everything_then_finalizer() {
        let h = harness(PoolHealth::Healthy);
        h.store.insert_config(machine_config_request("cluster", true, true));
        assert_ok!(h.reconciler.reconcile("cluster").await);

        h.store.mark_deleted("cluster");
        let outcome = assert_ok!(h.reconciler.reconcile("cluster").await);
        assert_eq!(outcome.phase, PassPhase::Deleting);

        assert_eq!(h.store.count(MACHINE_CONFIG), 0);
        assert_eq!(h.store.count(KUBELET_CONFIG), 0);
        assert_eq!(h.store.count(POOL), 0);
        assert_eq!(h.events.with_reason(REASON_DELETE_CONFIG).len(), 2);
        // Last finalizer gone: the API server drops the object
        assert!(h.store.config("cluster").is_none());
        assert_eq!(h.pending_records("cluster").await, 0);

        let outcome = assert_ok!(h.reconciler.reconcile("cluster").await);
        assert_eq!(outcome.phase, PassPhase::NotFound);
    }

    #[tokio::test]
    async fn test_deletion_cleans_up_disabled_leftovers() {
        let h = harness(PoolHealth::Healthy);
        h.store.insert_config(machine_config_request("cluster", false, true));
        assert_ok!(h.reconciler.reconcile("cluster").await);

        // A crio config left behind by some earlier run
        let leftover = Capability::Crio.spec().build().unwrap();
        h.store.insert_object(MACHINE_CONFIG, leftover);

        h.store.mark_deleted("cluster");
        assert_ok!(h.reconciler.reconcile("cluster").await);
        assert!(!h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));
        assert!(!h.store.contains(KUBELET_CONFIG, KUBELET_PROFILING_CONFIG_NAME));
    }

    #[tokio::test]
    async fn test_failed_cleanup_keeps_finalizer() {
        let h = harness(PoolHealth::Healthy);
        h.store.insert_config(machine_config_request("cluster", true, true));
        assert_ok!(h.reconciler.reconcile("cluster").await);

        h.store.mark_deleted("cluster");
        h.store
            .fail_deletes(KUBELET_CONFIG, StoreFailure::Unavailable);

        let err = assert_err!(h.reconciler.reconcile("cluster").await);
        assert!(err.is_retriable());

        let stored = h.store.config("cluster").unwrap();
        assert_eq!(stored.finalizers(), [MACHINE_CONFIG_FINALIZER.to_string()]);
        assert!(!h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));
        assert!(h.store.contains(KUBELET_CONFIG, KUBELET_PROFILING_CONFIG_NAME));
        assert!(h.store.contains(POOL, PROFILING_POOL_NAME));

        assert_ok!(h.reconciler.reconcile("cluster").await);
        assert!(h.store.config("cluster").is_none());
        assert_eq!(h.store.count(POOL), 0);
    }

    #[tokio::test]
    async fn test_deletion_without_our_finalizer_is_noop() {
        let h = harness(PoolHealth::Healthy);
        let mut config = machine_config_request("cluster", true, false);
        config.metadata.finalizers = Some(vec!["other.io/hold".to_string()]);
        h.store.insert_config(config);
        let leftover = Capability::Crio.spec().build().unwrap();
        h.store.insert_object(MACHINE_CONFIG, leftover);
        h.store.mark_deleted("cluster");

        let outcome = assert_ok!(h.reconciler.reconcile("cluster").await);
        assert_eq!(outcome.phase, PassPhase::Deleting);
        assert!(h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));
        assert_eq!(h.store.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_revert_failure_emits_warning_and_keeps_record() {
        let h = harness(PoolHealth::Healthy);
        let config = machine_config_request("cluster", false, false);
        h.store.insert_config(config.clone());
        h.reconciler
            .tracker()
            .lock("cluster")
            .await
            .record(Capability::Crio, SyncRecord::Deleted);
        h.store
            .fail_creates(MACHINE_CONFIG, StoreFailure::Unavailable);

        assert_err!(h.reconciler.revert_changes(&config).await);

        let failed = h.events.with_reason(REASON_REVERT_FAILED);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].type_, EventType::Warning);
        assert_eq!(h.pending_records("cluster").await, 1);

        let reverted = assert_ok!(h.reconciler.revert_changes(&config).await);
        assert_eq!(reverted, 1);
        assert!(h.store.contains(MACHINE_CONFIG, CRIO_PROFILING_CONFIG_NAME));
    }
}
