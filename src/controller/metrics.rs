//! Prometheus metrics for the node observability operator
//!
//! # Exported metrics
//! - `nodeobs_reconcile_duration_seconds` (histogram): reconcile pass duration.
//! - `nodeobs_reconcile_errors_total` (counter): failed passes labeled by error kind.
//! - `nodeobs_config_changes_total` (counter): dependent objects created/deleted, by capability.
//! - `nodeobs_rollbacks_total` (counter): rollback attempts, by capability and result.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// Error category, see `Error::metric_label`
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ChangeLabels {
    pub capability: String,
    /// "created" or "deleted"
    pub action: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RollbackLabels {
    pub capability: String,
    /// "success" or "failed"
    pub result: String,
}

pub static RECONCILE_DURATION_SECONDS: Lazy<Histogram> =
    // 1ms .. ~32s across 16 buckets.
    Lazy::new(|| Histogram::new(exponential_buckets(0.001, 2.0, 16)));

pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static CONFIG_CHANGES_TOTAL: Lazy<Family<ChangeLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static ROLLBACKS_TOTAL: Lazy<Family<RollbackLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Global registry served on `/metrics`
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::with_prefix("nodeobs");
    registry.register(
        "reconcile_duration_seconds",
        "Duration of reconcile passes",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "reconcile_errors",
        "Reconcile passes that returned an error",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "config_changes",
        "Dependent profiling objects created or deleted",
        CONFIG_CHANGES_TOTAL.clone(),
    );
    registry.register(
        "rollbacks",
        "Rollback attempts for profiling config changes",
        ROLLBACKS_TOTAL.clone(),
    );
    registry
});

pub fn observe_reconcile_duration(seconds: f64) {
    RECONCILE_DURATION_SECONDS.observe(seconds);
}

pub fn inc_reconcile_error(kind: &str) {
    RECONCILE_ERRORS_TOTAL
        .get_or_create(&ErrorLabels {
            kind: kind.to_string(),
        })
        .inc();
}

pub fn inc_config_change(capability: &str, action: &str) {
    CONFIG_CHANGES_TOTAL
        .get_or_create(&ChangeLabels {
            capability: capability.to_string(),
            action: action.to_string(),
        })
        .inc();
}

pub fn inc_rollback(capability: &str, success: bool) {
    ROLLBACKS_TOTAL
        .get_or_create(&RollbackLabels {
            capability: capability.to_string(),
            result: if success { "success" } else { "failed" }.to_string(),
        })
        .inc();
}
