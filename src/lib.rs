//! Node Observability Operator: profiling toggles for OpenShift nodes
//!
//! This crate provides a Kubernetes operator that enables and disables
//! kubelet and CRI-O profiling on worker nodes by managing
//! `machineconfiguration.openshift.io` resources, rolling its changes back
//! when the profiling pool degrades.

pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
