//! Kubernetes Events emitted for every dependent-object change

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::{Client, Resource, ResourceExt};

use crate::crd::NodeObservabilityMachineConfig;
use crate::error::{Error, Result};

pub const REASON_CREATE_CONFIG: &str = "CreateConfig";
pub const REASON_DELETE_CONFIG: &str = "DeleteConfig";
pub const REASON_REVERT_CONFIG: &str = "RevertConfig";
pub const REASON_REVERT_FAILED: &str = "RevertFailed";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => f.write_str("Normal"),
            EventType::Warning => f.write_str("Warning"),
        }
    }
}

/// One externally visible notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigEvent {
    pub type_: EventType,
    pub reason: &'static str,
    pub message: String,
}

impl ConfigEvent {
    pub fn normal(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Normal,
            reason,
            message: message.into(),
        }
    }

    pub fn warning(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Warning,
            reason,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        config: &NodeObservabilityMachineConfig,
        event: ConfigEvent,
    ) -> Result<()>;
}

/// Writes `core/v1` Events into a fixed namespace
///
/// The desired-state resource is cluster-scoped, so its events need a
/// namespace chosen by the operator.
pub struct KubeEventSink {
    client: Client,
    namespace: String,
}

impl KubeEventSink {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(
        &self,
        config: &NodeObservabilityMachineConfig,
        event: ConfigEvent,
    ) -> Result<()> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), &self.namespace);

        let time = Time(chrono::Utc::now());
        let object = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", config.name_any())),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            type_: Some(event.type_.to_string()),
            reason: Some(event.reason.to_string()),
            message: Some(event.message),
            involved_object: config.object_ref(&()),
            reporting_component: Some(super::store::FIELD_MANAGER.to_string()),
            first_timestamp: Some(time.clone()),
            last_timestamp: Some(time),
            count: Some(1),
            ..Default::default()
        };

        events
            .create(&PostParams::default(), &object)
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }
}
