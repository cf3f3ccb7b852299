//! Orchestrator context (pod identity)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding an orchestrator context payload.
#[derive(Debug, Error)]
pub enum PodInfoError {
    /// The request carried no orchestrator context
    #[error("orchestrator context is not set")]
    Missing,

    /// The payload is not a pod identity
    #[error("unmarshalling orchestrator context failed: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload decoded but names no pod
    #[error("orchestrator context has an empty pod name")]
    EmptyName,
}

/// Pod identity carried in the opaque orchestrator context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodInfo {
    #[serde(rename = "PodName")]
    pub pod_name: String,
    #[serde(rename = "PodNamespace", default)]
    pub pod_namespace: String,
    #[serde(rename = "PodInfraContainerID", default, skip_serializing_if = "String::is_empty")]
    pub infra_container_id: String,
    #[serde(rename = "PodInterfaceID", default, skip_serializing_if = "String::is_empty")]
    pub interface_id: String,
}

impl PodInfo {
    /// Pod identity without interface details
    pub fn new(pod_name: impl Into<String>, pod_namespace: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
            pod_namespace: pod_namespace.into(),
            ..Default::default()
        }
    }

    /// Attach the infra container and interface IDs
    pub fn with_interface(mut self, infra_container_id: impl Into<String>, interface_id: impl Into<String>) -> Self {
        self.infra_container_id = infra_container_id.into();
        self.interface_id = interface_id.into();
        self
    }

    /// Decodes the pod identity out of an orchestrator context payload.
    pub fn from_orchestrator_context(context: Option<&serde_json::Value>) -> Result<Self, PodInfoError> {
        let context = context.ok_or(PodInfoError::Missing)?;
        // serde also maps a sequence onto a struct positionally.
        if !context.is_object() {
            return Err(PodInfoError::Malformed(<serde_json::Error as serde::de::Error>::custom(
                format!("expected a JSON object, got {context}"),
            )));
        }
        let pod_info: PodInfo = serde_json::from_value(context.clone())?;
        if pod_info.pod_name.is_empty() {
            return Err(PodInfoError::EmptyName);
        }
        Ok(pod_info)
    }

    /// Key under which the NCs of this pod are tracked.
    ///
    /// Name and namespace are concatenated without a separator; persisted
    /// snapshots already use this form.
    pub fn orchestrator_context_key(&self) -> String {
        format!("{}{}", self.pod_name, self.pod_namespace)
    }

    /// Key under which the IPs handed to this pod are indexed.
    pub fn interface_key(&self) -> String {
        if self.interface_id.is_empty() {
            self.orchestrator_context_key()
        } else {
            self.interface_id.clone()
        }
    }

    /// Encode as an orchestrator context payload
    pub fn to_orchestrator_context(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
