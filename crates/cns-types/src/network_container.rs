//! Network container goal state
//!
//! A network container (NC) is a versioned block of addresses the control plane
//! assigns to this node. The create request is the goal state; the service keeps
//! a stripped copy of it per NC.

use crate::ip_config::SecondaryIPConfig;
use crate::response::Response;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Address plus prefix length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IPSubnet {
    pub ip_address: String,
    pub prefix_length: u8,
}

impl IPSubnet {
    /// Address with its prefix length
    pub fn new(ip_address: impl Into<String>, prefix_length: u8) -> Self {
        Self {
            ip_address: ip_address.into(),
            prefix_length,
        }
    }
}

/// Primary address configuration of a network container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IPConfiguration {
    #[serde(rename = "IPSubnet")]
    pub ip_subnet: IPSubnet,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub gateway_ip_address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway_ipv6_address: String,
}

/// Type of the workload the network container backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkContainerType {
    AzureContainerInstance,
    Docker,
    Kubernetes,
    Basic,
    JobObject,
    COW,
    BackendNICNC,
    WebApps,
    /// Anything the service does not know how to interpret.
    #[serde(other)]
    Unsupported,
}

impl fmt::Display for NetworkContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Orchestrator that owns the node. Decides which save path a goal-state
/// update takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrchestratorType {
    Kubernetes,
    KubernetesCRD,
    ServiceFabric,
    Batch,
    DBforPostgreSQL,
    AzureFirstParty,
    WebApps,
    BackendNICNC,
    #[default]
    #[serde(other)]
    Unknown,
}

impl OrchestratorType {
    /// Orchestrators whose NCs are tracked per orchestrator context (ncList).
    pub fn tracks_context(self) -> bool {
        matches!(
            self,
            OrchestratorType::Kubernetes
                | OrchestratorType::ServiceFabric
                | OrchestratorType::Batch
                | OrchestratorType::DBforPostgreSQL
                | OrchestratorType::AzureFirstParty
                | OrchestratorType::WebApps
                | OrchestratorType::BackendNICNC
        )
    }
}

impl fmt::Display for OrchestratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::str::FromStr for OrchestratorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .ok()
            .filter(|t| *t != OrchestratorType::Unknown)
            .ok_or_else(|| format!("unknown orchestrator type {s}"))
    }
}

/// Goal state for one network container, as sent by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNetworkContainerRequest {
    #[serde(rename = "NetworkContainerid")]
    pub network_container_id: String,
    pub network_container_type: NetworkContainerType,
    /// Orchestrator-assigned target version, transmitted as a string.
    pub version: String,
    #[serde(rename = "IPConfiguration")]
    pub ip_configuration: IPConfiguration,
    /// Secondary IP configs keyed by IP config ID.
    #[serde(default)]
    pub secondary_ip_configs: BTreeMap<String, SecondaryIPConfig>,
    /// Opaque pod identity payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_context: Option<serde_json::Value>,
    #[serde(default)]
    pub primary_interface_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip_configuration: Option<IPConfiguration>,
    #[serde(default)]
    pub allow_host_to_nc_communication: bool,
    #[serde(default)]
    pub allow_nc_to_host_communication: bool,
    #[serde(default, rename = "HostPrimaryIP")]
    pub host_primary_ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub authorization_token: String,
}

impl CreateNetworkContainerRequest {
    /// Copy of the request with the authorization token removed, safe to
    /// persist or log.
    pub fn without_token(&self) -> Self {
        let mut stripped = self.clone();
        stripped.authorization_token.clear();
        stripped
    }

    /// Checks the request carries the fields every save path needs.
    pub fn validate(&self) -> Result<(), String> {
        if self.network_container_id.is_empty() {
            return Err("network container id is empty".to_string());
        }
        if self.version.is_empty() {
            return Err(format!(
                "network container {} has no version",
                self.network_container_id
            ));
        }
        for (id, config) in &self.secondary_ip_configs {
            if config.ip_address.is_empty() {
                return Err(format!("secondary ip config {id} has an empty address"));
            }
        }
        Ok(())
    }
}

/// Query for the NCs associated with one orchestrator context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNetworkContainerRequest {
    #[serde(default)]
    pub network_container_id: String,
    pub orchestrator_context: Option<serde_json::Value>,
}

/// One network container as returned to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNetworkContainerResponse {
    pub network_container_id: String,
    #[serde(rename = "IPConfiguration")]
    pub ip_configuration: IPConfiguration,
    #[serde(default)]
    pub primary_interface_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip_configuration: Option<IPConfiguration>,
    #[serde(default)]
    pub allow_host_to_nc_communication: bool,
    #[serde(default)]
    pub allow_nc_to_host_communication: bool,
    pub response: Response,
}

impl From<&CreateNetworkContainerRequest> for GetNetworkContainerResponse {
    fn from(req: &CreateNetworkContainerRequest) -> Self {
        Self {
            network_container_id: req.network_container_id.clone(),
            ip_configuration: req.ip_configuration.clone(),
            primary_interface_identifier: req.primary_interface_identifier.clone(),
            local_ip_configuration: req.local_ip_configuration.clone(),
            allow_host_to_nc_communication: req.allow_host_to_nc_communication,
            allow_nc_to_host_communication: req.allow_nc_to_host_communication,
            response: Response::success(),
        }
    }
}

/// Every NC stored on the node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAllNetworkContainersResponse {
    pub network_containers: Vec<GetNetworkContainerResponse>,
    pub response: Response,
}

/// Attach/detach request for the host-resident container path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureContainerNetworkingRequest {
    #[serde(rename = "Containerid")]
    pub container_id: String,
    #[serde(rename = "NetworkContainerid")]
    pub network_container_id: String,
}
