//! Pod IP request and response payloads

use crate::network_container::{IPConfiguration, IPSubnet};
use crate::response::Response;
use serde::{Deserialize, Serialize};

/// Request for (or release of) the IPs of one pod interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IPConfigsRequest {
    /// Specific IPs the caller wants; empty means any available IP.
    #[serde(default, rename = "desiredIPAddresses")]
    pub desired_ip_addresses: Vec<String>,
    #[serde(default, rename = "podInterfaceID")]
    pub pod_interface_id: String,
    #[serde(default, rename = "infraContainerID")]
    pub infra_container_id: String,
    pub orchestrator_context: Option<serde_json::Value>,
}

/// Primary interface of the host, as cached by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostIPInfo {
    #[serde(rename = "gatewayIPAddress", default)]
    pub gateway: String,
    #[serde(rename = "primaryIP")]
    pub primary_ip: String,
    #[serde(default)]
    pub subnet: String,
}

/// One IP handed to a pod, with the context a CNI plugin needs to wire it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodIpInfo {
    #[serde(rename = "PodIPConfig")]
    pub pod_ip_config: IPSubnet,
    #[serde(rename = "NetworkContainerPrimaryIPConfig")]
    pub network_container_primary_ip_config: IPConfiguration,
    #[serde(rename = "HostPrimaryIPInfo", default)]
    pub host_primary_ip_info: HostIPInfo,
}

/// Result of a pod IP request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IPConfigsResponse {
    #[serde(rename = "Response")]
    pub response: Response,
    #[serde(default)]
    pub pod_ip_info: Vec<PodIpInfo>,
}

impl IPConfigsResponse {
    /// Response carrying only an error
    pub fn failure(response: Response) -> Self {
        Self {
            response,
            pod_ip_info: Vec::new(),
        }
    }
}
