//! Host-resident endpoint state
//!
//! Container ID keyed record of which pod owns an endpoint and which addresses
//! sit on each of its interfaces. Persisted in its own store record; the CNI
//! state migration path reads and writes it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Addresses on one interface, in CIDR form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IPInfo {
    #[serde(rename = "IPv4", default)]
    pub ipv4: Vec<String>,
    #[serde(rename = "IPv6", default)]
    pub ipv6: Vec<String>,
}

/// Endpoint owned by one pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    #[serde(rename = "PodName")]
    pub pod_name: String,
    #[serde(rename = "PodNamespace")]
    pub pod_namespace: String,
    /// Interface name to addresses.
    #[serde(rename = "IfnameToIPMap", default)]
    pub ifname_to_ip_map: BTreeMap<String, IPInfo>,
}

/// Container ID to endpoint.
pub type EndpointState = BTreeMap<String, EndpointInfo>;
