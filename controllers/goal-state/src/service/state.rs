//! Persisted service state
//!
//! The whole struct is written as one document under `STATE_KEY` after every
//! mutating operation. The IP config map rides along under
//! `PodIPConfigState`; its pod index is rebuilt on load.

use crate::ipconfig::IpConfigPool;
use crate::nc_list::NcList;
use chrono::{DateTime, Utc};
use cns_types::{CreateNetworkContainerRequest, OrchestratorType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store key of the service state document
pub const STATE_KEY: &str = "ContainerService";
/// Store key of the endpoint state document
pub const ENDPOINT_STATE_KEY: &str = "Endpoints";
/// Host version of an NC the dataplane authority never confirmed
pub const HOST_VERSION_UNKNOWN: i64 = -1;

/// Goal state and programming status of one network container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerStatus {
    #[serde(rename = "ID")]
    pub id: String,
    /// Target version of the stored request
    #[serde(rename = "VMVersion")]
    pub vm_version: String,
    /// Last version the dataplane authority reported as programmed
    pub host_version: i64,
    /// Request as received, authorization token removed
    pub create_network_container_request: CreateNetworkContainerRequest,
    pub vfp_update_complete: bool,
}

impl ContainerStatus {
    /// Target version at which programming was confirmed, if it was.
    pub fn completed_version(&self) -> Option<&str> {
        self.vfp_update_complete.then_some(self.vm_version.as_str())
    }
}

/// Network the node belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkInfo {
    pub network_name: String,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Everything persisted under `STATE_KEY`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceState {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub network_type: String,
    #[serde(default)]
    pub orchestrator_type: OrchestratorType,
    #[serde(rename = "NodeID", default)]
    pub node_id: String,
    #[serde(default)]
    pub initialized: bool,
    /// Orchestrator context key (pod name + namespace) to its NCs
    #[serde(default)]
    pub container_id_by_orchestrator_context: BTreeMap<String, NcList>,
    /// NC ID to its status
    #[serde(default)]
    pub container_status: BTreeMap<String, ContainerStatus>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkInfo>,
    #[serde(rename = "PodIPConfigState", default)]
    pub pod_ip_config_state: IpConfigPool,
    pub time_stamp: DateTime<Utc>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            location: String::new(),
            network_type: String::new(),
            orchestrator_type: OrchestratorType::Unknown,
            node_id: String::new(),
            initialized: false,
            container_id_by_orchestrator_context: BTreeMap::new(),
            container_status: BTreeMap::new(),
            networks: BTreeMap::new(),
            pod_ip_config_state: IpConfigPool::new(),
            time_stamp: Utc::now(),
        }
    }
}

impl ServiceState {
    /// Whether any NC or context association is stored
    pub fn are_ncs_present(&self) -> bool {
        !self.container_status.is_empty() || !self.container_id_by_orchestrator_context.is_empty()
    }

    /// NC IDs tracked for an orchestrator context key, in insertion order.
    pub fn ncs_for_context(&self, context_key: &str) -> Vec<String> {
        self.container_id_by_orchestrator_context
            .get(context_key)
            .map(|ncs| ncs.iter().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use cns_types::{IPState, PodInfo};

    #[test]
    fn test_state_round_trips_through_json() {
        let hook = RecordingHook::default();
        let mut state = ServiceState {
            orchestrator_type: OrchestratorType::KubernetesCRD,
            node_id: "node-1".to_string(),
            ..Default::default()
        };
        let mut req = nc_request("nc1", "3", &[("id-a", "10.0.0.5", 3), ("id-b", "10.0.0.6", 3)]);
        state
            .pod_ip_config_state
            .reconcile_secondary_ips("nc1", &mut req.secondary_ip_configs, &BTreeMap::new(), 3, false, &hook)
            .unwrap();
        state
            .pod_ip_config_state
            .assign("id-a", &PodInfo::new("web-0", "default"), &hook)
            .unwrap();
        state.container_status.insert(
            "nc1".to_string(),
            ContainerStatus {
                id: "nc1".to_string(),
                vm_version: "3".to_string(),
                host_version: 3,
                create_network_container_request: req,
                vfp_update_complete: true,
            },
        );
        state
            .container_id_by_orchestrator_context
            .insert("web-0default".to_string(), ["nc1", "nc2"].into_iter().collect());

        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("ContainerStatus").is_some());
        assert!(json.get("PodIPConfigState").is_some());

        let restored: ServiceState = serde_json::from_value(json).unwrap();
        assert_eq!(restored, state);
        assert_eq!(
            restored.pod_ip_config_state.get("id-a").unwrap().state,
            IPState::Assigned
        );
        assert_eq!(restored.ncs_for_context("web-0default"), vec!["nc1", "nc2"]);
    }

    #[test]
    fn test_completed_version() {
        let mut status = ContainerStatus {
            id: "nc1".to_string(),
            vm_version: "4".to_string(),
            host_version: HOST_VERSION_UNKNOWN,
            create_network_container_request: nc_request("nc1", "4", &[]),
            vfp_update_complete: false,
        };
        assert_eq!(status.completed_version(), None);
        status.vfp_update_complete = true;
        assert_eq!(status.completed_version(), Some("4"));
    }
}
