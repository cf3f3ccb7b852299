//! Test utilities for unit testing the goal-state service
//!
//! Request builders, recording mocks for the collaborators the client crates
//! do not cover, and a harness wiring an orchestrator to in-memory mocks.

use crate::config::{ChannelMode, ManagedSettings, ServiceConfig};
use crate::dnc::{ControlPlaneClientTrait, DncError, NodeGoalState};
use crate::metrics::StateTransitionHook;
use crate::net_plugin::{NetPluginError, NetPluginTrait};
use crate::service::{Collaborators, GoalStateOrchestrator};
use crate::store::{KeyValueStore, MemoryStore};
use cns_types::{
    CreateNetworkContainerRequest, IPConfiguration, IPSubnet, IPState, NetworkContainerType, OrchestratorType,
    PodInfo, SecondaryIPConfig,
};
use iptables_client::MockIptablesClient;
use nmagent_client::MockNmAgentClient;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const HOST_PRIMARY_IP: &str = "10.224.0.4";
pub const NC_PRIMARY_IP: &str = "10.0.0.4";
pub const INFRA_NETWORK_ID: &str = "infra-vnet";
pub const NODE_ID: &str = "node-1";

type Transition = (String, Option<IPState>, Option<IPState>);

/// Hook that remembers every transition it sees
#[derive(Debug, Default)]
pub struct RecordingHook {
    events: Mutex<Vec<Transition>>,
}

impl RecordingHook {
    pub fn events(&self) -> Vec<Transition> {
        self.events.lock().unwrap().clone()
    }
}

impl StateTransitionHook for RecordingHook {
    fn on_transition(&self, ip_config_id: &str, from: Option<IPState>, to: Option<IPState>) {
        self.events
            .lock()
            .unwrap()
            .push((ip_config_id.to_string(), from, to));
    }
}

/// Secondary configs from `(id, ip, nc_version)` triples
pub fn secondary_configs(entries: &[(&str, &str, i64)]) -> BTreeMap<String, SecondaryIPConfig> {
    entries
        .iter()
        .map(|(id, ip, version)| (id.to_string(), SecondaryIPConfig::new(*ip, *version)))
        .collect()
}

/// Docker NC on 10.0.0.0/24 with the given secondaries
pub fn nc_request(nc_id: &str, version: &str, secondaries: &[(&str, &str, i64)]) -> CreateNetworkContainerRequest {
    CreateNetworkContainerRequest {
        network_container_id: nc_id.to_string(),
        network_container_type: NetworkContainerType::Docker,
        version: version.to_string(),
        ip_configuration: IPConfiguration {
            ip_subnet: IPSubnet::new(NC_PRIMARY_IP, 24),
            dns_servers: vec!["168.63.129.16".to_string()],
            gateway_ip_address: "10.0.0.1".to_string(),
            gateway_ipv6_address: String::new(),
        },
        secondary_ip_configs: secondary_configs(secondaries),
        orchestrator_context: None,
        primary_interface_identifier: "10.0.0.4/24".to_string(),
        local_ip_configuration: None,
        allow_host_to_nc_communication: false,
        allow_nc_to_host_communication: false,
        host_primary_ip: String::new(),
        authorization_token: "token".to_string(),
    }
}

/// NC request carrying the orchestrator context of `pod`
pub fn nc_request_for_pod(nc_id: &str, version: &str, pod: &PodInfo) -> CreateNetworkContainerRequest {
    CreateNetworkContainerRequest {
        orchestrator_context: Some(pod.to_orchestrator_context()),
        ..nc_request(nc_id, version, &[])
    }
}

pub fn pod_context(pod_name: &str, pod_namespace: &str) -> serde_json::Value {
    PodInfo::new(pod_name, pod_namespace).to_orchestrator_context()
}

/// Control plane serving a fixed goal state
#[derive(Clone, Default)]
pub struct MockControlPlaneClient {
    goal_state: Arc<Mutex<NodeGoalState>>,
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockControlPlaneClient {
    pub fn set_network_containers(&self, network_containers: Vec<CreateNetworkContainerRequest>) {
        self.goal_state.lock().unwrap().network_containers = network_containers;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ControlPlaneClientTrait for MockControlPlaneClient {
    async fn get_node_goal_state(&self, network_id: &str, node_id: &str) -> Result<NodeGoalState, DncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DncError::UnexpectedStatus {
                status: 503,
                body: format!("mock failure for {network_id}/{node_id}"),
            });
        }
        Ok(self.goal_state.lock().unwrap().clone())
    }
}

/// Network plugin call as `(command, container_id, pod_name)`
pub type PluginCall = (&'static str, String, String);

/// Network plugin that records calls instead of running a binary
#[derive(Clone, Default)]
pub struct MockNetPlugin {
    calls: Arc<Mutex<Vec<PluginCall>>>,
    fail: Arc<AtomicBool>,
}

impl MockNetPlugin {
    pub fn calls(&self) -> Vec<PluginCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, command: &'static str, pod: &PodInfo, container_id: &str) -> Result<(), NetPluginError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NetPluginError::Failed {
                command,
                container_id: container_id.to_string(),
                code: Some(1),
                output: "mock failure".to_string(),
            });
        }
        self.calls
            .lock()
            .unwrap()
            .push((command, container_id.to_string(), pod.pod_name.clone()));
        Ok(())
    }
}

#[async_trait::async_trait]
impl NetPluginTrait for MockNetPlugin {
    async fn attach(&self, pod: &PodInfo, container_id: &str) -> Result<(), NetPluginError> {
        self.record("ADD", pod, container_id)
    }

    async fn detach(&self, pod: &PodInfo, container_id: &str) -> Result<(), NetPluginError> {
        self.record("DEL", pod, container_id)
    }
}

/// Orchestrator wired to in-memory collaborators, with handles to each
pub struct Harness {
    pub orchestrator: Arc<GoalStateOrchestrator>,
    pub config: ServiceConfig,
    pub store: Arc<MemoryStore>,
    pub endpoint_store: Option<Arc<MemoryStore>>,
    pub nmagent: MockNmAgentClient,
    pub iptables: MockIptablesClient,
    pub control_plane: MockControlPlaneClient,
    pub net_plugin: MockNetPlugin,
    pub hook: Arc<RecordingHook>,
}

pub fn test_config(orchestrator_type: OrchestratorType) -> ServiceConfig {
    ServiceConfig {
        nmagent_timeout: Duration::from_millis(200),
        orchestrator_type: Some(orchestrator_type),
        max_pods: 8,
        host_primary_ip: Some(HOST_PRIMARY_IP.to_string()),
        ..Default::default()
    }
}

impl Harness {
    /// Direct-mode orchestrator
    pub fn new(orchestrator_type: OrchestratorType) -> Self {
        Self::build(test_config(orchestrator_type), false)
    }

    /// Managed-mode orchestrator pulling from the mock control plane
    pub fn managed(orchestrator_type: OrchestratorType) -> Self {
        let config = ServiceConfig {
            channel_mode: ChannelMode::Managed,
            managed: Some(ManagedSettings {
                dnc_endpoint: "http://dnc.test".to_string(),
                dnc_timeout: Duration::from_millis(200),
                infra_network_id: INFRA_NETWORK_ID.to_string(),
                node_id: NODE_ID.to_string(),
            }),
            ..test_config(orchestrator_type)
        };
        Self::build(config, false)
    }

    /// Direct-mode orchestrator that also manages endpoint state
    pub fn with_endpoint_state(orchestrator_type: OrchestratorType) -> Self {
        let config = ServiceConfig {
            manage_endpoint_state: true,
            ..test_config(orchestrator_type)
        };
        Self::build(config, true)
    }

    fn build(config: ServiceConfig, manage_endpoint_state: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let endpoint_store = manage_endpoint_state.then(|| Arc::new(MemoryStore::new()));
        let nmagent = MockNmAgentClient::new();
        let iptables = MockIptablesClient::new();
        let control_plane = MockControlPlaneClient::default();
        let net_plugin = MockNetPlugin::default();
        let hook = Arc::new(RecordingHook::default());

        let deps = Collaborators {
            store: store.clone(),
            endpoint_store: endpoint_store.clone().map(|s| s as Arc<dyn KeyValueStore>),
            nmagent: Arc::new(nmagent.clone()),
            iptables: Arc::new(iptables.clone()),
            control_plane: Some(Arc::new(control_plane.clone())),
            net_plugin: Arc::new(net_plugin.clone()),
            hook: hook.clone(),
        };
        let orchestrator = Arc::new(GoalStateOrchestrator::new(&config, deps).unwrap());

        Self {
            orchestrator,
            config,
            store,
            endpoint_store,
            nmagent,
            iptables,
            control_plane,
            net_plugin,
            hook,
        }
    }

    /// A fresh orchestrator over the same store and mocks, as after a
    /// restart with `config`.
    pub fn orchestrator_with(&self, config: &ServiceConfig) -> GoalStateOrchestrator {
        let deps = Collaborators {
            store: self.store.clone(),
            endpoint_store: self
                .endpoint_store
                .clone()
                .map(|s| s as Arc<dyn KeyValueStore>),
            nmagent: Arc::new(self.nmagent.clone()),
            iptables: Arc::new(self.iptables.clone()),
            control_plane: Some(Arc::new(self.control_plane.clone())),
            net_plugin: Arc::new(self.net_plugin.clone()),
            hook: self.hook.clone(),
        };
        GoalStateOrchestrator::new(config, deps).unwrap()
    }

    /// Save `req`, have NMAgent report its version and run the host sync so
    /// its IPs become `Available`.
    pub async fn save_programmed(&self, req: &CreateNetworkContainerRequest) {
        let response = self.orchestrator.create_or_update_network_container(req).await;
        assert!(response.is_success(), "save failed: {response:?}");
        self.nmagent.set_version(&req.network_container_id, &req.version);
        self.orchestrator.sync_host_nc_version().await.unwrap();
    }

    pub async fn ip_state(&self, id: &str) -> Option<IPState> {
        self.orchestrator
            .debug_snapshot()
            .await
            .ip_configs
            .get(id)
            .map(|s| s.state)
    }
}
