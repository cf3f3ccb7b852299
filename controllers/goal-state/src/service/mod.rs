//! Goal-state orchestrator
//!
//! Facade over the node's network container goal state. Public operations
//! take a request and answer with a response code and message; data-level
//! failures never escape as panics or process errors.
//!
//! Locking: the service state sits behind one `RwLock`. Mutating operations
//! hold the write guard across the persistence write so the stored document
//! always matches memory at release. NMAgent, control plane and iptables calls
//! happen outside the main lock. Networks-joined tracking and the SNAT chain
//! use their own named lock domains.

mod endpoint;
mod ipam;
mod network_container;
mod state;
mod sync;

pub use network_container::log_nc_snapshot;
pub use state::{ContainerStatus, ENDPOINT_STATE_KEY, HOST_VERSION_UNKNOWN, NetworkInfo, STATE_KEY, ServiceState};

use crate::concurrency::{JOINED_NETWORKS, NamedLocks, TimedSet};
use crate::config::{ChannelMode, ManagedSettings, ServiceConfig};
use crate::dnc::ControlPlaneClientTrait;
use crate::error::{ControllerError, ServiceError};
use crate::metrics::StateTransitionHook;
use crate::nc_list::NcList;
use crate::net_plugin::NetPluginTrait;
use crate::snat::SnatProgrammer;
use crate::store::{self, KeyValueStore, StoreError};
use chrono::Utc;
use cns_types::{EndpointState, HostIPInfo, IPConfigurationStatus, OrchestratorType, Response};
use iptables_client::IptablesClientTrait;
use nmagent_client::NmAgentClientTrait;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// External collaborators of the orchestrator
pub struct Collaborators {
    pub store: Arc<dyn KeyValueStore>,
    /// Present iff endpoint state is managed
    pub endpoint_store: Option<Arc<dyn KeyValueStore>>,
    pub nmagent: Arc<dyn NmAgentClientTrait>,
    pub iptables: Arc<dyn IptablesClientTrait>,
    /// Required in managed mode
    pub control_plane: Option<Arc<dyn ControlPlaneClientTrait>>,
    pub net_plugin: Arc<dyn NetPluginTrait>,
    pub hook: Arc<dyn StateTransitionHook>,
}

/// Control plane client plus the coordinates of this node
struct ManagedChannel {
    client: Arc<dyn ControlPlaneClientTrait>,
    settings: ManagedSettings,
}

/// Read-only view of the allocation state for debugging
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub ip_configs: BTreeMap<String, IPConfigurationStatus>,
    pub pod_ip_index: BTreeMap<String, Vec<String>>,
    pub orchestrator_contexts: BTreeMap<String, NcList>,
    pub pending_assignments: usize,
}

/// Facade over NC goal state, pod IP allocation and dataplane programming
pub struct GoalStateOrchestrator {
    state: RwLock<ServiceState>,
    store: Arc<dyn KeyValueStore>,
    endpoint_state: RwLock<EndpointState>,
    endpoint_store: Option<Arc<dyn KeyValueStore>>,
    nmagent: Arc<dyn NmAgentClientTrait>,
    nmagent_timeout: Duration,
    snat: SnatProgrammer,
    managed: Option<ManagedChannel>,
    net_plugin: Arc<dyn NetPluginTrait>,
    hook: Arc<dyn StateTransitionHook>,
    locks: Arc<NamedLocks>,
    // Touched only under the JOINED_NETWORKS lock domain.
    joined_networks: Mutex<HashSet<String>>,
    pending_assignments: TimedSet,
    configured_orchestrator: Option<OrchestratorType>,
    host_ip_info: HostIPInfo,
}

impl std::fmt::Debug for GoalStateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoalStateOrchestrator")
            .field("managed", &self.managed.is_some())
            .field("nmagent_timeout", &self.nmagent_timeout)
            .field("host_ip_info", &self.host_ip_info)
            .finish_non_exhaustive()
    }
}

impl GoalStateOrchestrator {
    /// Wire the orchestrator. Managed mode requires a control-plane client.
    pub fn new(config: &ServiceConfig, deps: Collaborators) -> Result<Self, ControllerError> {
        let managed = match (config.channel_mode, config.managed.clone(), deps.control_plane) {
            (ChannelMode::Direct, _, _) => None,
            (ChannelMode::Managed, Some(settings), Some(client)) => Some(ManagedChannel { client, settings }),
            (ChannelMode::Managed, None, _) => {
                return Err(ControllerError::InvalidConfig(
                    "managed mode requires control plane settings".to_string(),
                ));
            }
            (ChannelMode::Managed, _, None) => {
                return Err(ControllerError::InvalidConfig(
                    "managed mode requires a control plane client".to_string(),
                ));
            }
        };

        let locks = Arc::new(NamedLocks::new());
        let state = ServiceState {
            orchestrator_type: config.orchestrator_type.unwrap_or_default(),
            ..Default::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            store: deps.store,
            endpoint_state: RwLock::new(EndpointState::new()),
            endpoint_store: deps.endpoint_store,
            nmagent: deps.nmagent,
            nmagent_timeout: config.nmagent_timeout,
            snat: SnatProgrammer::new(deps.iptables, Arc::clone(&locks)),
            managed,
            net_plugin: deps.net_plugin,
            hook: deps.hook,
            locks,
            joined_networks: Mutex::new(HashSet::new()),
            pending_assignments: TimedSet::new(config.max_pods),
            configured_orchestrator: config.orchestrator_type,
            host_ip_info: HostIPInfo {
                primary_ip: config.host_primary_ip.clone().unwrap_or_default(),
                ..Default::default()
            },
        })
    }

    /// Whether goal state is pulled from the control plane
    pub fn is_managed(&self) -> bool {
        self.managed.is_some()
    }

    /// Write the state document. Callers hold the write guard.
    async fn persist(&self, state: &mut ServiceState) -> Result<(), ServiceError> {
        state.time_stamp = Utc::now();
        store::write_as(self.store.as_ref(), STATE_KEY, state)
            .await
            .map_err(|e| {
                error!("Failed to save state: {}", e);
                ServiceError::from(e)
            })
    }

    /// Load persisted state. A missing document means a fresh node; an
    /// unreadable one is logged and the store removed so the node starts
    /// empty.
    pub async fn restore_state(&self) {
        match store::read_as::<ServiceState>(self.store.as_ref(), STATE_KEY).await {
            Ok(mut restored) => {
                if let Some(configured) = self.configured_orchestrator {
                    if restored.orchestrator_type != configured {
                        warn!(
                            "Persisted orchestrator type {} overridden by configured {}",
                            restored.orchestrator_type, configured
                        );
                        restored.orchestrator_type = configured;
                    }
                }
                for (id, status) in restored.pod_ip_config_state.iter() {
                    self.hook.on_transition(id, None, Some(status.state));
                }
                info!(
                    ncs = restored.container_status.len(),
                    ip_configs = restored.pod_ip_config_state.len(),
                    orchestrator_type = %restored.orchestrator_type,
                    "Restored state"
                );
                *self.state.write().await = restored;
            }
            Err(StoreError::KeyNotFound(_)) => info!("No state to restore"),
            Err(e) => {
                error!("Failed to restore state: {}. Removing store", e);
                if let Err(e) = self.store.remove().await {
                    error!("Failed to remove store: {}", e);
                }
            }
        }

        if let Some(endpoint_store) = &self.endpoint_store {
            match store::read_as::<EndpointState>(endpoint_store.as_ref(), ENDPOINT_STATE_KEY).await {
                Ok(restored) => {
                    info!(endpoints = restored.len(), "Restored endpoint state");
                    *self.endpoint_state.write().await = restored;
                }
                Err(StoreError::KeyNotFound(_)) => info!("No endpoint state to restore"),
                Err(e) => error!("Failed to restore endpoint state: {}", e),
            }
        }
    }

    /// Register the orchestrator owning this node.
    ///
    /// A node that already holds NCs for one node ID cannot be re-registered
    /// under another.
    pub async fn set_orchestrator_type(&self, orchestrator_type: OrchestratorType, node_id: &str) -> Response {
        if orchestrator_type == OrchestratorType::Unknown {
            return ServiceError::UnsupportedOrchestratorType(format!(
                "unsupported orchestrator type {orchestrator_type}"
            ))
            .into();
        }

        let mut state = self.state.write().await;
        if !state.node_id.is_empty() && state.node_id != node_id && state.are_ncs_present() {
            return ServiceError::InvalidRequest(format!(
                "node is already registered as {} and holds network containers",
                state.node_id
            ))
            .into();
        }

        info!(orchestrator_type = %orchestrator_type, node_id = %node_id, "Setting orchestrator type");
        state.orchestrator_type = orchestrator_type;
        state.node_id = node_id.to_string();
        match self.persist(&mut state).await {
            Ok(()) => Response::success(),
            Err(e) => e.into(),
        }
    }

    /// Orchestrator type currently in effect
    pub async fn orchestrator_type(&self) -> OrchestratorType {
        self.state.read().await.orchestrator_type
    }

    /// Current allocation state, for inspection only.
    pub async fn debug_snapshot(&self) -> DebugSnapshot {
        let state = self.state.read().await;
        DebugSnapshot {
            ip_configs: state.pod_ip_config_state.statuses().clone(),
            pod_ip_index: state.pod_ip_config_state.pod_index().clone(),
            orchestrator_contexts: state.container_id_by_orchestrator_context.clone(),
            pending_assignments: self.pending_assignments.len(),
        }
    }

    fn joined(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.joined_networks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `network_id` was joined on this node
    pub async fn is_network_joined(&self, network_id: &str) -> bool {
        let _guard = self.locks.acquire(JOINED_NETWORKS).await;
        self.joined().contains(network_id)
    }

    /// Record `network_id` as joined without calling NMAgent.
    pub async fn set_network_state_joined(&self, network_id: &str) {
        let _guard = self.locks.acquire(JOINED_NETWORKS).await;
        self.joined().insert(network_id.to_string());
    }

    /// Join `network_id` through NMAgent unless this process already did.
    ///
    /// The check, the join and the record happen under one hold of the lock
    /// domain so concurrent callers join once.
    pub async fn ensure_network_joined(&self, network_id: &str) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(JOINED_NETWORKS).await;
        if self.joined().contains(network_id) {
            return Ok(());
        }

        info!(network_id = %network_id, "Joining network");
        tokio::time::timeout(self.nmagent_timeout, self.nmagent.join_network(network_id))
            .await
            .map_err(|_| nmagent_client::NmAgentError::Timeout(self.nmagent_timeout))??;
        self.joined().insert(network_id.to_string());
        Ok(())
    }
}
