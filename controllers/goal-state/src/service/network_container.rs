//! Network container goal-state operations

use super::state::{ContainerStatus, HOST_VERSION_UNKNOWN, ServiceState};
use super::GoalStateOrchestrator;
use crate::error::ServiceError;
use crate::reconciler::{self, ProgrammedVersions, ProgrammingStatus};
use cns_types::{
    ConfigureContainerNetworkingRequest, CreateNetworkContainerRequest, GetAllNetworkContainersResponse,
    GetNetworkContainerRequest, GetNetworkContainerResponse, NetworkContainerType, OrchestratorType, PodInfo,
    PodInfoError, Response, ResponseCode, SWIFT_PREFIX,
};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Emit the non-sensitive fields of an NC request on the `nc_snapshot`
/// target. The token must already be stripped.
pub fn log_nc_snapshot(req: &CreateNetworkContainerRequest) {
    info!(
        target: "nc_snapshot",
        nc_id = %req.network_container_id,
        network_container_type = %req.network_container_type,
        version = %req.version,
        ip_configuration = ?req.ip_configuration,
        local_ip_configuration = ?req.local_ip_configuration,
        primary_interface_identifier = %req.primary_interface_identifier,
        allow_host_to_nc_communication = req.allow_host_to_nc_communication,
        allow_nc_to_host_communication = req.allow_nc_to_host_communication,
        orchestrator_context = ?req.orchestrator_context,
        secondary_ip_count = req.secondary_ip_configs.len(),
        "NC snapshot"
    );
}

/// Decode the pod identity of an orchestrator context.
pub(super) fn pod_info_from_context(context: Option<&serde_json::Value>) -> Result<PodInfo, ServiceError> {
    PodInfo::from_orchestrator_context(context).map_err(|e| match e {
        PodInfoError::Missing => ServiceError::EmptyOrchestratorContext(e.to_string()),
        PodInfoError::Malformed(_) | PodInfoError::EmptyName => {
            ServiceError::UnsupportedOrchestratorContext(e.to_string())
        }
    })
}

fn parse_version(nc_id: &str, version: &str) -> Result<i64, ServiceError> {
    version.parse().map_err(|_| {
        ServiceError::UnsupportedNCVersion(format!(
            "network container {nc_id} has invalid version {version:?}"
        ))
    })
}

/// Reject an update that would move `nc_id` to an older version or, when
/// `check_ips` is set, one whose secondary IP changes the pool cannot take.
fn check_goal_state_update(
    state: &ServiceState,
    req: &CreateNetworkContainerRequest,
    target_version: i64,
    check_ips: bool,
) -> Result<(), ServiceError> {
    let nc_id = req.network_container_id.as_str();
    let no_configs = BTreeMap::new();
    let previous = match state.container_status.get(nc_id) {
        Some(existing) => {
            if let Ok(existing_version) = existing.vm_version.parse::<i64>() {
                if target_version < existing_version {
                    return Err(ServiceError::UnsupportedNCVersion(format!(
                        "network container {nc_id} version {target_version} is older than stored version {existing_version}"
                    )));
                }
            }
            &existing.create_network_container_request.secondary_ip_configs
        }
        None => &no_configs,
    };
    if check_ips {
        state
            .pod_ip_config_state
            .validate_secondary_ips(nc_id, &req.secondary_ip_configs, previous, false)?;
    }
    Ok(())
}

fn error_response(err: ServiceError) -> GetNetworkContainerResponse {
    GetNetworkContainerResponse {
        response: err.into(),
        ..Default::default()
    }
}

/// Host-resident container operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOperation {
    Attach,
    Detach,
}

impl std::fmt::Display for ContainerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerOperation::Attach => f.write_str("attach"),
            ContainerOperation::Detach => f.write_str("detach"),
        }
    }
}

impl GoalStateOrchestrator {
    /// Save the goal state of one network container.
    pub async fn create_or_update_network_container(&self, req: &CreateNetworkContainerRequest) -> Response {
        match self.save_network_container_goal_state(req).await {
            Ok(()) => Response::success(),
            Err(e) => {
                error!(nc_id = %req.network_container_id, "Failed to save NC goal state: {}", e);
                e.into()
            }
        }
    }

    /// Save several network containers in order, stopping at the first
    /// failure.
    pub async fn create_network_containers(&self, reqs: &[CreateNetworkContainerRequest]) -> Response {
        for req in reqs {
            let response = self.create_or_update_network_container(req).await;
            if !response.is_success() {
                return response;
            }
        }
        Response::success()
    }

    async fn save_network_container_goal_state(&self, req: &CreateNetworkContainerRequest) -> Result<(), ServiceError> {
        req.validate().map_err(ServiceError::InvalidRequest)?;
        let nc_id = req.network_container_id.as_str();
        let target_version = parse_version(nc_id, &req.version)?;

        if req.network_container_type == NetworkContainerType::Unsupported {
            return Err(ServiceError::UnsupportedNetworkContainerType(format!(
                "unsupported network container type of NC {nc_id}"
            )));
        }

        let orchestrator_type = self.orchestrator_type().await;
        let context_key = if orchestrator_type.tracks_context() {
            Some(pod_info_from_context(req.orchestrator_context.as_ref())?.orchestrator_context_key())
        } else if orchestrator_type == OrchestratorType::KubernetesCRD {
            None
        } else {
            return Err(ServiceError::UnsupportedOrchestratorType(format!(
                "unsupported orchestrator type {orchestrator_type}"
            )));
        };

        // A rejected update must leave the dataplane alone, so the checks run
        // before SNAT and are repeated once the write lock is held.
        if context_key.is_none() {
            check_goal_state_update(&*self.state.read().await, req, target_version, true)?;
            self.program_snat(req).await?;
        }

        let mut stripped = req.without_token();
        let mut state = self.state.write().await;
        check_goal_state_update(&state, req, target_version, false)?;

        let (host_version, previous, vfp_update_complete) = match state.container_status.get(nc_id) {
            Some(existing) => (
                existing.host_version,
                existing.create_network_container_request.secondary_ip_configs.clone(),
                existing.vfp_update_complete && existing.vm_version == req.version,
            ),
            None => (HOST_VERSION_UNKNOWN, BTreeMap::new(), false),
        };

        match context_key {
            Some(key) => {
                state
                    .container_id_by_orchestrator_context
                    .entry(key.clone())
                    .or_default()
                    .add(nc_id);
                debug!(context = %key, nc_id = %nc_id, "Tracked NC under orchestrator context");
            }
            None => {
                state.pod_ip_config_state.reconcile_secondary_ips(
                    nc_id,
                    &mut stripped.secondary_ip_configs,
                    &previous,
                    host_version,
                    false,
                    self.hook.as_ref(),
                )?;
            }
        }

        state.container_status.insert(
            nc_id.to_string(),
            ContainerStatus {
                id: nc_id.to_string(),
                vm_version: stripped.version.clone(),
                host_version,
                create_network_container_request: stripped.clone(),
                vfp_update_complete,
            },
        );
        self.persist(&mut state).await?;
        drop(state);

        info!(nc_id = %nc_id, version = %req.version, host_version, "Saved NC goal state");
        log_nc_snapshot(&stripped);
        Ok(())
    }

    async fn program_snat(&self, req: &CreateNetworkContainerRequest) -> Result<(), ServiceError> {
        if req.secondary_ip_configs.is_empty() {
            return Ok(());
        }
        let host_primary_ip = if req.host_primary_ip.is_empty() {
            self.host_ip_info.primary_ip.as_str()
        } else {
            req.host_primary_ip.as_str()
        };
        if host_primary_ip.is_empty() {
            debug!(nc_id = %req.network_container_id, "No host primary IP, skipping SWIFT SNAT rules");
            return Ok(());
        }

        let subnet = &req.ip_configuration.ip_subnet;
        let secondary_ips: Vec<&str> = req
            .secondary_ip_configs
            .values()
            .map(|c| c.ip_address.as_str())
            .collect();
        self.snat
            .ensure_pod_subnet_snat(&subnet.ip_address, subnet.prefix_length, host_primary_ip, &secondary_ips)
            .await
    }

    /// Remove a network container with its IPs and context associations.
    ///
    /// Deleting an unknown NC succeeds. An NC with an assigned IP is left
    /// untouched.
    pub async fn delete_network_container(&self, nc_id: &str) -> Response {
        match self.remove_network_container(nc_id).await {
            Ok(()) => Response::success(),
            Err(e) => {
                error!(nc_id = %nc_id, "Failed to delete NC: {}", e);
                e.into()
            }
        }
    }

    async fn remove_network_container(&self, nc_id: &str) -> Result<(), ServiceError> {
        if nc_id.is_empty() {
            return Err(ServiceError::NetworkContainerNotSpecified(
                "network container id is empty".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if !state.container_status.contains_key(nc_id) {
            info!(nc_id = %nc_id, "NC not found, nothing to delete");
            return Ok(());
        }

        let removed_ips = state.pod_ip_config_state.remove_nc(nc_id, self.hook.as_ref())?;
        state.container_id_by_orchestrator_context.retain(|_, ncs| {
            ncs.delete(nc_id);
            !ncs.is_empty()
        });
        state.container_status.remove(nc_id);
        self.persist(&mut state).await?;

        info!(nc_id = %nc_id, removed_ips, "Deleted NC");
        Ok(())
    }

    /// Every stored network container.
    pub async fn get_all_network_containers(&self) -> GetAllNetworkContainersResponse {
        let state = self.state.read().await;
        GetAllNetworkContainersResponse {
            network_containers: state
                .container_status
                .values()
                .map(|s| GetNetworkContainerResponse::from(&s.create_network_container_request))
                .collect(),
            response: Response::success(),
        }
    }

    /// Network containers of one orchestrator context, with their
    /// programming status.
    ///
    /// A failure that concerns the whole request is answered with a single
    /// element carrying only the response.
    pub async fn get_network_containers(&self, req: &GetNetworkContainerRequest) -> Vec<GetNetworkContainerResponse> {
        let orchestrator_type = self.orchestrator_type().await;
        if !orchestrator_type.tracks_context() {
            return vec![error_response(ServiceError::UnsupportedOrchestratorType(format!(
                "unsupported orchestrator type {orchestrator_type}"
            )))];
        }

        let context_key = match pod_info_from_context(req.orchestrator_context.as_ref()) {
            Ok(pod) => pod.orchestrator_context_key(),
            Err(e) => return vec![error_response(e)],
        };

        let mut nc_ids = self.state.read().await.ncs_for_context(&context_key);
        if nc_ids.is_empty() && self.is_managed() {
            info!(context = %context_key, "No local NC for context, pulling goal state from control plane");
            let response = self.sync_node_status(req.orchestrator_context.as_ref()).await;
            if !response.is_success() {
                return vec![GetNetworkContainerResponse {
                    response,
                    ..Default::default()
                }];
            }
            nc_ids = self.state.read().await.ncs_for_context(&context_key);
        }
        if nc_ids.is_empty() {
            return vec![error_response(ServiceError::UnknownContainerID(format!(
                "failed to find network container for orchestrator context {context_key}"
            )))];
        }

        let programmed = reconciler::fetch_programmed_versions(self.nmagent.as_ref(), self.nmagent_timeout).await;
        if let Err(e) = &programmed {
            warn!("Failed to get NC version list from NMAgent, skipping programming check: {}", e);
        }

        let mut state = self.state.write().await;
        let mut responses = Vec::with_capacity(nc_ids.len());
        let mut completed = Vec::new();
        for nc_id in &nc_ids {
            let Some(status) = state.container_status.get_mut(nc_id) else {
                responses.push(error_response(ServiceError::UnknownContainerID(format!(
                    "network container {nc_id} does not exist"
                ))));
                continue;
            };

            let programming = match &programmed {
                Ok(versions) => {
                    reconciler::is_nc_waiting_for_update(nc_id, &status.vm_version, status.completed_version(), versions)
                }
                Err(_) if status.completed_version().is_some() => {
                    ProgrammingStatus::Complete("Vfp programming complete".to_string())
                }
                Err(e) => ProgrammingStatus::CheckSkipped(format!(
                    "NC version list unavailable: {e}"
                )),
            };

            if programming.is_complete() && !status.vfp_update_complete {
                info!(nc_id = %nc_id, version = %status.vm_version, "Setting VfpUpdateComplete");
                status.vfp_update_complete = true;
                completed.push(nc_id.clone());
            }

            let mut response = GetNetworkContainerResponse::from(&status.create_network_container_request);
            if !programming.is_complete() {
                response.response = Response::new(programming.response_code(), programming.message());
            }
            responses.push(response);
        }

        if !completed.is_empty() && self.persist(&mut state).await.is_err() {
            // Cleared so the next query writes again.
            for nc_id in &completed {
                if let Some(status) = state.container_status.get_mut(nc_id) {
                    status.vfp_update_complete = false;
                }
            }
            warn!(ncs = ?completed, "VfpUpdateComplete not persisted, will retry on next query");
        }
        responses
    }

    /// Record that `nc_id` was confirmed programmed at `version`.
    async fn mark_programming_complete(&self, state: &mut ServiceState, nc_id: &str, version: &str) {
        match state.container_status.get_mut(nc_id) {
            Some(status) if status.vm_version == version && !status.vfp_update_complete => {
                status.vfp_update_complete = true;
            }
            _ => return,
        }
        if self.persist(state).await.is_err() {
            if let Some(status) = state.container_status.get_mut(nc_id) {
                status.vfp_update_complete = false;
            }
            warn!(nc_id = %nc_id, "VfpUpdateComplete not persisted, will retry on next attach");
        }
    }

    /// Attach a host-resident container to its NC through the network plugin.
    pub async fn attach_container_to_network(&self, req: &ConfigureContainerNetworkingRequest) -> Response {
        self.attach_or_detach(req, ContainerOperation::Attach).await
    }

    /// Detach a host-resident container from its NC through the network plugin.
    pub async fn detach_container_from_network(&self, req: &ConfigureContainerNetworkingRequest) -> Response {
        self.attach_or_detach(req, ContainerOperation::Detach).await
    }

    async fn attach_or_detach(&self, req: &ConfigureContainerNetworkingRequest, operation: ContainerOperation) -> Response {
        match self.configure_container_networking(req, operation).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    container_id = %req.container_id, nc_id = %req.network_container_id,
                    "Failed to {} container: {}", operation, e
                );
                e.into()
            }
        }
    }

    async fn configure_container_networking(
        &self,
        req: &ConfigureContainerNetworkingRequest,
        operation: ContainerOperation,
    ) -> Result<Response, ServiceError> {
        if req.container_id.is_empty() {
            return Err(ServiceError::DockerContainerNotSpecified(
                "container id is empty".to_string(),
            ));
        }
        if req.network_container_id.is_empty() {
            return Err(ServiceError::NetworkContainerNotSpecified(
                "network container id is empty".to_string(),
            ));
        }

        let nc_id = format!("{}{}", SWIFT_PREFIX, req.network_container_id);
        let mut existing = self.state.read().await.container_status.get(&nc_id).cloned();

        if self.is_managed() && operation == ContainerOperation::Attach {
            if let Some(status) = existing.as_ref().filter(|s| !s.vfp_update_complete) {
                let versions: ProgrammedVersions =
                    reconciler::fetch_programmed_versions(self.nmagent.as_ref(), self.nmagent_timeout).await?;
                match reconciler::is_nc_waiting_for_update(&nc_id, &status.vm_version, None, &versions) {
                    ProgrammingStatus::Pending(message) => {
                        return Ok(Response::new(ResponseCode::NetworkContainerVfpProgramPending, message));
                    }
                    ProgrammingStatus::CheckSkipped(message) => {
                        warn!(nc_id = %nc_id, "Proceeding with attach: {}", message);
                    }
                    ProgrammingStatus::Complete(_) => {
                        let mut state = self.state.write().await;
                        self.mark_programming_complete(&mut state, &nc_id, &status.vm_version).await;
                    }
                }
            }

            if existing.is_none() {
                let response = self.sync_node_status(None).await;
                if !response.is_success() {
                    return Ok(response);
                }
                existing = self.state.read().await.container_status.get(&nc_id).cloned();
            }
        }

        let Some(existing) = existing else {
            return Err(ServiceError::NotFound(format!(
                "network container {} does not exist",
                req.network_container_id
            )));
        };

        let orchestrator_type = self.orchestrator_type().await;
        if orchestrator_type != OrchestratorType::Batch {
            return Err(ServiceError::UnsupportedOrchestratorType(format!(
                "invalid orchestrator type {orchestrator_type}"
            )));
        }

        let pod = PodInfo::from_orchestrator_context(
            existing.create_network_container_request.orchestrator_context.as_ref(),
        )
        .map_err(|e| ServiceError::Unexpected(format!("unmarshalling orchestrator context failed: {e}")))?;

        match operation {
            ContainerOperation::Attach => self.net_plugin.attach(&pod, &req.container_id).await?,
            ContainerOperation::Detach => self.net_plugin.detach(&pod, &req.container_id).await?,
        }
        info!(
            container_id = %req.container_id, nc_id = %nc_id,
            "Container {} complete", operation
        );
        Ok(Response::success())
    }

    /// Pull the node's goal state from the control plane and save every NC
    /// in it.
    ///
    /// With an orchestrator context, answers `NotFound` when the pulled goal
    /// state holds no NC for it.
    pub async fn sync_node_status(&self, orchestrator_context: Option<&serde_json::Value>) -> Response {
        match self.pull_node_goal_state(orchestrator_context).await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to sync node status: {}", e);
                e.into()
            }
        }
    }

    async fn pull_node_goal_state(&self, orchestrator_context: Option<&serde_json::Value>) -> Result<Response, ServiceError> {
        let Some(managed) = &self.managed else {
            return Err(ServiceError::Unexpected(
                "node status sync requires managed mode".to_string(),
            ));
        };
        let settings = &managed.settings;

        self.ensure_network_joined(&settings.infra_network_id).await?;
        let goal_state = managed
            .client
            .get_node_goal_state(&settings.infra_network_id, &settings.node_id)
            .await?;
        info!(
            ncs = goal_state.network_containers.len(),
            node_id = %settings.node_id,
            "Pulled node goal state"
        );

        let mut first_failure = None;
        for nc in &goal_state.network_containers {
            let response = self.create_or_update_network_container(nc).await;
            if !response.is_success() && first_failure.is_none() {
                first_failure = Some(response);
            }
        }
        if let Some(failure) = first_failure {
            return Ok(failure);
        }

        if let Some(context) = orchestrator_context {
            let key = pod_info_from_context(Some(context))?.orchestrator_context_key();
            if self.state.read().await.ncs_for_context(&key).is_empty() {
                return Err(ServiceError::NotFound(format!(
                    "control plane holds no network container for orchestrator context {key}"
                )));
            }
        }
        Ok(Response::success())
    }
}

#[cfg(test)]
#[path = "network_container_test.rs"]
mod network_container_test;
