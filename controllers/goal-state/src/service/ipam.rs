//! Pod IP request, release and scale-down marking

use super::network_container::pod_info_from_context;
use super::state::ServiceState;
use super::GoalStateOrchestrator;
use crate::error::ServiceError;
use cns_types::{IPConfigsRequest, IPConfigsResponse, IPSubnet, OrchestratorType, PodInfo, PodIpInfo, Response};
use tracing::{debug, info, warn};

impl GoalStateOrchestrator {
    async fn validate_ip_configs_request(&self, req: &IPConfigsRequest) -> Result<PodInfo, ServiceError> {
        let orchestrator_type = self.orchestrator_type().await;
        if !matches!(
            orchestrator_type,
            OrchestratorType::Kubernetes | OrchestratorType::KubernetesCRD
        ) {
            return Err(ServiceError::UnsupportedOrchestratorType(format!(
                "IP config requests are supported only for Kubernetes, not {orchestrator_type}"
            )));
        }

        let pod = pod_info_from_context(req.orchestrator_context.as_ref())?;
        if req.pod_interface_id.is_empty() {
            Ok(pod)
        } else {
            Ok(pod.with_interface(req.infra_container_id.as_str(), req.pod_interface_id.as_str()))
        }
    }

    fn pod_ip_info(&self, state: &ServiceState, id: &str) -> Result<PodIpInfo, ServiceError> {
        let status = state
            .pod_ip_config_state
            .get(id)
            .ok_or_else(|| ServiceError::Unexpected(format!("IP config {id} vanished")))?;
        let nc = state.container_status.get(&status.nc_id).ok_or_else(|| {
            ServiceError::Unexpected(format!(
                "failed to get NC configuration for NC {}",
                status.nc_id
            ))
        })?;
        let primary = &nc.create_network_container_request.ip_configuration;

        Ok(PodIpInfo {
            pod_ip_config: IPSubnet::new(status.ip_address.as_str(), primary.ip_subnet.prefix_length),
            network_container_primary_ip_config: primary.clone(),
            host_primary_ip_info: self.host_ip_info.clone(),
        })
    }

    /// Hand IPs to a pod: the requested addresses, or one available IP from
    /// every NC that owns IPs. Idempotent for a pod that already holds IPs.
    pub async fn request_ip_configs(&self, req: &IPConfigsRequest) -> IPConfigsResponse {
        let pod = match self.validate_ip_configs_request(req).await {
            Ok(pod) => pod,
            Err(e) => return IPConfigsResponse::failure(e.into()),
        };
        let key = pod.interface_key();

        match self.assign_ip_configs(&pod, &req.desired_ip_addresses).await {
            Ok(pod_ip_info) => {
                if let Some(waited) = self.pending_assignments.pop(&key) {
                    info!(pod = %key, waited = ?waited, "Pod IP request satisfied after waiting");
                }
                IPConfigsResponse {
                    response: Response::success(),
                    pod_ip_info,
                }
            }
            Err(e) => {
                if matches!(e, ServiceError::FailedToAllocateIPConfig(_)) {
                    self.pending_assignments.push(&key);
                }
                warn!(pod = %key, "Failed to allocate IP config: {}", e);
                IPConfigsResponse::failure(e.into())
            }
        }
    }

    async fn assign_ip_configs(&self, pod: &PodInfo, desired: &[String]) -> Result<Vec<PodIpInfo>, ServiceError> {
        let key = pod.interface_key();
        let mut state = self.state.write().await;

        let held = state.pod_ip_config_state.ids_for_pod(&key).to_vec();
        if !held.is_empty() {
            debug!(pod = %key, ips = ?held, "Pod already holds IP configs");
            return held.iter().map(|id| self.pod_ip_info(&state, id)).collect();
        }

        let candidates: Vec<String> = if desired.is_empty() {
            let nc_ids: Vec<String> = state
                .pod_ip_config_state
                .nc_ids()
                .into_iter()
                .map(str::to_string)
                .collect();
            if nc_ids.is_empty() {
                return Err(ServiceError::FailedToAllocateIPConfig(
                    "no network container holds IP configs".to_string(),
                ));
            }
            let mut picked = Vec::with_capacity(nc_ids.len());
            for nc_id in &nc_ids {
                let id = state.pod_ip_config_state.find_available(nc_id).ok_or_else(|| {
                    ServiceError::FailedToAllocateIPConfig(format!(
                        "no available IP config in NC {nc_id}"
                    ))
                })?;
                picked.push(id.to_string());
            }
            picked
        } else {
            desired
                .iter()
                .map(|ip| {
                    state
                        .pod_ip_config_state
                        .find_by_address(ip)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            ServiceError::FailedToAllocateIPConfig(format!("desired IP {ip} is not tracked"))
                        })
                })
                .collect::<Result<_, _>>()?
        };

        let mut assigned: Vec<String> = Vec::with_capacity(candidates.len());
        for id in &candidates {
            let result = state
                .pod_ip_config_state
                .assign(id, pod, self.hook.as_ref())
                .map(|_| ());
            if let Err(e) = result {
                for done in &assigned {
                    let _ = state.pod_ip_config_state.release(done, self.hook.as_ref());
                }
                return Err(ServiceError::FailedToAllocateIPConfig(e.to_string()));
            }
            assigned.push(id.clone());
        }

        let infos = assigned
            .iter()
            .map(|id| self.pod_ip_info(&state, id))
            .collect::<Result<Vec<_>, _>>()?;
        self.persist(&mut state).await?;
        info!(pod = %key, ips = ?assigned, "Assigned IP configs");
        Ok(infos)
    }

    /// Return every IP held by a pod. Releasing a pod that holds nothing
    /// succeeds.
    pub async fn release_ip_configs(&self, req: &IPConfigsRequest) -> Response {
        let pod = match self.validate_ip_configs_request(req).await {
            Ok(pod) => pod,
            Err(e) => return e.into(),
        };
        let key = pod.interface_key();
        self.pending_assignments.pop(&key);

        match self.release_pod(&key).await {
            Ok(()) => Response::success(),
            Err(e) => {
                warn!(pod = %key, "Failed to release IP configs: {}", e);
                e.into()
            }
        }
    }

    async fn release_pod(&self, key: &str) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        let held = state.pod_ip_config_state.ids_for_pod(key).to_vec();
        if held.is_empty() {
            info!(pod = %key, "Pod holds no IP configs, nothing to release");
            return Ok(());
        }

        for id in &held {
            state.pod_ip_config_state.release(id, self.hook.as_ref())?;
        }
        self.persist(&mut state).await?;
        info!(pod = %key, ips = ?held, "Released IP configs");
        Ok(())
    }

    /// Mark an unassigned IP for removal on the next scale-down.
    pub async fn mark_ip_as_pending_release(&self, ip_config_id: &str) -> Response {
        let mut state = self.state.write().await;
        let result = match state
            .pod_ip_config_state
            .mark_pending_release(ip_config_id, self.hook.as_ref())
        {
            Ok(true) => self.persist(&mut state).await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Response::success(),
            Err(e) => {
                warn!(id = %ip_config_id, "Failed to mark IP as pending release: {}", e);
                e.into()
            }
        }
    }
}

#[cfg(test)]
#[path = "ipam_test.rs"]
mod ipam_test;
