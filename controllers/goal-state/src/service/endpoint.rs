//! Host-resident endpoint state
//!
//! Container ID to pod and per-interface addresses. Kept only when endpoint
//! state is managed, in a store of its own.

use super::state::ENDPOINT_STATE_KEY;
use super::GoalStateOrchestrator;
use crate::error::ServiceError;
use crate::store;
use cns_types::{EndpointInfo, IPInfo, Response};
use tracing::info;

impl GoalStateOrchestrator {
    fn endpoint_store(&self) -> Result<&dyn store::KeyValueStore, ServiceError> {
        self.endpoint_store
            .as_deref()
            .ok_or_else(|| ServiceError::InvalidRequest("endpoint state is not managed".to_string()))
    }

    /// Endpoint record of a container.
    pub async fn get_endpoint(&self, container_id: &str) -> Result<EndpointInfo, ServiceError> {
        self.endpoint_store()?;
        self.endpoint_state
            .read()
            .await
            .get(container_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("endpoint {container_id} not found")))
    }

    /// Merge interface addresses into the endpoint of `container_id`,
    /// creating it for `pod_name`/`pod_namespace` when missing.
    pub async fn update_endpoint(
        &self,
        container_id: &str,
        pod_name: &str,
        pod_namespace: &str,
        interfaces: impl IntoIterator<Item = (String, IPInfo)>,
    ) -> Response {
        match self.merge_endpoint(container_id, pod_name, pod_namespace, interfaces).await {
            Ok(()) => Response::success(),
            Err(e) => e.into(),
        }
    }

    async fn merge_endpoint(
        &self,
        container_id: &str,
        pod_name: &str,
        pod_namespace: &str,
        interfaces: impl IntoIterator<Item = (String, IPInfo)>,
    ) -> Result<(), ServiceError> {
        if container_id.is_empty() {
            return Err(ServiceError::DockerContainerNotSpecified(
                "container id is empty".to_string(),
            ));
        }
        let endpoint_store = self.endpoint_store()?;

        let mut endpoints = self.endpoint_state.write().await;
        let endpoint = endpoints
            .entry(container_id.to_string())
            .or_insert_with(|| EndpointInfo {
                pod_name: pod_name.to_string(),
                pod_namespace: pod_namespace.to_string(),
                ..Default::default()
            });
        endpoint.ifname_to_ip_map.extend(interfaces);
        store::write_as(endpoint_store, ENDPOINT_STATE_KEY, &*endpoints).await?;

        info!(container_id = %container_id, "Updated endpoint state");
        Ok(())
    }

    /// Forget the endpoint record of a container.
    ///
    /// An unknown container is not an error.
    pub async fn delete_endpoint(&self, container_id: &str) -> Response {
        let result = async {
            let endpoint_store = self.endpoint_store()?;
            let mut endpoints = self.endpoint_state.write().await;
            if endpoints.remove(container_id).is_some() {
                store::write_as(endpoint_store, ENDPOINT_STATE_KEY, &*endpoints).await?;
                info!(container_id = %container_id, "Deleted endpoint state");
            }
            Ok::<(), ServiceError>(())
        }
        .await;

        match result {
            Ok(()) => Response::success(),
            Err(e) => e.into(),
        }
    }
}
