//! Control plane (DNC) goal-state puller
//!
//! In managed mode the node does not wait for goal state to be pushed; it
//! pulls the full set of network containers for its node from the control
//! plane and saves each one as if it had been posted.

use async_trait::async_trait;
use cns_types::CreateNetworkContainerRequest;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when pulling goal state from the control plane
#[derive(Debug, Error)]
pub enum DncError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Control plane answered with a non-success status
    #[error("control plane returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Goal state of one node as held by the control plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGoalState {
    #[serde(default)]
    pub network_containers: Vec<CreateNetworkContainerRequest>,
}

/// Control plane operations the orchestrator depends on
#[async_trait]
pub trait ControlPlaneClientTrait: Send + Sync {
    /// Fetch every network container the control plane holds for `node_id`
    /// on the infrastructure network `network_id`.
    async fn get_node_goal_state(&self, network_id: &str, node_id: &str) -> Result<NodeGoalState, DncError>;
}

fn node_goal_state_path(network_id: &str, node_id: &str) -> String {
    format!("/networks/{network_id}/node/{node_id}")
}

/// Control plane HTTP client
pub struct DncClient {
    client: Client,
    endpoint: String,
}

impl DncClient {
    /// Create a new control plane client
    ///
    /// # Arguments
    /// * `endpoint` - Control plane base URL
    /// * `timeout` - Upper bound for a single call
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, DncError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL of the control plane
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for DncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DncClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ControlPlaneClientTrait for DncClient {
    async fn get_node_goal_state(&self, network_id: &str, node_id: &str) -> Result<NodeGoalState, DncError> {
        let url = format!("{}{}", self.endpoint, node_goal_state_path(network_id, node_id));
        debug!("Pulling node goal state from {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DncError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let goal_state: NodeGoalState = serde_json::from_str(&body)?;
        debug!(
            "Control plane holds {} network containers for node {}",
            goal_state.network_containers.len(),
            node_id
        );
        Ok(goal_state)
    }
}
