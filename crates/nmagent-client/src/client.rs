//! NMAgent HTTP client

use crate::error::NmAgentError;
use crate::models::NcVersionList;
use crate::nmagent_trait::NmAgentClientTrait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const NC_VERSION_LIST_PATH: &str =
    "/machine/plugins/?comp=nmagent&type=NetworkManagement/interfaces/api-version/2";

fn join_network_path(network_id: &str) -> String {
    format!(
        "/machine/plugins/?comp=nmagent&type=NetworkManagement/joinedVirtualNetworks/{network_id}/api-version/1"
    )
}

/// NMAgent API client
pub struct NmAgentClient {
    client: Client,
    base_url: String,
}

impl NmAgentClient {
    /// Create a new NMAgent client
    ///
    /// # Arguments
    /// * `base_url` - NMAgent base URL (e.g., "http://168.63.129.16")
    /// * `timeout` - Upper bound for a single call
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, NmAgentError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl NmAgentClientTrait for NmAgentClient {
    async fn get_nc_version_list(&self) -> Result<NcVersionList, NmAgentError> {
        let url = format!("{}{}", self.base_url, NC_VERSION_LIST_PATH);
        debug!("Fetching NC version list from {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NmAgentError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let list: NcVersionList = serde_json::from_str(&body)?;
        debug!("NMAgent reports {} network containers", list.containers.len());
        Ok(list)
    }

    async fn join_network(&self, network_id: &str) -> Result<(), NmAgentError> {
        let url = format!("{}{}", self.base_url, join_network_path(network_id));
        debug!("Joining network {} via {}", network_id, url);

        let response = self.client.post(&url).body("").send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NmAgentError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for NmAgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NmAgentClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
