//! Mock NmAgentClient for unit testing
//!
//! Keeps the programmed version list in memory and can be told to fail or to
//! stall, so callers can exercise their degrade paths.

use crate::error::NmAgentError;
use crate::models::{NcVersion, NcVersionList};
use crate::nmagent_trait::NmAgentClientTrait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock NmAgentClient for testing
#[derive(Clone, Default)]
pub struct MockNmAgentClient {
    containers: Arc<Mutex<Vec<NcVersion>>>,
    fail: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<AtomicUsize>,
    joined: Arc<Mutex<Vec<String>>>,
}

impl MockNmAgentClient {
    /// Create a new mock client with an empty version list
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the programmed version for a network container (for test setup)
    pub fn set_version(&self, network_container_id: &str, version: &str) {
        let mut containers = self.containers.lock().unwrap();
        match containers
            .iter_mut()
            .find(|nc| nc.network_container_id == network_container_id)
        {
            Some(nc) => nc.version = version.to_string(),
            None => containers.push(NcVersion::new(network_container_id, version)),
        }
    }

    /// Make every following call fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every following call sleep before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Networks joined through this client, in call order
    pub fn joined_networks(&self) -> Vec<String> {
        self.joined.lock().unwrap().clone()
    }

    /// Number of version list calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl NmAgentClientTrait for MockNmAgentClient {
    async fn get_nc_version_list(&self) -> Result<NcVersionList, NmAgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(NmAgentError::UnexpectedStatus {
                status: 500,
                body: "mock failure".to_string(),
            });
        }

        Ok(NcVersionList {
            containers: self.containers.lock().unwrap().clone(),
        })
    }

    async fn join_network(&self, network_id: &str) -> Result<(), NmAgentError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NmAgentError::UnexpectedStatus {
                status: 500,
                body: "mock failure".to_string(),
            });
        }
        self.joined.lock().unwrap().push(network_id.to_string());
        Ok(())
    }
}
