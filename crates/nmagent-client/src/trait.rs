//! NmAgentClient trait for mocking
//!
//! The concrete NmAgentClient implements this trait, and tests can use mock implementations.

use crate::error::NmAgentError;
use crate::models::NcVersionList;

/// Trait for NMAgent operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Implementations must be cheap to call repeatedly.
#[async_trait::async_trait]
pub trait NmAgentClientTrait: Send + Sync {
    /// Programmed version of every network container on the node
    async fn get_nc_version_list(&self) -> Result<NcVersionList, NmAgentError>;

    /// Join this node to a virtual network.
    async fn join_network(&self, network_id: &str) -> Result<(), NmAgentError>;
}
