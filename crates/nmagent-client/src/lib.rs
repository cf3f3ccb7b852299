//! NMAgent client
//!
//! Client for the node's dataplane-programming authority. The only call the
//! goal-state service depends on is the programmed network container version
//! list, which tells it how far dataplane (VFP) programming has progressed for
//! each network container on the node.
//!
//! # Example
//!
//! ```no_run
//! use nmagent_client::{NmAgentClient, NmAgentClientTrait};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NmAgentClient::new("http://168.63.129.16".to_string(), Duration::from_secs(2))?;
//! let list = client.get_nc_version_list().await?;
//! for nc in &list.containers {
//!     println!("{} programmed at {}", nc.network_container_id, nc.version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod nmagent_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::NmAgentClient;
pub use error::NmAgentError;
pub use models::*;
pub use nmagent_trait::NmAgentClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockNmAgentClient;
