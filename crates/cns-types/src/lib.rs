//! Container Networking Service types
//!
//! Goal-state types shared between the node agent and its callers:
//! network container requests and responses, per-address allocation records,
//! orchestrator contexts, and the response code taxonomy.

pub mod endpoint;
pub mod ip_config;
pub mod ipam;
pub mod network_container;
pub mod pod_info;
pub mod response;

pub use endpoint::*;
pub use ip_config::*;
pub use ipam::*;
pub use network_container::*;
pub use pod_info::*;
pub use response::*;

/// Prefix the dataplane authority and the control plane put in front of
/// SWIFT network container identifiers.
pub const SWIFT_PREFIX: &str = "Swift_";
