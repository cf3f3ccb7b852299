//! Goal-state service library
//!
//! Node agent for network container (NC) goal state:
//! - Saves NC goal state pushed by the orchestrator or pulled from the control plane
//! - Tracks every secondary IP through its allocation state machine
//! - Reports per-NC dataplane programming status against NMAgent
//! - Programs the SWIFT SNAT chain for pod subnets

pub mod backoff;
pub mod concurrency;
pub mod config;
pub mod dnc;
pub mod error;
pub mod ipconfig;
pub mod metrics;
pub mod nc_list;
pub mod net_plugin;
pub mod reconciler;
pub mod service;
pub mod snat;
pub mod store;
#[cfg(test)]
mod test_utils;
