//! Secondary IP configurations and their allocation records

use crate::pod_info::PodInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One allocatable address inside a network container's block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryIPConfig {
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    /// NC version at which this address was introduced.
    #[serde(rename = "NCVersion")]
    pub nc_version: i64,
}

impl SecondaryIPConfig {
    /// Secondary IP introduced at `nc_version`
    pub fn new(ip_address: impl Into<String>, nc_version: i64) -> Self {
        Self {
            ip_address: ip_address.into(),
            nc_version,
        }
    }
}

/// Allocation state of a secondary IP.
///
/// Serializes as PascalCase ("Available", "Assigned", ...) to stay compatible
/// with snapshots written by earlier agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IPState {
    Available,
    Assigned,
    PendingRelease,
    PendingProgramming,
}

impl IPState {
    /// Every state, in lifecycle order
    pub const ALL: [IPState; 4] = [
        IPState::Available,
        IPState::Assigned,
        IPState::PendingRelease,
        IPState::PendingProgramming,
    ];

    /// Wire name of the state
    pub fn as_str(self) -> &'static str {
        match self {
            IPState::Available => "Available",
            IPState::Assigned => "Assigned",
            IPState::PendingRelease => "PendingRelease",
            IPState::PendingProgramming => "PendingProgramming",
        }
    }
}

impl fmt::Display for IPState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocation record, one per secondary IP config ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IPConfigurationStatus {
    #[serde(rename = "NCID")]
    pub nc_id: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_info: Option<PodInfo>,
    pub state: IPState,
    pub last_state_transition: DateTime<Utc>,
}

impl IPConfigurationStatus {
    /// Newly tracked status with no pod
    pub fn new(
        nc_id: impl Into<String>,
        id: impl Into<String>,
        ip_address: impl Into<String>,
        state: IPState,
    ) -> Self {
        Self {
            nc_id: nc_id.into(),
            id: id.into(),
            ip_address: ip_address.into(),
            pod_info: None,
            state,
            last_state_transition: Utc::now(),
        }
    }
}
