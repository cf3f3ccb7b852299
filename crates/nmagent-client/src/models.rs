//! NMAgent wire models

use serde::{Deserialize, Serialize};

/// Version NMAgent has programmed for one network container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NcVersion {
    /// Identifier as NMAgent reports it; may carry a scenario prefix and
    /// mixed case.
    pub network_container_id: String,
    /// Declared as a string by contract; integers in practice.
    pub version: String,
}

impl NcVersion {
    /// Version report for one NC
    pub fn new(network_container_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            network_container_id: network_container_id.into(),
            version: version.into(),
        }
    }
}

/// Programmed versions of every network container NMAgent knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcVersionList {
    #[serde(rename = "networkContainers", default)]
    pub containers: Vec<NcVersion>,
}
