//! Network container version reconciliation
//!
//! Compares the target version recorded for an NC against the version the
//! node's dataplane-programming authority (NMAgent) reports as programmed.
//! The authority reports IDs with mixed case and sometimes without the SWIFT
//! prefix, so lookups go through `lookup_key`.

use cns_types::{ResponseCode, SWIFT_PREFIX};
use nmagent_client::{NcVersionList, NmAgentClientTrait, NmAgentError};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of comparing target and programmed versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgrammingStatus {
    /// Dataplane confirmed at or beyond the target version
    Complete(String),
    /// Dataplane has not caught up yet
    Pending(String),
    /// The authority's answer could not be evaluated
    CheckSkipped(String),
}

impl ProgrammingStatus {
    /// Whether the dataplane confirmed the target version
    pub fn is_complete(&self) -> bool {
        matches!(self, ProgrammingStatus::Complete(_))
    }

    /// Response code reported to the caller for this status
    pub fn response_code(&self) -> ResponseCode {
        match self {
            ProgrammingStatus::Complete(_) => ResponseCode::NetworkContainerVfpProgramComplete,
            ProgrammingStatus::Pending(_) => ResponseCode::NetworkContainerVfpProgramPending,
            ProgrammingStatus::CheckSkipped(_) => ResponseCode::NetworkContainerVfpProgramCheckSkipped,
        }
    }

    /// Human-readable detail of the status
    pub fn message(&self) -> &str {
        match self {
            ProgrammingStatus::Complete(m)
            | ProgrammingStatus::Pending(m)
            | ProgrammingStatus::CheckSkipped(m) => m,
        }
    }
}

/// Lowercase the part of an NC ID after the SWIFT prefix.
///
/// `Swift_ABCD-EF` becomes `Swift_abcd-ef`; IDs without the prefix are
/// lowercased whole.
pub fn normalize_nc_id(nc_id: &str) -> String {
    match nc_id.strip_prefix(SWIFT_PREFIX) {
        Some(guid) => format!("{}{}", SWIFT_PREFIX, guid.to_lowercase()),
        None => nc_id.to_lowercase(),
    }
}

/// Key an NC ID is looked up under in a `ProgrammedVersions` map.
pub fn lookup_key(nc_id: &str) -> String {
    let normalized = normalize_nc_id(nc_id);
    match normalized.strip_prefix(SWIFT_PREFIX) {
        Some(guid) => guid.to_string(),
        None => normalized,
    }
}

/// Programmed version per NC, keyed by `lookup_key`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgrammedVersions(HashMap<String, String>);

impl ProgrammedVersions {
    /// Programmed version reported for `nc_id`, matched after normalization
    pub fn get(&self, nc_id: &str) -> Option<&str> {
        self.0.get(&lookup_key(nc_id)).map(String::as_str)
    }

    /// Number of NCs the authority reported
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the authority reported no NC
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&NcVersionList> for ProgrammedVersions {
    fn from(list: &NcVersionList) -> Self {
        Self(
            list.containers
                .iter()
                .map(|nc| (lookup_key(&nc.network_container_id), nc.version.clone()))
                .collect(),
        )
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ProgrammedVersions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (lookup_key(k.as_ref()), v.into()))
                .collect(),
        )
    }
}

/// Fetch the programmed version list, bounded by `timeout`.
pub async fn fetch_programmed_versions(
    client: &dyn NmAgentClientTrait,
    timeout: Duration,
) -> Result<ProgrammedVersions, NmAgentError> {
    let list = tokio::time::timeout(timeout, client.get_nc_version_list())
        .await
        .map_err(|_| NmAgentError::Timeout(timeout))??;
    let versions = ProgrammedVersions::from(&list);
    debug!(count = versions.len(), "Fetched programmed NC versions");
    Ok(versions)
}

/// Decide whether `nc_id` is still waiting for dataplane programming.
///
/// `completed_version` is the target version at which the NC was last
/// confirmed complete, if any; when it equals `target_version` the authority
/// is not consulted.
pub fn is_nc_waiting_for_update(
    nc_id: &str,
    target_version: &str,
    completed_version: Option<&str>,
    programmed: &ProgrammedVersions,
) -> ProgrammingStatus {
    if completed_version == Some(target_version) {
        debug!(nc_id = %nc_id, version = %target_version, "VFP programming already complete");
        return ProgrammingStatus::Complete(format!(
            "network container {nc_id} version {target_version} already programmed"
        ));
    }

    let Ok(target) = target_version.parse::<i64>() else {
        info!(
            nc_id = %nc_id, version = %target_version,
            "NC target version is not an integer, assuming programming pending"
        );
        return ProgrammingStatus::Pending(format!(
            "network container {nc_id} has non-integer version {target_version}"
        ));
    };

    let Some(programmed_version) = programmed.get(nc_id) else {
        info!(nc_id = %nc_id, "NC not yet known to NMAgent, assuming programming pending");
        return ProgrammingStatus::Pending(format!(
            "network container {nc_id} is not yet known to NMAgent"
        ));
    };

    let Ok(programmed_version) = programmed_version.parse::<i64>() else {
        warn!(
            nc_id = %nc_id, version = %programmed_version,
            "NMAgent reported a non-integer NC version, skipping programming check"
        );
        return ProgrammingStatus::CheckSkipped(format!(
            "NMAgent reported non-integer version {programmed_version} for network container {nc_id}"
        ));
    };

    if target > programmed_version {
        return ProgrammingStatus::Pending(format!(
            "network container {nc_id} version {target} is not yet programmed by NMAgent, programmed version {programmed_version}"
        ));
    }

    info!(nc_id = %nc_id, version = target, "VFP programming complete");
    ProgrammingStatus::Complete("Vfp programming complete".to_string())
}
