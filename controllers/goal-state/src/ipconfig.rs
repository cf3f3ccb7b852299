//! Secondary IP allocation state machine
//!
//! `IpConfigPool` owns one `IPConfigurationStatus` per secondary IP config ID
//! across all network containers, plus an index from pod interface key to
//! the IDs that pod holds. Lifecycle:
//!
//! ```text
//! (new) -> PendingProgramming -> Available -> Assigned -> Available -> (removed)
//!                                Available -> PendingRelease -> (removed)
//! ```
//!
//! An `Assigned` entry is never removed and never changes version. Removal
//! candidates are validated before anything is touched, so a failed reconcile
//! leaves the pool as it was.

use crate::error::ServiceError;
use crate::metrics::StateTransitionHook;
use chrono::Utc;
use cns_types::{IPConfigurationStatus, IPState, PodInfo, SecondaryIPConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

type StatusMap = BTreeMap<String, IPConfigurationStatus>;

/// All tracked secondary IPs, keyed by IP config ID.
///
/// Persisted as the bare ID → status map; the pod index is rebuilt from the
/// statuses on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StatusMap", into = "StatusMap")]
pub struct IpConfigPool {
    configs: StatusMap,
    by_pod: BTreeMap<String, Vec<String>>,
}

impl From<StatusMap> for IpConfigPool {
    fn from(configs: StatusMap) -> Self {
        let mut by_pod: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (id, status) in &configs {
            if status.state == IPState::Assigned {
                if let Some(pod) = &status.pod_info {
                    by_pod.entry(pod.interface_key()).or_default().push(id.clone());
                }
            }
        }
        Self { configs, by_pod }
    }
}

impl From<IpConfigPool> for StatusMap {
    fn from(pool: IpConfigPool) -> Self {
        pool.configs
    }
}

impl IpConfigPool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of one IP config
    pub fn get(&self, id: &str) -> Option<&IPConfigurationStatus> {
        self.configs.get(id)
    }

    /// Every tracked IP config, ordered by ID
    pub fn iter(&self) -> impl Iterator<Item = (&String, &IPConfigurationStatus)> {
        self.configs.iter()
    }

    /// Number of tracked IP configs
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Whether no IP config is tracked
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// IDs held by a pod interface, in assignment order.
    pub fn ids_for_pod(&self, interface_key: &str) -> &[String] {
        self.by_pod
            .get(interface_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Pod interface key to the IDs it holds
    pub fn pod_index(&self) -> &BTreeMap<String, Vec<String>> {
        &self.by_pod
    }

    /// Every status, keyed by IP config ID
    pub fn statuses(&self) -> &BTreeMap<String, IPConfigurationStatus> {
        &self.configs
    }

    /// Number of IPs per state. Every state is present, possibly with zero.
    pub fn count_by_state(&self) -> BTreeMap<IPState, usize> {
        let mut counts: BTreeMap<IPState, usize> = IPState::ALL.iter().map(|s| (*s, 0)).collect();
        for status in self.configs.values() {
            *counts.entry(status.state).or_default() += 1;
        }
        counts
    }

    /// NC IDs that own at least one tracked IP.
    pub fn nc_ids(&self) -> BTreeSet<&str> {
        self.configs.values().map(|s| s.nc_id.as_str()).collect()
    }

    /// First `Available` IP of `nc_id`.
    pub fn find_available(&self, nc_id: &str) -> Option<&str> {
        self.configs
            .values()
            .find(|s| s.nc_id == nc_id && s.state == IPState::Available)
            .map(|s| s.id.as_str())
    }

    /// ID of the tracked entry for `ip_address`.
    pub fn find_by_address(&self, ip_address: &str) -> Option<&str> {
        self.configs
            .values()
            .find(|s| s.ip_address == ip_address)
            .map(|s| s.id.as_str())
    }

    fn transition(
        status: &mut IPConfigurationStatus,
        to: IPState,
        hook: &dyn StateTransitionHook,
    ) {
        let from = status.state;
        status.state = to;
        status.last_state_transition = Utc::now();
        hook.on_transition(&status.id, Some(from), Some(to));
    }

    /// Check that a goal-state update for `nc_id` can be applied without
    /// touching the pool.
    ///
    /// Removing an `Assigned` entry is rejected unless `skip_validation`. A
    /// newly listed ID that is already tracked under another NC, or is still
    /// `Assigned`, is always rejected.
    pub fn validate_secondary_ips(
        &self,
        nc_id: &str,
        new_configs: &BTreeMap<String, SecondaryIPConfig>,
        previous: &BTreeMap<String, SecondaryIPConfig>,
        skip_validation: bool,
    ) -> Result<(), ServiceError> {
        if !skip_validation {
            for id in previous.keys().filter(|id| !new_configs.contains_key(*id)) {
                if let Some(status) = self.configs.get(id) {
                    if status.state == IPState::Assigned {
                        return Err(ServiceError::InconsistentIPConfigState(format!(
                            "failed to delete an Assigned IP {} ({}) of NC {}",
                            status.ip_address, id, nc_id
                        )));
                    }
                }
            }
        }

        for id in new_configs.keys().filter(|id| !previous.contains_key(*id)) {
            if let Some(status) = self.configs.get(id) {
                if status.nc_id != nc_id {
                    return Err(ServiceError::InconsistentIPConfigState(format!(
                        "IP config {} is already owned by NC {}",
                        id, status.nc_id
                    )));
                }
                if status.state == IPState::Assigned {
                    return Err(ServiceError::InconsistentIPConfigState(format!(
                        "IP config {} ({}) is re-added while Assigned",
                        id, status.ip_address
                    )));
                }
            }
        }
        Ok(())
    }

    /// Bring the pool in line with a new goal state for `nc_id`.
    ///
    /// IDs in `previous` but not in `new_configs` are removed; removing an
    /// `Assigned` entry fails with `InconsistentIPConfigState` unless
    /// `skip_validation` says the caller already checked. IDs present in both
    /// keep the version they were introduced at: `new_configs` is rewritten
    /// in place so the stored goal state carries the pinned versions. New IDs
    /// start `PendingProgramming` when `host_version` is behind their version,
    /// `Available` otherwise.
    pub fn reconcile_secondary_ips(
        &mut self,
        nc_id: &str,
        new_configs: &mut BTreeMap<String, SecondaryIPConfig>,
        previous: &BTreeMap<String, SecondaryIPConfig>,
        host_version: i64,
        skip_validation: bool,
        hook: &dyn StateTransitionHook,
    ) -> Result<(), ServiceError> {
        self.validate_secondary_ips(nc_id, new_configs, previous, skip_validation)?;

        let to_remove: Vec<String> = previous
            .keys()
            .filter(|id| !new_configs.contains_key(*id))
            .cloned()
            .collect();

        for id in &to_remove {
            self.remove(id, true, hook)?;
        }

        for (id, config) in new_configs.iter_mut() {
            if let Some(existing) = previous.get(id) {
                config.nc_version = existing.nc_version;
            }

            if let Some(status) = self.configs.get(id) {
                debug!(
                    id = %id, ip = %config.ip_address, nc_version = config.nc_version,
                    host_version, state = %status.state,
                    "IP config already tracked"
                );
                continue;
            }

            let state = if host_version < config.nc_version {
                IPState::PendingProgramming
            } else {
                IPState::Available
            };
            info!(
                id = %id, ip = %config.ip_address, nc_version = config.nc_version,
                host_version, state = %state,
                "Adding IP config"
            );
            self.configs.insert(
                id.clone(),
                IPConfigurationStatus::new(nc_id, id.as_str(), config.ip_address.as_str(), state),
            );
            hook.on_transition(id, None, Some(state));
        }

        Ok(())
    }

    /// Remove one entry. Fails on an `Assigned` entry unless `skip_validation`.
    pub fn remove(
        &mut self,
        id: &str,
        skip_validation: bool,
        hook: &dyn StateTransitionHook,
    ) -> Result<Option<IPConfigurationStatus>, ServiceError> {
        if !skip_validation {
            if let Some(status) = self.configs.get(id) {
                if status.state == IPState::Assigned {
                    return Err(ServiceError::InconsistentIPConfigState(format!(
                        "failed to delete an Assigned IP {} ({})",
                        status.ip_address, id
                    )));
                }
            }
        }

        let removed = self.configs.remove(id);
        if let Some(status) = &removed {
            info!(id = %id, ip = %status.ip_address, state = %status.state, "Removing IP config");
            if let Some(pod) = &status.pod_info {
                self.unindex(&pod.interface_key(), id);
            }
            hook.on_transition(id, Some(status.state), None);
        }
        Ok(removed)
    }

    /// Hand an `Available` IP to a pod.
    pub fn assign(
        &mut self,
        id: &str,
        pod: &PodInfo,
        hook: &dyn StateTransitionHook,
    ) -> Result<&IPConfigurationStatus, ServiceError> {
        let status = self.configs.get_mut(id).ok_or_else(|| {
            ServiceError::NotFound(format!("IP config {id} is not tracked"))
        })?;
        if status.state != IPState::Available {
            return Err(ServiceError::InconsistentIPConfigState(format!(
                "cannot assign IP {} ({}) in state {}",
                status.ip_address, id, status.state
            )));
        }

        Self::transition(status, IPState::Assigned, hook);
        status.pod_info = Some(pod.clone());
        self.by_pod
            .entry(pod.interface_key())
            .or_default()
            .push(id.to_string());

        Ok(&self.configs[id])
    }

    /// Return an `Assigned` IP to the available set.
    pub fn release(&mut self, id: &str, hook: &dyn StateTransitionHook) -> Result<(), ServiceError> {
        let status = self.configs.get_mut(id).ok_or_else(|| {
            ServiceError::NotFound(format!("IP config {id} is not tracked"))
        })?;
        if status.state != IPState::Assigned {
            return Err(ServiceError::InconsistentIPConfigState(format!(
                "cannot release IP {} ({}) in state {}",
                status.ip_address, id, status.state
            )));
        }

        Self::transition(status, IPState::Available, hook);
        if let Some(pod) = status.pod_info.take() {
            self.unindex(&pod.interface_key(), id);
        }
        Ok(())
    }

    /// Mark an unassigned IP for removal on the next scale-down.
    ///
    /// Returns false when the IP was already pending release.
    pub fn mark_pending_release(
        &mut self,
        id: &str,
        hook: &dyn StateTransitionHook,
    ) -> Result<bool, ServiceError> {
        let status = self.configs.get_mut(id).ok_or_else(|| {
            ServiceError::NotFound(format!("IP config {id} is not tracked"))
        })?;
        match status.state {
            IPState::PendingRelease => Ok(false),
            IPState::Assigned => Err(ServiceError::InconsistentIPConfigState(format!(
                "cannot mark Assigned IP {} ({}) as pending release",
                status.ip_address, id
            ))),
            IPState::Available | IPState::PendingProgramming => {
                Self::transition(status, IPState::PendingRelease, hook);
                Ok(true)
            }
        }
    }

    /// Promote `PendingProgramming` IPs of `nc_id` whose version the host has
    /// now programmed. Returns the number promoted.
    pub fn promote_programmed(
        &mut self,
        nc_id: &str,
        host_version: i64,
        configs: &BTreeMap<String, SecondaryIPConfig>,
        hook: &dyn StateTransitionHook,
    ) -> usize {
        let mut promoted = 0;
        for (id, config) in configs {
            if config.nc_version > host_version {
                continue;
            }
            if let Some(status) = self.configs.get_mut(id) {
                if status.nc_id == nc_id && status.state == IPState::PendingProgramming {
                    Self::transition(status, IPState::Available, hook);
                    promoted += 1;
                }
            }
        }
        promoted
    }

    /// Remove every IP of `nc_id`. Fails without removing anything if one is
    /// `Assigned`.
    pub fn remove_nc(&mut self, nc_id: &str, hook: &dyn StateTransitionHook) -> Result<usize, ServiceError> {
        let ids: Vec<String> = self
            .configs
            .values()
            .filter(|s| s.nc_id == nc_id)
            .map(|s| s.id.clone())
            .collect();

        if let Some(assigned) = ids
            .iter()
            .filter_map(|id| self.configs.get(id))
            .find(|s| s.state == IPState::Assigned)
        {
            return Err(ServiceError::InconsistentIPConfigState(format!(
                "NC {} still has Assigned IP {} ({})",
                nc_id, assigned.ip_address, assigned.id
            )));
        }

        for id in &ids {
            self.remove(id, true, hook)?;
        }
        Ok(ids.len())
    }

    fn unindex(&mut self, interface_key: &str, id: &str) {
        if let Some(ids) = self.by_pod.get_mut(interface_key) {
            ids.retain(|held| held != id);
            if ids.is_empty() {
                self.by_pod.remove(interface_key);
            }
        }
    }
}

#[cfg(test)]
#[path = "ipconfig_test.rs"]
mod ipconfig_test;
