//! Periodic tasks: host NC version sync and NC snapshot logging

use super::network_container::log_nc_snapshot;
use super::GoalStateOrchestrator;
use crate::backoff::FibonacciBackoff;
use crate::error::ServiceError;
use crate::reconciler;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SYNC_BACKOFF_MIN_SECS: u64 = 1;
const SYNC_BACKOFF_MAX_SECS: u64 = 30;

impl GoalStateOrchestrator {
    /// Advance each NC's host version to what NMAgent reports as programmed
    /// and promote the IPs that became routable.
    ///
    /// Returns the number of NCs whose host version moved.
    pub async fn sync_host_nc_version(&self) -> Result<usize, ServiceError> {
        let programmed = reconciler::fetch_programmed_versions(self.nmagent.as_ref(), self.nmagent_timeout).await?;

        let mut state = self.state.write().await;
        let state = &mut *state;
        let mut updated = 0;
        for (nc_id, status) in state.container_status.iter_mut() {
            let Some(reported) = programmed.get(nc_id) else {
                continue;
            };
            let Ok(reported) = reported.parse::<i64>() else {
                warn!(nc_id = %nc_id, version = %reported, "NMAgent reported a non-integer NC version");
                continue;
            };
            if reported <= status.host_version {
                continue;
            }

            let promoted = state.pod_ip_config_state.promote_programmed(
                nc_id,
                reported,
                &status.create_network_container_request.secondary_ip_configs,
                self.hook.as_ref(),
            );
            info!(
                nc_id = %nc_id, from = status.host_version, to = reported, promoted,
                "Host NC version advanced"
            );
            status.host_version = reported;
            updated += 1;
        }

        if updated > 0 {
            self.persist(state).await?;
        }
        Ok(updated)
    }

    /// Emit a snapshot of every stored NC.
    pub async fn log_nc_snapshots(&self) {
        let state = self.state.read().await;
        for status in state.container_status.values() {
            log_nc_snapshot(&status.create_network_container_request);
        }
        info!(count = state.container_status.len(), "Logged periodic NC snapshots");
    }

    /// Run `sync_host_nc_version` forever, every `interval` while it
    /// succeeds and with Fibonacci backoff while it fails.
    pub async fn run_host_nc_sync(self: Arc<Self>, interval: Duration) {
        let mut backoff = FibonacciBackoff::new(SYNC_BACKOFF_MIN_SECS, SYNC_BACKOFF_MAX_SECS);
        loop {
            let delay = match self.sync_host_nc_version().await {
                Ok(updated) => {
                    debug!(updated, "Host NC version sync complete");
                    backoff.reset();
                    interval
                }
                Err(e) => {
                    let delay = backoff.next_backoff().max(interval);
                    warn!("Host NC version sync failed, retrying in {:?}: {}", delay, e);
                    delay
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// Emit NC snapshots now and then every `interval`, forever.
    pub async fn run_nc_snapshots(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.log_nc_snapshots().await;
        }
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;
