use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::trace;

/// Table of independently lockable domains, keyed by name.
///
/// A domain is created on first use and lives as long as the table. The
/// returned guard releases the domain when dropped.
#[derive(Debug, Default)]
pub struct NamedLocks {
    domains: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl NamedLocks {
    /// Empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock called `name`, creating it on first use.
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let domain = {
            let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(domains.entry(name.to_string()).or_default())
        };
        trace!(domain = %name, "Acquiring named lock");
        domain.lock_owned().await
    }

    /// Acquire without waiting; `None` when the domain is held.
    pub fn try_acquire(&self, name: &str) -> Option<OwnedMutexGuard<()>> {
        let domain = {
            let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(domains.entry(name.to_string()).or_default())
        };
        domain.try_lock_owned().ok()
    }
}
