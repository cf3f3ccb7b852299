//! Lock domains and bounded tracking shared across goal-state operations
//!
//! The main service state sits behind a single `tokio::sync::RwLock` owned by
//! the orchestrator. The primitives here cover what that lock does not:
//! named lock domains for partitions updated on their own cadence, and a
//! bounded set that can be touched without holding the main lock.

mod named_lock;
mod timed_set;

pub use named_lock::NamedLocks;
pub use timed_set::TimedSet;

/// Lock domain for networks-joined tracking.
pub const JOINED_NETWORKS: &str = "joinedNetworks";
/// Lock domain for SWIFT SNAT chain programming.
pub const SNAT_RULES: &str = "snatRules";
