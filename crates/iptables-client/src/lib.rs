//! iptables client
//!
//! Narrow client over the iptables NAT table: chain and rule existence checks,
//! chain creation, and rule append/insert. Every mutation is meant to be
//! preceded by an existence check so callers stay idempotent.

pub mod client;
pub mod constants;
pub mod error;
#[path = "trait.rs"]
pub mod iptables_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::IptablesClient;
pub use error::IptablesError;
pub use iptables_trait::IptablesClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockIptablesClient;
