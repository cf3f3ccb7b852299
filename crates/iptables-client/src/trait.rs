//! IptablesClient trait for mocking

use crate::error::IptablesError;

/// Trait for iptables operations
///
/// A rule spec is the argument list after the chain name, e.g.
/// `["-p", "udp", "--dport", "53", "-j", "SNAT", "--to", "10.0.0.4"]`.
#[async_trait::async_trait]
pub trait IptablesClientTrait: Send + Sync {
    async fn chain_exists(&self, table: &str, chain: &str) -> Result<bool, IptablesError>;
    async fn new_chain(&self, table: &str, chain: &str) -> Result<(), IptablesError>;
    async fn rule_exists(&self, table: &str, chain: &str, rulespec: &[String]) -> Result<bool, IptablesError>;
    async fn append_rule(&self, table: &str, chain: &str, rulespec: &[String]) -> Result<(), IptablesError>;
    /// Insert at a 1-based position.
    async fn insert_rule(&self, table: &str, chain: &str, position: usize, rulespec: &[String]) -> Result<(), IptablesError>;
}
