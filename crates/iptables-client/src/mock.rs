//! Mock IptablesClient for unit testing
//!
//! Tables and chains live in memory as ordered rule lists. Built-in chains
//! exist from the start in every table.

use crate::constants::BUILTIN_CHAINS;
use crate::error::IptablesError;
use crate::iptables_trait::IptablesClientTrait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type ChainKey = (String, String);

/// Mock IptablesClient for testing
#[derive(Clone, Default, Debug)]
pub struct MockIptablesClient {
    chains: Arc<Mutex<HashMap<ChainKey, Vec<Vec<String>>>>>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MockIptablesClient {
    /// Mock with only the built-in chains
    pub fn new() -> Self {
        Self::default()
    }

    /// Make chain creation and rule append/insert fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful mutating calls (new chain, append, insert)
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Rules currently in a chain, in order
    pub fn rules(&self, table: &str, chain: &str) -> Vec<Vec<String>> {
        self.chains
            .lock()
            .unwrap()
            .get(&(table.to_string(), chain.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn is_builtin(chain: &str) -> bool {
        BUILTIN_CHAINS.contains(&chain)
    }

    fn check_write(&self) -> Result<(), IptablesError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IptablesError::Command {
                cmd: "mock".to_string(),
                code: Some(4),
                stderr: "mock failure".to_string(),
            });
        }
        Ok(())
    }

    fn with_chain<T>(
        &self,
        table: &str,
        chain: &str,
        f: impl FnOnce(&mut Vec<Vec<String>>) -> T,
    ) -> Result<T, IptablesError> {
        let mut chains = self.chains.lock().unwrap();
        let key = (table.to_string(), chain.to_string());
        if Self::is_builtin(chain) {
            return Ok(f(chains.entry(key).or_default()));
        }
        match chains.get_mut(&key) {
            Some(rules) => Ok(f(rules)),
            None => Err(IptablesError::ChainNotFound {
                table: table.to_string(),
                chain: chain.to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl IptablesClientTrait for MockIptablesClient {
    async fn chain_exists(&self, table: &str, chain: &str) -> Result<bool, IptablesError> {
        if Self::is_builtin(chain) {
            return Ok(true);
        }
        Ok(self
            .chains
            .lock()
            .unwrap()
            .contains_key(&(table.to_string(), chain.to_string())))
    }

    async fn new_chain(&self, table: &str, chain: &str) -> Result<(), IptablesError> {
        self.check_write()?;
        let mut chains = self.chains.lock().unwrap();
        let key = (table.to_string(), chain.to_string());
        if Self::is_builtin(chain) || chains.contains_key(&key) {
            return Err(IptablesError::ChainExists {
                table: table.to_string(),
                chain: chain.to_string(),
            });
        }
        chains.insert(key, Vec::new());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rule_exists(&self, table: &str, chain: &str, rulespec: &[String]) -> Result<bool, IptablesError> {
        self.with_chain(table, chain, |rules| rules.iter().any(|r| r == rulespec))
    }

    async fn append_rule(&self, table: &str, chain: &str, rulespec: &[String]) -> Result<(), IptablesError> {
        self.check_write()?;
        self.with_chain(table, chain, |rules| rules.push(rulespec.to_vec()))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_rule(&self, table: &str, chain: &str, position: usize, rulespec: &[String]) -> Result<(), IptablesError> {
        self.check_write()?;
        self.with_chain(table, chain, |rules| {
            let index = position.saturating_sub(1).min(rules.len());
            rules.insert(index, rulespec.to_vec());
        })?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
