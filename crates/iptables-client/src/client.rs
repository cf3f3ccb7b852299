//! iptables client implementation backed by the iptables binary

use crate::error::IptablesError;
use crate::iptables_trait::IptablesClientTrait;
use tokio::process::Command;
use tracing::{debug, info};

const DEFAULT_BINARY: &str = "iptables";

/// iptables client
///
/// Runs the iptables binary with `-w` so concurrent writers on the host wait
/// for the xtables lock instead of failing.
#[derive(Debug, Clone)]
pub struct IptablesClient {
    binary: String,
}

impl Default for IptablesClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IptablesClient {
    /// Client running the `iptables` binary found on `PATH`
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
        }
    }

    /// Use a different binary, e.g. `iptables-legacy` or `iptables-nft`
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(table: &str, op: &str, chain: &str, rest: &[String]) -> Vec<String> {
        let mut args = vec![
            "-w".to_string(),
            "-t".to_string(),
            table.to_string(),
            op.to_string(),
            chain.to_string(),
        ];
        args.extend(rest.iter().cloned());
        args
    }

    /// Run iptables and return its exit code.
    ///
    /// Exit code 1 is returned as `Ok(1)` because -C and -S use it for
    /// "not present"; any other failure is an error.
    async fn run(&self, args: &[String]) -> Result<i32, IptablesError> {
        debug!(binary = %self.binary, args = ?args, "Running iptables");
        let output = Command::new(&self.binary).args(args).output().await?;

        match output.status.code() {
            Some(0) => Ok(0),
            Some(1) => Ok(1),
            code => Err(IptablesError::Command {
                cmd: format!("{} {}", self.binary, args.join(" ")),
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn run_checked(&self, args: &[String]) -> Result<(), IptablesError> {
        debug!(binary = %self.binary, args = ?args, "Running iptables");
        let output = Command::new(&self.binary).args(args).output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(IptablesError::Command {
                cmd: format!("{} {}", self.binary, args.join(" ")),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait::async_trait]
impl IptablesClientTrait for IptablesClient {
    async fn chain_exists(&self, table: &str, chain: &str) -> Result<bool, IptablesError> {
        let code = self.run(&Self::args(table, "-S", chain, &[])).await?;
        Ok(code == 0)
    }

    async fn new_chain(&self, table: &str, chain: &str) -> Result<(), IptablesError> {
        info!(table = %table, chain = %chain, "Creating iptables chain");
        self.run_checked(&Self::args(table, "-N", chain, &[])).await
    }

    async fn rule_exists(&self, table: &str, chain: &str, rulespec: &[String]) -> Result<bool, IptablesError> {
        let code = self.run(&Self::args(table, "-C", chain, rulespec)).await?;
        Ok(code == 0)
    }

    async fn append_rule(&self, table: &str, chain: &str, rulespec: &[String]) -> Result<(), IptablesError> {
        info!(table = %table, chain = %chain, rule = ?rulespec, "Appending iptables rule");
        self.run_checked(&Self::args(table, "-A", chain, rulespec)).await
    }

    async fn insert_rule(&self, table: &str, chain: &str, position: usize, rulespec: &[String]) -> Result<(), IptablesError> {
        info!(table = %table, chain = %chain, position, rule = ?rulespec, "Inserting iptables rule");
        let mut rest = vec![position.to_string()];
        rest.extend(rulespec.iter().cloned());
        self.run_checked(&Self::args(table, "-I", chain, &rest)).await
    }
}
