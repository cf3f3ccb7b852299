//! iptables client errors

use thiserror::Error;

/// Errors that can occur when running iptables
#[derive(Debug, Error)]
pub enum IptablesError {
    /// The binary could not be spawned
    #[error("failed to run iptables: {0}")]
    Io(#[from] std::io::Error),

    /// iptables ran and exited with a failure status
    #[error("command '{cmd}' failed with exit code {code:?}: {stderr}")]
    Command {
        cmd: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Chain does not exist in the table
    #[error("chain {table}/{chain} not found")]
    ChainNotFound { table: String, chain: String },

    /// Chain already exists in the table
    #[error("chain {table}/{chain} already exists")]
    ChainExists { table: String, chain: String },
}
