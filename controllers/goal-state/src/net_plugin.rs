//! Network plugin invocation for host-resident containers
//!
//! Attach and detach on the Batch path hand the container to the CNI network
//! plugin: `ADD` on attach, `DEL` on detach, with the plugin's network
//! configuration file fed on stdin.

use async_trait::async_trait;
use cns_types::PodInfo;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors that can occur when running the network plugin
#[derive(Debug, Error)]
pub enum NetPluginError {
    #[error("network plugin I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Plugin ran and reported failure
    #[error("{command} for container {container_id} exited with {code:?}: {output}")]
    Failed {
        command: &'static str,
        container_id: String,
        code: Option<i32>,
        output: String,
    },
}

/// Attach/detach of a host-resident container to its network container
#[async_trait]
pub trait NetPluginTrait: Send + Sync {
    async fn attach(&self, pod: &PodInfo, container_id: &str) -> Result<(), NetPluginError>;
    async fn detach(&self, pod: &PodInfo, container_id: &str) -> Result<(), NetPluginError>;
}

const CNI_ADD: &str = "ADD";
const CNI_DEL: &str = "DEL";
const INTERFACE_NAME: &str = "eth0";

/// CNI network plugin binary
#[derive(Debug, Clone)]
pub struct NetPlugin {
    binary: PathBuf,
    config_file: PathBuf,
}

impl NetPlugin {
    /// # Arguments
    /// * `plugin_dir` - Directory holding the plugin binary (CNI_PATH)
    /// * `binary` - Plugin binary name inside `plugin_dir`
    /// * `config_file` - Network configuration passed on stdin
    pub fn new(plugin_dir: impl AsRef<Path>, binary: &str, config_file: impl Into<PathBuf>) -> Self {
        Self {
            binary: plugin_dir.as_ref().join(binary),
            config_file: config_file.into(),
        }
    }

    fn cni_args(pod: &PodInfo) -> String {
        format!(
            "K8S_POD_NAMESPACE={};K8S_POD_NAME={}",
            pod.pod_namespace, pod.pod_name
        )
    }

    async fn execute(&self, command: &'static str, pod: &PodInfo, container_id: &str) -> Result<(), NetPluginError> {
        let config = tokio::fs::read(&self.config_file).await?;
        let plugin_dir = self.binary.parent().unwrap_or_else(|| Path::new("."));

        debug!(
            binary = %self.binary.display(), command, container_id = %container_id,
            "Running network plugin"
        );
        let mut child = Command::new(&self.binary)
            .env("CNI_COMMAND", command)
            .env("CNI_CONTAINERID", container_id)
            // Host-resident containers are addressed by container ID.
            .env("CNI_NETNS", container_id)
            .env("CNI_IFNAME", INTERFACE_NAME)
            .env("CNI_PATH", plugin_dir)
            .env("CNI_ARGS", Self::cni_args(pod))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&config).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                text.push(' ');
                text.push_str(stderr.trim());
            }
            return Err(NetPluginError::Failed {
                command,
                container_id: container_id.to_string(),
                code: output.status.code(),
                output: text,
            });
        }

        info!(
            command, container_id = %container_id, pod = %pod.orchestrator_context_key(),
            "Network plugin succeeded"
        );
        Ok(())
    }
}

#[async_trait]
impl NetPluginTrait for NetPlugin {
    async fn attach(&self, pod: &PodInfo, container_id: &str) -> Result<(), NetPluginError> {
        self.execute(CNI_ADD, pod, container_id).await
    }

    async fn detach(&self, pod: &PodInfo, container_id: &str) -> Result<(), NetPluginError> {
        self.execute(CNI_DEL, pod, container_id).await
    }
}
