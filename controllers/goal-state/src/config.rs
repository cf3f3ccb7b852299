//! Service configuration from environment variables

use crate::error::ControllerError;
use cns_types::OrchestratorType;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_STORE_PATH: &str = "/var/lib/azure-network/azure-cns.json";
const DEFAULT_ENDPOINT_STORE_PATH: &str = "/var/run/azure-cns/azure-endpoints.json";
const DEFAULT_NMAGENT_URL: &str = "http://168.63.129.16";
const DEFAULT_NET_PLUGIN_PATH: &str = "/opt/cni/bin";
const DEFAULT_NET_PLUGIN_CONFIG_FILE: &str = "/etc/cni/net.d/10-azure.conflist";
const DEFAULT_NET_PLUGIN_BINARY: &str = "azure-vnet";
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";
/// Maximum schedulable pods per node
pub const DEFAULT_MAX_PODS: usize = 250;

/// How goal state reaches the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// Pushed by the orchestrator
    #[default]
    Direct,
    /// Pulled from the control plane on demand
    Managed,
}

impl std::str::FromStr for ChannelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(ChannelMode::Direct),
            "managed" => Ok(ChannelMode::Managed),
            other => Err(format!("unknown channel mode {other}")),
        }
    }
}

/// Control plane coordinates needed in managed mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedSettings {
    pub dnc_endpoint: String,
    pub dnc_timeout: Duration,
    pub infra_network_id: String,
    pub node_id: String,
}

/// Runtime configuration of the goal-state service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub store_path: PathBuf,
    pub endpoint_store_path: PathBuf,
    pub nmagent_url: String,
    pub nmagent_timeout: Duration,
    pub channel_mode: ChannelMode,
    /// Set iff `channel_mode` is `Managed`
    pub managed: Option<ManagedSettings>,
    pub orchestrator_type: Option<OrchestratorType>,
    pub max_pods: usize,
    pub nc_snapshot_interval: Duration,
    pub host_nc_sync_interval: Duration,
    pub manage_endpoint_state: bool,
    /// Host primary address used for metadata SNAT when the NC request
    /// carries none.
    pub host_primary_ip: Option<String>,
    pub net_plugin_path: PathBuf,
    pub net_plugin_config_file: PathBuf,
    pub net_plugin_binary: String,
    /// Where `/metrics` is served; `None` disables it
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            endpoint_store_path: PathBuf::from(DEFAULT_ENDPOINT_STORE_PATH),
            nmagent_url: DEFAULT_NMAGENT_URL.to_string(),
            nmagent_timeout: Duration::from_secs(2),
            channel_mode: ChannelMode::Direct,
            managed: None,
            orchestrator_type: None,
            max_pods: DEFAULT_MAX_PODS,
            nc_snapshot_interval: Duration::from_secs(60 * 60),
            host_nc_sync_interval: Duration::from_secs(1),
            manage_endpoint_state: false,
            host_primary_ip: None,
            net_plugin_path: PathBuf::from(DEFAULT_NET_PLUGIN_PATH),
            net_plugin_config_file: PathBuf::from(DEFAULT_NET_PLUGIN_CONFIG_FILE),
            net_plugin_binary: DEFAULT_NET_PLUGIN_BINARY.to_string(),
            metrics_addr: DEFAULT_METRICS_ADDR.parse().ok(),
        }
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{name}={value:?}: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ControllerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(ControllerError::InvalidConfig(format!(
            "{name}={value:?}: expected a boolean"
        ))),
    }
}

impl ServiceConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let mut config = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("CNS_STORE_PATH") {
            config.store_path = PathBuf::from(v);
        }
        if let Some(v) = var("CNS_ENDPOINT_STORE_PATH") {
            config.endpoint_store_path = PathBuf::from(v);
        }
        if let Some(v) = var("NMAGENT_URL") {
            config.nmagent_url = v;
        }
        if let Some(v) = var("NMAGENT_TIMEOUT_SECS") {
            config.nmagent_timeout = Duration::from_secs(parse("NMAGENT_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("CHANNEL_MODE") {
            config.channel_mode = parse("CHANNEL_MODE", &v)?;
        }
        if let Some(v) = var("ORCHESTRATOR_TYPE") {
            config.orchestrator_type = Some(parse("ORCHESTRATOR_TYPE", &v)?);
        }
        if let Some(v) = var("MAX_PODS") {
            config.max_pods = parse("MAX_PODS", &v)?;
            if config.max_pods == 0 {
                return Err(ControllerError::InvalidConfig(
                    "MAX_PODS must be greater than zero".to_string(),
                ));
            }
        }
        if let Some(v) = var("NC_SNAPSHOT_INTERVAL_MINS") {
            let mins: u64 = parse("NC_SNAPSHOT_INTERVAL_MINS", &v)?;
            config.nc_snapshot_interval = Duration::from_secs(mins * 60);
        }
        if let Some(v) = var("HOST_NC_SYNC_INTERVAL_SECS") {
            config.host_nc_sync_interval = Duration::from_secs(parse("HOST_NC_SYNC_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = var("MANAGE_ENDPOINT_STATE") {
            config.manage_endpoint_state = parse_bool("MANAGE_ENDPOINT_STATE", &v)?;
        }
        if let Some(v) = var("HOST_PRIMARY_IP") {
            config.host_primary_ip = Some(v);
        }
        if let Some(v) = var("NET_PLUGIN_PATH") {
            config.net_plugin_path = PathBuf::from(v);
        }
        if let Some(v) = var("NET_PLUGIN_CONFIG_FILE") {
            config.net_plugin_config_file = PathBuf::from(v);
        }
        if let Some(v) = var("METRICS_ADDR") {
            config.metrics_addr = if v.trim().eq_ignore_ascii_case("off") {
                None
            } else {
                Some(parse("METRICS_ADDR", &v)?)
            };
        }

        if config.channel_mode == ChannelMode::Managed {
            let required = |name: &str| {
                var(name).ok_or_else(|| {
                    ControllerError::InvalidConfig(format!(
                        "{name} environment variable is required in managed mode"
                    ))
                })
            };
            let dnc_timeout = match var("DNC_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(parse("DNC_TIMEOUT_SECS", &v)?),
                None => Duration::from_secs(10),
            };
            config.managed = Some(ManagedSettings {
                dnc_endpoint: required("DNC_ENDPOINT")?,
                dnc_timeout,
                infra_network_id: required("INFRA_NETWORK_ID")?,
                node_id: required("NODE_ID")?,
            });
        }

        Ok(config)
    }
}
