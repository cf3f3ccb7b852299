//! Goal-State Controller
//!
//! Restores persisted state on start, then runs the host NC version sync and
//! the periodic NC snapshot until interrupted.

use goal_state_controller::config::ServiceConfig;
use goal_state_controller::dnc::{ControlPlaneClientTrait, DncClient};
use goal_state_controller::error::ControllerError;
use goal_state_controller::metrics::{self, PrometheusStateHook};
use goal_state_controller::net_plugin::NetPlugin;
use goal_state_controller::service::{Collaborators, GoalStateOrchestrator};
use goal_state_controller::store::{JsonFileStore, KeyValueStore};
use iptables_client::IptablesClient;
use nmagent_client::NmAgentClient;
use prometheus::Registry;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Goal-State Controller");

    let config = ServiceConfig::from_env()?;

    info!("Configuration:");
    info!("  Store: {}", config.store_path.display());
    info!("  NMAgent URL: {} (timeout {:?})", config.nmagent_url, config.nmagent_timeout);
    info!("  Channel mode: {:?}", config.channel_mode);
    info!(
        "  Orchestrator type: {}",
        config
            .orchestrator_type
            .map_or_else(|| "from persisted state".to_string(), |t| t.to_string())
    );
    info!("  Max pods: {}", config.max_pods);
    info!("  Metrics: {}", config.metrics_addr.map_or_else(|| "disabled".to_string(), |a| a.to_string()));
    info!(
        "  Endpoint state: {}",
        if config.manage_endpoint_state {
            config.endpoint_store_path.display().to_string()
        } else {
            "not managed".to_string()
        }
    );

    let control_plane = match &config.managed {
        Some(settings) => {
            info!("  Control plane: {} (node {})", settings.dnc_endpoint, settings.node_id);
            let client = DncClient::new(settings.dnc_endpoint.clone(), settings.dnc_timeout)?;
            Some(Arc::new(client) as Arc<dyn ControlPlaneClientTrait>)
        }
        None => None,
    };

    let registry = Registry::new();
    let hook = PrometheusStateHook::new(&registry)?;

    let deps = Collaborators {
        store: Arc::new(JsonFileStore::new(&config.store_path)),
        endpoint_store: config
            .manage_endpoint_state
            .then(|| Arc::new(JsonFileStore::new(&config.endpoint_store_path)) as Arc<dyn KeyValueStore>),
        nmagent: Arc::new(NmAgentClient::new(config.nmagent_url.clone(), config.nmagent_timeout)?),
        iptables: Arc::new(IptablesClient::new()),
        control_plane,
        net_plugin: Arc::new(NetPlugin::new(
            &config.net_plugin_path,
            &config.net_plugin_binary,
            config.net_plugin_config_file.clone(),
        )),
        hook: Arc::new(hook),
    };

    let orchestrator = Arc::new(GoalStateOrchestrator::new(&config, deps)?);
    orchestrator.restore_state().await;

    let mut tasks = Vec::new();
    match config.metrics_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tasks.push(tokio::spawn(async move {
                if let Err(e) = metrics::serve(listener, registry).await {
                    warn!("Metrics server stopped: {}", e);
                }
            }));
        }
        None => warn!("Metrics endpoint disabled"),
    }
    if config.host_nc_sync_interval.is_zero() {
        warn!("Host NC version sync disabled");
    } else {
        tasks.push(tokio::spawn(
            Arc::clone(&orchestrator).run_host_nc_sync(config.host_nc_sync_interval),
        ));
    }
    if config.nc_snapshot_interval.is_zero() {
        warn!("Periodic NC snapshots disabled");
    } else {
        tasks.push(tokio::spawn(
            Arc::clone(&orchestrator).run_nc_snapshots(config.nc_snapshot_interval),
        ));
    }

    info!("Goal-State Controller running");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down Goal-State Controller");
    for task in tasks {
        task.abort();
    }
    Ok(())
}
