//! IP state transition metrics
//!
//! Every allocation state change goes through a `StateTransitionHook`. The
//! Prometheus hook keeps one gauge per state and counts transitions by their
//! from/to pair. Creation is reported as a transition from "none" and
//! removal as a transition to "none". The registry is served as text on
//! `/metrics`.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use cns_types::IPState;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Observer of IP configuration state changes.
pub trait StateTransitionHook: Send + Sync + std::fmt::Debug {
    /// `from` is `None` for a newly tracked IP, `to` is `None` for a removed one.
    fn on_transition(&self, ip_config_id: &str, from: Option<IPState>, to: Option<IPState>);
}

fn label(state: Option<IPState>) -> &'static str {
    state.map_or("none", IPState::as_str)
}

/// Prometheus-backed transition hook
#[derive(Debug, Clone)]
pub struct PrometheusStateHook {
    ips_by_state: IntGaugeVec,
    transitions: IntCounterVec,
}

impl PrometheusStateHook {
    /// Create the collectors and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let ips_by_state = IntGaugeVec::new(
            Opts::new("cns_ipconfig_state_count", "Number of secondary IPs per allocation state."),
            &["state"],
        )?;
        let transitions = IntCounterVec::new(
            Opts::new(
                "cns_ipconfig_state_transitions_total",
                "Number of secondary IP allocation state transitions.",
            ),
            &["from", "to"],
        )?;
        registry.register(Box::new(ips_by_state.clone()))?;
        registry.register(Box::new(transitions.clone()))?;

        for state in IPState::ALL {
            ips_by_state.with_label_values(&[state.as_str()]).set(0);
        }

        Ok(Self {
            ips_by_state,
            transitions,
        })
    }

    /// Current gauge value for `state`
    pub fn count(&self, state: IPState) -> i64 {
        self.ips_by_state.with_label_values(&[state.as_str()]).get()
    }

    /// Number of transitions observed between two states
    pub fn transition_count(&self, from: Option<IPState>, to: Option<IPState>) -> u64 {
        self.transitions.with_label_values(&[label(from), label(to)]).get()
    }
}

impl StateTransitionHook for PrometheusStateHook {
    fn on_transition(&self, ip_config_id: &str, from: Option<IPState>, to: Option<IPState>) {
        tracing::trace!(id = %ip_config_id, from = label(from), to = label(to), "IP state transition");
        if let Some(from) = from {
            self.ips_by_state.with_label_values(&[from.as_str()]).dec();
        }
        if let Some(to) = to {
            self.ips_by_state.with_label_values(&[to.as_str()]).inc();
        }
        self.transitions
            .with_label_values(&[label(from), label(to)])
            .inc();
    }
}

/// Render every collector in `registry` in the Prometheus text format.
pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = String::new();
    TextEncoder::new().encode_utf8(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

async fn metrics(State(registry): State<Registry>) -> Response {
    match encode(&registry) {
        Ok(body) => ([(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())], body).into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Router answering `GET /metrics` from `registry`
pub fn router(registry: Registry) -> Router {
    Router::new().route("/metrics", get(metrics)).with_state(registry)
}

/// Serve `/metrics` on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, registry: Registry) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Metrics listening on {}", addr);
    }
    axum::serve(listener, router(registry)).await
}
