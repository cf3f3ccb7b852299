//! Controller-specific error types.
//!
//! `ControllerError` covers startup and configuration failures that end the
//! process. `ServiceError` covers data-level failures of a single goal-state
//! operation; each variant maps onto one response code so public operations
//! can answer with a code and a message instead of failing outward.

use crate::dnc::DncError;
use crate::net_plugin::NetPluginError;
use crate::store::StoreError;
use cns_types::{Response, ResponseCode};
use iptables_client::IptablesError;
use nmagent_client::NmAgentError;
use thiserror::Error;

/// Errors that end the goal-state controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// NMAgent client could not be built
    #[error("NMAgent error: {0}")]
    NmAgent(#[from] NmAgentError),

    /// Control plane client could not be built
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] DncError),

    /// Metrics registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Signal handling or other process-level I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors of a single goal-state operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InconsistentIPConfigState(String),

    #[error("{0}")]
    InvalidSecondaryIPConfig(String),

    #[error("{0}")]
    UnsupportedOrchestratorType(String),

    #[error("{0}")]
    UnsupportedNetworkContainerType(String),

    #[error("{0}")]
    UnsupportedNCVersion(String),

    #[error("{0}")]
    EmptyOrchestratorContext(String),

    #[error("{0}")]
    UnsupportedOrchestratorContext(String),

    #[error("{0}")]
    UnknownContainerID(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    NetworkContainerNotSpecified(String),

    #[error("{0}")]
    DockerContainerNotSpecified(String),

    #[error("{0}")]
    FailedToAllocateIPConfig(String),

    /// Dataplane rule command failed
    #[error("iptables command failed: {0}")]
    Dataplane(#[from] IptablesError),

    /// Dataplane-programming authority call failed
    #[error("NMAgent call failed: {0}")]
    NmAgent(#[from] NmAgentError),

    /// Control plane goal state pull failed
    #[error("control plane call failed: {0}")]
    ControlPlane(#[from] DncError),

    /// Network plugin invocation failed
    #[error("network plugin failed: {0}")]
    NetPlugin(#[from] NetPluginError),

    /// Persistence failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Unexpected(String),
}

impl ServiceError {
    /// Response code reported to callers for this error.
    pub fn code(&self) -> ResponseCode {
        match self {
            ServiceError::InvalidRequest(_) => ResponseCode::InvalidRequest,
            ServiceError::InconsistentIPConfigState(_) => ResponseCode::InconsistentIPConfigState,
            ServiceError::InvalidSecondaryIPConfig(_) => ResponseCode::InvalidSecondaryIPConfig,
            ServiceError::UnsupportedOrchestratorType(_) => ResponseCode::UnsupportedOrchestratorType,
            ServiceError::UnsupportedNetworkContainerType(_) => {
                ResponseCode::UnsupportedNetworkContainerType
            }
            ServiceError::UnsupportedNCVersion(_) => ResponseCode::UnsupportedNCVersion,
            ServiceError::EmptyOrchestratorContext(_) => ResponseCode::EmptyOrchestratorContext,
            ServiceError::UnsupportedOrchestratorContext(_) => {
                ResponseCode::UnsupportedOrchestratorContext
            }
            ServiceError::UnknownContainerID(_) => ResponseCode::UnknownContainerID,
            ServiceError::NotFound(_) => ResponseCode::NotFound,
            ServiceError::NetworkContainerNotSpecified(_) => {
                ResponseCode::NetworkContainerNotSpecified
            }
            ServiceError::DockerContainerNotSpecified(_) => {
                ResponseCode::DockerContainerNotSpecified
            }
            ServiceError::FailedToAllocateIPConfig(_) => ResponseCode::FailedToAllocateIPConfig,
            ServiceError::Dataplane(_) => ResponseCode::FailedToRunIPTableCmd,
            ServiceError::NmAgent(_) => ResponseCode::NmAgentInternalServerError,
            ServiceError::ControlPlane(_)
            | ServiceError::NetPlugin(_)
            | ServiceError::Store(_)
            | ServiceError::Unexpected(_) => ResponseCode::UnexpectedError,
        }
    }
}

impl From<ServiceError> for Response {
    fn from(err: ServiceError) -> Self {
        Response::new(err.code(), err.to_string())
    }
}
