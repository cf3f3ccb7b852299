//! Response codes and the response envelope
//!
//! Every public goal-state operation answers with a code from this taxonomy
//! plus a free-form message. Codes travel as integers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a goal-state operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum ResponseCode {
    #[default]
    Success,
    InvalidParameter,
    NotFound,
    NetworkContainerNotSpecified,
    UnknownContainerID,
    UnsupportedOrchestratorType,
    DockerContainerNotSpecified,
    UnsupportedNetworkContainerType,
    InvalidRequest,
    InconsistentIPConfigState,
    InvalidSecondaryIPConfig,
    /// Not an error: dataplane programming has not caught up, poll again.
    NetworkContainerVfpProgramPending,
    FailedToAllocateIPConfig,
    EmptyOrchestratorContext,
    UnsupportedOrchestratorContext,
    NetworkContainerVfpProgramComplete,
    /// Programming status could not be evaluated; callers assume not yet safe.
    NetworkContainerVfpProgramCheckSkipped,
    UnsupportedNCVersion,
    FailedToRunIPTableCmd,
    NmAgentInternalServerError,
    UnexpectedError,
}

impl ResponseCode {
    /// Stable numeric value of the code
    pub fn code(self) -> u32 {
        match self {
            ResponseCode::Success => 0,
            ResponseCode::InvalidParameter => 2,
            ResponseCode::NotFound => 14,
            ResponseCode::NetworkContainerNotSpecified => 16,
            ResponseCode::UnknownContainerID => 18,
            ResponseCode::UnsupportedOrchestratorType => 19,
            ResponseCode::DockerContainerNotSpecified => 20,
            ResponseCode::UnsupportedNetworkContainerType => 22,
            ResponseCode::InvalidRequest => 23,
            ResponseCode::InconsistentIPConfigState => 29,
            ResponseCode::InvalidSecondaryIPConfig => 30,
            ResponseCode::NetworkContainerVfpProgramPending => 31,
            ResponseCode::FailedToAllocateIPConfig => 32,
            ResponseCode::EmptyOrchestratorContext => 33,
            ResponseCode::UnsupportedOrchestratorContext => 34,
            ResponseCode::NetworkContainerVfpProgramComplete => 35,
            ResponseCode::NetworkContainerVfpProgramCheckSkipped => 36,
            ResponseCode::UnsupportedNCVersion => 38,
            ResponseCode::FailedToRunIPTableCmd => 39,
            ResponseCode::NmAgentInternalServerError => 41,
            ResponseCode::UnexpectedError => 99,
        }
    }

    /// Whether the code is `Success`
    pub fn is_success(self) -> bool {
        self == ResponseCode::Success
    }
}

impl From<ResponseCode> for u32 {
    fn from(code: ResponseCode) -> Self {
        code.code()
    }
}

impl TryFrom<u32> for ResponseCode {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        const ALL: [ResponseCode; 21] = [
            ResponseCode::Success,
            ResponseCode::InvalidParameter,
            ResponseCode::NotFound,
            ResponseCode::NetworkContainerNotSpecified,
            ResponseCode::UnknownContainerID,
            ResponseCode::UnsupportedOrchestratorType,
            ResponseCode::DockerContainerNotSpecified,
            ResponseCode::UnsupportedNetworkContainerType,
            ResponseCode::InvalidRequest,
            ResponseCode::InconsistentIPConfigState,
            ResponseCode::InvalidSecondaryIPConfig,
            ResponseCode::NetworkContainerVfpProgramPending,
            ResponseCode::FailedToAllocateIPConfig,
            ResponseCode::EmptyOrchestratorContext,
            ResponseCode::UnsupportedOrchestratorContext,
            ResponseCode::NetworkContainerVfpProgramComplete,
            ResponseCode::NetworkContainerVfpProgramCheckSkipped,
            ResponseCode::UnsupportedNCVersion,
            ResponseCode::FailedToRunIPTableCmd,
            ResponseCode::NmAgentInternalServerError,
            ResponseCode::UnexpectedError,
        ];
        ALL.into_iter()
            .find(|c| c.code() == value)
            .ok_or_else(|| format!("unknown response code {value}"))
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Response envelope: code plus message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "ReturnCode")]
    pub return_code: ResponseCode,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl Response {
    /// Response with `return_code` and a message
    pub fn new(return_code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            return_code,
            message: message.into(),
        }
    }

    /// Successful response with an empty message
    pub fn success() -> Self {
        Self::default()
    }

    /// Whether the return code is `Success`
    pub fn is_success(&self) -> bool {
        self.return_code.is_success()
    }
}
