use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InvalidRequest,
    MethodNotFound,
    ExtensionNotFound,
    ExtensionFailed,
    AmbiguousInstall,
    InvalidUnit,
    UnitNotFound,
    ShellUnavailable,
    LinkClosed,
    HostFailure,
    Timeout,
    TokenInvalid,
}

impl ErrorType {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "urn:mgmt-agent:error:invalid_request",
            Self::MethodNotFound => "urn:mgmt-agent:error:method_not_found",
            Self::ExtensionNotFound => "urn:mgmt-agent:error:extension_not_found",
            Self::ExtensionFailed => "urn:mgmt-agent:error:extension_failed",
            Self::AmbiguousInstall => "urn:mgmt-agent:error:ambiguous_install",
            Self::InvalidUnit => "urn:mgmt-agent:error:invalid_unit",
            Self::UnitNotFound => "urn:mgmt-agent:error:unit_not_found",
            Self::ShellUnavailable => "urn:mgmt-agent:error:shell_unavailable",
            Self::LinkClosed => "urn:mgmt-agent:error:link_closed",
            Self::HostFailure => "urn:mgmt-agent:error:host_failure",
            Self::Timeout => "urn:mgmt-agent:error:timeout",
            Self::TokenInvalid => "urn:mgmt-agent:error:token_invalid",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method Not Found",
            Self::ExtensionNotFound => "Extension Not Found",
            Self::ExtensionFailed => "Extension Failed",
            Self::AmbiguousInstall => "Ambiguous Install Target",
            Self::InvalidUnit => "Invalid Unit",
            Self::UnitNotFound => "Unit Not Found",
            Self::ShellUnavailable => "Shell Unavailable",
            Self::LinkClosed => "Link Closed",
            Self::HostFailure => "Host Failure",
            Self::Timeout => "Timeout",
            Self::TokenInvalid => "Token Invalid",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::MethodNotFound => 404,
            Self::ExtensionNotFound => 404,
            Self::ExtensionFailed => 500,
            Self::AmbiguousInstall => 409,
            Self::InvalidUnit => 400,
            Self::UnitNotFound => 404,
            Self::ShellUnavailable => 503,
            Self::LinkClosed => 503,
            Self::HostFailure => 500,
            Self::Timeout => 504,
            Self::TokenInvalid => 401,
        }
    }

    /// JSON-RPC error code used when this error crosses the link.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::InvalidRequest => -32602,
            Self::MethodNotFound => -32601,
            Self::ExtensionNotFound => -32001,
            Self::AmbiguousInstall => -32002,
            Self::InvalidUnit => -32003,
            Self::UnitNotFound => -32004,
            Self::ShellUnavailable => -32005,
            Self::LinkClosed => -32006,
            Self::HostFailure => -32007,
            Self::Timeout => -32008,
            Self::ExtensionFailed => -32009,
            Self::TokenInvalid => -32010,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    #[schema(value_type = Object)]
    pub extensions: Map<String, Value>,
}

impl ProblemDetails {
    pub fn new(error_type: ErrorType, detail: Option<String>) -> Self {
        Self {
            type_: error_type.as_urn().to_string(),
            title: error_type.title().to_string(),
            status: error_type.status_code(),
            detail,
            instance: None,
            extensions: Map::new(),
        }
    }
}

/// Failures that surface to the remote controller as link-level errors.
///
/// Ordinary management failures (missing subsystems, conversion errors,
/// partial batch failures) never become an `AgentError`; they are carried in
/// the operation result instead.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("method not found: {method}")]
    MethodNotFound { method: String },
    #[error("agent extension with name '{name}' doesn't exist")]
    ExtensionNotFound { name: String },
    #[error("agent extension '{name}' failed: {message}")]
    ExtensionFailed { name: String, message: String },
    #[error("no location specified but there are multiple units with the same symbolic name {symbolic_name}: {locations:?}")]
    AmbiguousInstall {
        symbolic_name: String,
        locations: Vec<String>,
    },
    #[error("invalid unit: {message}")]
    InvalidUnit { message: String },
    #[error("unit {id} does not exist")]
    UnitNotFound { id: u64 },
    #[error("command shell is not present in this runtime")]
    ShellUnavailable { message: Option<String> },
    #[error("link closed")]
    LinkClosed,
    #[error("host failure: {message}")]
    HostFailure { message: String },
    #[error("timeout")]
    Timeout { message: Option<String> },
    #[error("token invalid")]
    TokenInvalid { message: Option<String> },
}

impl AgentError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::InvalidRequest { .. } => ErrorType::InvalidRequest,
            Self::MethodNotFound { .. } => ErrorType::MethodNotFound,
            Self::ExtensionNotFound { .. } => ErrorType::ExtensionNotFound,
            Self::ExtensionFailed { .. } => ErrorType::ExtensionFailed,
            Self::AmbiguousInstall { .. } => ErrorType::AmbiguousInstall,
            Self::InvalidUnit { .. } => ErrorType::InvalidUnit,
            Self::UnitNotFound { .. } => ErrorType::UnitNotFound,
            Self::ShellUnavailable { .. } => ErrorType::ShellUnavailable,
            Self::LinkClosed => ErrorType::LinkClosed,
            Self::HostFailure { .. } => ErrorType::HostFailure,
            Self::Timeout { .. } => ErrorType::Timeout,
            Self::TokenInvalid { .. } => ErrorType::TokenInvalid,
        }
    }

    fn details(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            Self::InvalidRequest { .. } | Self::LinkClosed => {}
            Self::MethodNotFound { method } => {
                map.insert("method".to_string(), Value::String(method.clone()));
            }
            Self::ExtensionNotFound { name } => {
                map.insert("extension".to_string(), Value::String(name.clone()));
            }
            Self::ExtensionFailed { name, message } => {
                map.insert("extension".to_string(), Value::String(name.clone()));
                map.insert("message".to_string(), Value::String(message.clone()));
            }
            Self::AmbiguousInstall {
                symbolic_name,
                locations,
            } => {
                map.insert(
                    "symbolicName".to_string(),
                    Value::String(symbolic_name.clone()),
                );
                map.insert(
                    "locations".to_string(),
                    Value::Array(locations.iter().cloned().map(Value::String).collect()),
                );
            }
            Self::InvalidUnit { message } | Self::HostFailure { message } => {
                map.insert("message".to_string(), Value::String(message.clone()));
            }
            Self::UnitNotFound { id } => {
                map.insert("unitId".to_string(), Value::Number((*id).into()));
            }
            Self::ShellUnavailable { message }
            | Self::Timeout { message }
            | Self::TokenInvalid { message } => {
                if let Some(message) = message {
                    map.insert("message".to_string(), Value::String(message.clone()));
                }
            }
        }
        map
    }

    pub fn to_problem_details(&self) -> ProblemDetails {
        let mut problem = ProblemDetails::new(self.error_type(), Some(self.to_string()));
        problem.extensions = self.details();
        problem
    }

    pub fn rpc_code(&self) -> i64 {
        self.error_type().rpc_code()
    }
}

impl From<AgentError> for ProblemDetails {
    fn from(value: AgentError) -> Self {
        value.to_problem_details()
    }
}

impl From<&AgentError> for ProblemDetails {
    fn from(value: &AgentError) -> Self {
        value.to_problem_details()
    }
}
