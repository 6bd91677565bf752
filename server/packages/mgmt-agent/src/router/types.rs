use std::collections::BTreeMap;

use mgmt_agent_error::{AgentError, ProblemDetails};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::adapters::ComponentSelector;
use crate::dto::{DeviceValueType, RoleInfo, RoleType};
use crate::values::ConfigValue;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: Value,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

impl RpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ProblemDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[schema(value_type = Object)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: &AgentError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(RpcErrorBody {
                code: err.rpc_code(),
                message: err.to_string(),
                data: Some(err.to_problem_details()),
            }),
        }
    }
}

// Parameter shapes for the methods that take arguments.

fn default_start_level() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstallParams {
    #[serde(default)]
    pub location: Option<String>,
    /// Base64, standard alphabet.
    pub image: String,
    #[serde(default = "default_start_level")]
    pub start_level: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstallFromUrlParams {
    pub location: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstallBatchParams {
    pub images: Vec<String>,
    #[serde(default = "default_start_level")]
    pub start_level: i32,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UnitIdsParams {
    #[serde(default)]
    pub ids: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshParams {
    #[serde(default = "default_true", rename = "async")]
    pub asynchronous: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ComponentParams {
    pub component: ComponentSelector,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfigurationParams {
    pub pid: String,
    #[serde(default)]
    pub properties: Vec<ConfigValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfigurationsBatchParams {
    pub configurations: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PidParams {
    pub pid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FactoryConfigurationParams {
    pub factory_pid: String,
    #[serde(default)]
    pub properties: Vec<ConfigValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRoleParams {
    pub name: String,
    #[serde(rename = "type")]
    pub role_type: RoleType,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateRoleParams {
    pub role: RoleInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NameParams {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoggerContextParams {
    pub name: String,
    #[serde(default)]
    pub levels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceNodeParams {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceUpdateParams {
    pub uri: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: DeviceValueType,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventParams {
    pub topic: String,
    #[serde(default)]
    pub properties: Vec<ConfigValue>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HealthCheckParams {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RedirectParams {
    pub port: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextParams {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExtensionParams {
    pub name: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}
