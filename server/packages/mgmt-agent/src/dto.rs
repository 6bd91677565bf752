use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnitInfo {
    pub id: u64,
    pub symbolic_name: String,
    pub version: String,
    pub location: String,
    pub state: UnitState,
    pub start_level: i32,
    pub last_modified: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceRecord {
    pub id: u64,
    pub resource: u64,
    pub namespace: String,
    pub directives: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnitRevision {
    pub id: u64,
    pub unit: u64,
    pub symbolic_name: String,
    pub version: String,
    pub requirements: Vec<NamespaceRecord>,
    pub capabilities: Vec<NamespaceRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Success,
    Error,
    /// The backing subsystem is not wired. Not an error.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    pub status: ResultStatus,
    pub message: String,
}

impl OpResult {
    pub fn new(status: ResultStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ResultStatus::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResultStatus::Error, message)
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::new(ResultStatus::Skipped, message)
    }
}

/// Listing whose availability depends on an optional subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gated<T> {
    Success { value: T },
    Skipped { message: String },
}

impl<T> Gated<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Gated::Success { value } => Some(value),
            Gated::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Gated::Skipped { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentState {
    Unsatisfied,
    Satisfied,
    Active,
    Disabled,
    FailedActivation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInfo {
    pub id: u64,
    pub name: String,
    pub unit_id: u64,
    pub state: ComponentState,
    pub implementation: String,
    pub service_interfaces: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ConfigurationSource {
    Store,
    Metatype,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationInfo {
    pub pid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_pid: Option<String>,
    #[schema(value_type = Object)]
    pub properties: BTreeMap<String, Value>,
    pub source: ConfigurationSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PropertyKind {
    Framework,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInfo {
    pub name: String,
    pub value: String,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub id: u64,
    pub unit_id: u64,
    pub interfaces: Vec<String>,
    pub properties: BTreeMap<String, String>,
    pub using_units: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreadInfo {
    pub id: u64,
    pub name: String,
    pub state: String,
    pub daemon: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleType {
    User,
    Group,
    Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub role_type: RoleType,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
    #[serde(default)]
    pub basic_members: Vec<String>,
    #[serde(default)]
    pub required_members: Vec<String>,
}

impl RoleInfo {
    pub fn new(name: impl Into<String>, role_type: RoleType) -> Self {
        Self {
            name: name.into(),
            role_type,
            properties: BTreeMap::new(),
            credentials: BTreeMap::new(),
            basic_members: Vec::new(),
            required_members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckInfo {
    pub name: String,
    pub tags: Vec<String>,
    pub service_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Ok,
    Warn,
    TemporarilyUnavailable,
    Critical,
    HealthCheckError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub name: String,
    pub tags: Vec<String>,
    pub status: HealthStatus,
    pub message: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpComponentInfo {
    pub name: String,
    pub kind: String,
    pub context_name: String,
    pub patterns: Vec<String>,
    pub service_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoggerContextInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_level: Option<String>,
    pub levels: BTreeMap<String, String>,
    /// Whether level changes survive a restart, which requires the
    /// configuration store.
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceValueType {
    String,
    Integer,
    Long,
    Float,
    Boolean,
    Date,
    Time,
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNode {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<DeviceValueType>,
    #[serde(default)]
    pub children: Vec<DeviceNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub uptime_ms: u64,
    pub max_memory: u64,
    pub free_memory: u64,
    pub total_memory: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPoolUsage {
    pub name: String,
    pub used: u64,
    pub committed: u64,
    pub max: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeapUsage {
    pub used: u64,
    pub committed: u64,
    pub max: u64,
    pub pools: Vec<MemoryPoolUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeapDump {
    pub location: String,
    pub size: u64,
    pub created_at: String,
}
