//! Optional subsystems. A host hands these out only while the backing
//! service exists; presence of the interface package is probed separately.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::{
    ComponentInfo, ConfigurationInfo, DeviceNode, DeviceValueType, HealthCheckInfo,
    HealthCheckResult, HeapDump, HeapUsage, HttpComponentInfo, LoggerContextInfo, RoleInfo,
    RoleType, UnitInfo,
};
use crate::host::{HostError, ListenerId};
use crate::values::TypedValue;

pub type Properties = BTreeMap<String, TypedValue>;

pub trait ComponentRuntime: Send + Sync {
    fn components(&self) -> Vec<ComponentInfo>;
    fn enable_by_id(&self, id: u64) -> Result<(), HostError>;
    fn enable_by_name(&self, name: &str) -> Result<(), HostError>;
    fn disable_by_id(&self, id: u64) -> Result<(), HostError>;
    fn disable_by_name(&self, name: &str) -> Result<(), HostError>;
}

pub trait ConfigAdmin: Send + Sync {
    fn configurations(&self) -> Vec<ConfigurationInfo>;
    /// Returns `true` when a new configuration was created.
    fn create_or_update(&self, pid: &str, properties: Properties) -> Result<bool, HostError>;
    /// Returns `false` when no configuration existed for `pid`.
    fn delete(&self, pid: &str) -> Result<bool, HostError>;
    /// Returns the generated pid.
    fn create_factory(&self, factory_pid: &str, properties: Properties) -> Result<String, HostError>;
}

pub trait MetatypeProvider: Send + Sync {
    /// Configurations declared by metatype, configured or not.
    fn declared(&self) -> Vec<ConfigurationInfo>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BusEvent {
    pub topic: String,
    #[schema(value_type = Object)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

pub type BusSink = Arc<dyn Fn(BusEvent) + Send + Sync>;

pub trait EventBus: Send + Sync {
    fn send(&self, topic: &str, properties: Properties) -> Result<(), HostError>;
    fn post(&self, topic: &str, properties: Properties) -> Result<(), HostError>;
    fn subscribe(&self, topic_filter: &str, sink: BusSink) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId);
}

pub trait UserAdmin: Send + Sync {
    fn roles(&self) -> Vec<RoleInfo>;
    /// Returns `false` when the role already exists.
    fn create_role(&self, name: &str, role_type: RoleType) -> Result<bool, HostError>;
    fn update_role(&self, role: &RoleInfo) -> Result<(), HostError>;
    /// Returns `false` when the role did not exist.
    fn remove_role(&self, name: &str) -> Result<bool, HostError>;
}

pub trait LoggerAdmin: Send + Sync {
    fn contexts(&self) -> Vec<LoggerContextInfo>;
    fn update_context(
        &self,
        name: &str,
        levels: &BTreeMap<String, String>,
        persist: bool,
    ) -> Result<(), HostError>;
}

pub trait DeviceTree: Send + Sync {
    fn read(&self, uri: &str) -> Result<DeviceNode, HostError>;
    fn update(&self, uri: &str, value: &str, value_type: DeviceValueType) -> Result<(), HostError>;
}

pub trait HealthCheckExecutor: Send + Sync {
    fn checks(&self) -> Vec<HealthCheckInfo>;
    fn execute(&self, tags: &[String], names: &[String]) -> Vec<HealthCheckResult>;
}

pub trait HttpRuntime: Send + Sync {
    fn components(&self) -> Vec<HttpComponentInfo>;
}

pub trait HeapInspector: Send + Sync {
    fn usage(&self) -> HeapUsage;
    fn dump(&self) -> Result<HeapDump, HostError>;
}

/// One interactive session of the host's command shell.
pub trait ShellSession: Send {
    fn execute(&mut self, line: &str) -> Result<String, HostError>;
    fn close(&mut self);
}

pub trait CommandShell: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn ShellSession>, HostError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub unit_id: u64,
    pub level: String,
    pub logger: String,
    pub message: String,
}

pub type LogSink = Arc<dyn Fn(LogRecord) + Send + Sync>;

pub trait LogReader: Send + Sync {
    fn add_listener(&self, sink: LogSink) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
}

pub type LeakSink = Arc<dyn Fn(Vec<UnitInfo>) + Send + Sync>;

/// External collaborator deciding which units leak their classloaders.
pub trait LeakDetector: Send + Sync {
    fn suspicious_units(&self) -> Vec<UnitInfo>;

    /// Installs (or clears) the sink for unsolicited leak alerts.
    fn set_alert_sink(&self, _sink: Option<LeakSink>) {}
}
