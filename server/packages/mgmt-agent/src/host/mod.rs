//! Boundary to the managed runtime the agent is embedded in.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::capability::Capability;
use crate::dto::{MemoryInfo, PropertyInfo, ServiceInfo, ThreadInfo, UnitInfo};
use crate::extensions::Extension;
use crate::values::TypedValue;

pub mod memory;
pub mod subsystems;

pub use memory::InMemoryHost;
pub use subsystems::*;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("unit {0} does not exist")]
    UnknownUnit(u64),
    #[error("a unit is already installed at {0}")]
    LocationTaken(String),
    #[error("unit {symbolic_name} {version} is already installed as unit {id}")]
    IdentityTaken {
        symbolic_name: String,
        version: String,
        id: u64,
    },
    #[error("{0}")]
    Rejected(String),
    #[error("{0} is not available")]
    Unavailable(String),
}

/// Requirement or capability declared by a unit revision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespaceEntry {
    pub namespace: String,
    pub directives: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionDescriptor {
    pub symbolic_name: String,
    pub version: String,
    pub requirements: Vec<NamespaceEntry>,
    pub capabilities: Vec<NamespaceEntry>,
}

/// Which services a watcher observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Extension,
    CommandProvider,
    Subsystem(Capability),
}

#[derive(Clone)]
pub struct ServiceEvent {
    pub service_id: u64,
    pub properties: BTreeMap<String, TypedValue>,
    pub extension: Option<Arc<dyn Extension>>,
}

impl ServiceEvent {
    pub fn property(&self, key: &str) -> Option<&TypedValue> {
        self.properties.get(key)
    }
}

/// Add/modify/remove callbacks for services of one kind. A modification
/// defaults to a removal followed by an addition.
pub trait ServiceWatcher: Send + Sync {
    fn added(&self, event: &ServiceEvent);

    fn modified(&self, previous: &ServiceEvent, current: &ServiceEvent) {
        self.removed(previous);
        self.added(current);
    }

    fn removed(&self, event: &ServiceEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Everything the agent needs from the managed runtime.
///
/// Calls are expected to be short. `refresh` must return immediately and
/// fire `done` once the dependency graph has been recomputed.
pub trait HostRuntime: Send + Sync + 'static {
    fn units(&self) -> Vec<UnitInfo>;
    fn unit(&self, id: u64) -> Option<UnitInfo>;
    fn unit_by_location(&self, location: &str) -> Option<UnitInfo>;
    fn install(&self, location: &str, image: &[u8]) -> Result<UnitInfo, HostError>;
    fn update(&self, id: u64, image: &[u8]) -> Result<UnitInfo, HostError>;
    fn set_start_level(&self, id: u64, level: i32) -> Result<(), HostError>;
    fn start(&self, id: u64) -> Result<(), HostError>;
    fn stop(&self, id: u64) -> Result<(), HostError>;
    fn uninstall(&self, id: u64) -> Result<(), HostError>;
    fn revision(&self, id: u64) -> Option<RevisionDescriptor>;
    fn refresh(&self, done: oneshot::Sender<()>) -> Result<(), HostError>;

    fn is_package_wired(&self, package: &str) -> bool;

    fn properties(&self) -> Vec<PropertyInfo>;
    fn services(&self) -> Vec<ServiceInfo>;
    fn threads(&self) -> Vec<ThreadInfo>;
    /// Memory counters; `uptime_ms` is filled in by the agent.
    fn memory(&self) -> MemoryInfo;
    fn uptime_ms(&self) -> u64;
    fn gc(&self);

    fn watch(&self, kind: ServiceKind, watcher: Arc<dyn ServiceWatcher>) -> WatchId;
    fn unwatch(&self, id: WatchId);

    fn component_runtime(&self) -> Option<Arc<dyn ComponentRuntime>> {
        None
    }
    fn config_admin(&self) -> Option<Arc<dyn ConfigAdmin>> {
        None
    }
    fn metatype(&self) -> Option<Arc<dyn MetatypeProvider>> {
        None
    }
    fn event_bus(&self) -> Option<Arc<dyn EventBus>> {
        None
    }
    fn user_admin(&self) -> Option<Arc<dyn UserAdmin>> {
        None
    }
    fn logger_admin(&self) -> Option<Arc<dyn LoggerAdmin>> {
        None
    }
    fn device_tree(&self) -> Option<Arc<dyn DeviceTree>> {
        None
    }
    fn health_checks(&self) -> Option<Arc<dyn HealthCheckExecutor>> {
        None
    }
    fn http_runtime(&self) -> Option<Arc<dyn HttpRuntime>> {
        None
    }
    fn heap(&self) -> Option<Arc<dyn HeapInspector>> {
        None
    }
    fn command_shell(&self) -> Option<Arc<dyn CommandShell>> {
        None
    }
    fn log_reader(&self) -> Option<Arc<dyn LogReader>> {
        None
    }
}
